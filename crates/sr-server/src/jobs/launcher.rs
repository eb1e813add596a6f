//! Process launchers for compatibility jobs.

use std::sync::Arc;

use sr_av::{LiveHlsOptions, ToolRegistry};
use tokio::process::Child;

/// Starts the external process behind a job.
///
/// The returned child must have piped stderr (it is collected for failure
/// messages) and should be killed when dropped.
pub trait Launcher: Send + Sync {
    fn launch(&self, options: &LiveHlsOptions) -> sr_core::Result<Child>;
}

/// Launches ffmpeg found through the [`ToolRegistry`].
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    tools: Arc<ToolRegistry>,
}

impl FfmpegLauncher {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

impl Launcher for FfmpegLauncher {
    fn launch(&self, options: &LiveHlsOptions) -> sr_core::Result<Child> {
        let ffmpeg = self.tools.require("ffmpeg")?;
        options.spawn(&ffmpeg.path)
    }
}
