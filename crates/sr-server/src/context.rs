//! Application context shared across route handlers via Axum state.
//!
//! [`AppContext`] wraps the immutable configuration, the discovered tools and
//! the outbound HTTP client in `Arc`s; the job table lives behind the
//! cheaply-clonable [`JobSupervisor`].

use std::sync::Arc;

use sr_av::ToolRegistry;
use sr_core::config::Config;
use sr_core::Result;

use crate::fetcher::Fetcher;
use crate::inspect::InspectLimits;
use crate::jobs::{FfmpegLauncher, JobSupervisor, Launcher};

/// Read timeout for each body chunk of an `inspect=1` request.
const INSPECT_CHUNK_TIMEOUT_SECS: u64 = 5;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub tools: Arc<ToolRegistry>,
    pub fetcher: Arc<Fetcher>,
    pub jobs: JobSupervisor,
}

impl AppContext {
    /// Build a context that launches ffmpeg from `tools`.
    pub fn new(config: Config, tools: Arc<ToolRegistry>) -> Result<Self> {
        let launcher = Arc::new(FfmpegLauncher::new(tools.clone()));
        Self::with_launcher(config, tools, launcher)
    }

    /// Build a context with a custom process launcher.
    pub fn with_launcher(
        config: Config,
        tools: Arc<ToolRegistry>,
        launcher: Arc<dyn Launcher>,
    ) -> Result<Self> {
        let fetcher = Fetcher::new(&config.proxy)?;
        let jobs = JobSupervisor::new(config.compat.clone(), launcher);
        Ok(Self {
            config: Arc::new(config),
            tools,
            fetcher: Arc::new(fetcher),
            jobs,
        })
    }

    pub fn inspect_limits(&self) -> InspectLimits {
        InspectLimits {
            max_chunks: self.config.proxy.inspect_max_chunks,
            preview_bytes: self.config.proxy.inspect_preview_bytes,
            chunk_timeout: std::time::Duration::from_secs(INSPECT_CHUNK_TIMEOUT_SECS),
        }
    }
}
