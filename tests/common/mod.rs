//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds an [`AppContext`] with a temporary
//! compat output root and starts Axum on a random port. Compat tests swap
//! ffmpeg for a [`ScriptLauncher`] running a shell script.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sr_av::{LiveHlsOptions, ToolRegistry};
use sr_core::config::Config;
use sr_server::context::AppContext;
use sr_server::jobs::Launcher;
use sr_server::router::build_router;
use tempfile::TempDir;
use tokio::process::{Child, Command};

/// Script that writes a playable playlist and keeps running.
pub const READY_SCRIPT: &str = r#"printf '#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4.0,\nseg_00000.ts\n' > "$OUT/index.m3u8"; printf 'TS' > "$OUT/seg_00000.ts"; sleep 30"#;

/// Runs a shell script instead of ffmpeg. `$OUT` is the job directory and
/// `$MODE` the requested mode.
pub struct ScriptLauncher {
    script: String,
    spawns: AtomicUsize,
}

impl ScriptLauncher {
    pub fn new(script: &str) -> Arc<Self> {
        Arc::new(Self {
            script: script.to_string(),
            spawns: AtomicUsize::new(0),
        })
    }

    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }
}

impl Launcher for ScriptLauncher {
    fn launch(&self, options: &LiveHlsOptions) -> sr_core::Result<Child> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        Command::new("sh")
            .arg("-c")
            .arg(&self.script)
            .env("OUT", &options.output_dir)
            .env("MODE", options.mode.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| sr_core::Error::tool("sh", e.to_string()))
    }
}

/// A running server plus the state needed to inspect it.
pub struct TestHarness {
    pub ctx: AppContext,
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    output_root: TempDir,
}

impl TestHarness {
    /// Start a server with default configuration and no ffmpeg.
    pub async fn start() -> Self {
        Self::start_with(Config::default(), None).await
    }

    /// Start a server with `config`; compat jobs run `launcher` if given.
    pub async fn start_with(mut config: Config, launcher: Option<Arc<ScriptLauncher>>) -> Self {
        let output_root = tempfile::tempdir().unwrap();
        config.compat.output_root = output_root.path().to_path_buf();

        let tools = Arc::new(ToolRegistry::default());
        let ctx = match launcher {
            Some(launcher) => AppContext::with_launcher(config, tools, launcher).unwrap(),
            None => AppContext::new(config, tools).unwrap(),
        };
        let app = build_router(ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            ctx,
            addr,
            client,
            output_root,
        }
    }

    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    /// `/proxy` URL for `target` with extra raw query pairs.
    pub fn proxy_url(&self, target: &str, extra: &[(&str, &str)]) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("url", target);
        query.extend_pairs(extra);
        self.url(&format!("/proxy?{}", query.finish()))
    }

    pub async fn get(&self, path_and_query: &str) -> reqwest::Response {
        self.client.get(self.url(path_and_query)).send().await.unwrap()
    }

    pub fn output_root(&self) -> &std::path::Path {
        self.output_root.path()
    }
}
