//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the HTTP server, the proxy core, the compatibility
//! supervisor and external tools. Every section defaults sensibly so a
//! completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::media::{Bitrate, CompatMode};
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub proxy: ProxyConfig,
    pub compat: CompatConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Read and parse a config file. Unlike [`Config::load_or_default`] this
    /// surfaces every failure.
    pub fn load(path: &Path) -> Result<Self> {
        let path = expand(path);
        let contents = std::fs::read_to_string(&path)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let path = expand(path);

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.proxy.max_hops == 0 {
            warnings.push("proxy.max_hops is 0; every redirect will be refused".into());
        }

        if self.proxy.request_timeout_secs == 0 {
            warnings.push("proxy.request_timeout_secs is 0; every request will time out".into());
        }

        if !self.compat.serve_prefix.starts_with('/') || self.compat.serve_prefix.len() < 2 {
            warnings.push(format!(
                "compat.serve_prefix '{}' should be an absolute path such as /compat",
                self.compat.serve_prefix
            ));
        }

        if self.compat.idle_timeout_secs < self.compat.transcode_ready_timeout_secs {
            warnings.push(
                "compat.idle_timeout_secs is shorter than the transcode readiness window; \
                 jobs may be evicted while clients are still waiting"
                    .into(),
            );
        }

        if self.compat.sweep_interval_secs == 0 {
            warnings.push("compat.sweep_interval_secs is 0; idle jobs are never evicted".into());
        }

        if let Some(ref ffmpeg) = self.tools.ffmpeg_path {
            if !ffmpeg.exists() {
                warnings.push(format!(
                    "tools.ffmpeg_path {} does not exist; falling back to PATH",
                    ffmpeg.display()
                ));
            }
        }

        warnings
    }
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Optional frontend directory served as the router fallback.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            static_dir: None,
        }
    }
}

/// Proxy core settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Maximum time to wait for upstream response headers, per hop.
    pub request_timeout_secs: u64,
    /// Maximum time to establish the upstream TCP/TLS connection.
    pub connect_timeout_secs: u64,
    /// Redirects followed before answering 508.
    pub max_hops: u8,
    /// User-agent alias used when the request carries no `ua` parameter.
    pub default_user_agent: String,
    /// Body chunks buffered for `inspect=1` reports.
    pub inspect_max_chunks: usize,
    /// Bytes of body preview included in `inspect=1` reports.
    pub inspect_preview_bytes: usize,
}

impl ProxyConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
            connect_timeout_secs: 10,
            max_hops: 5,
            default_user_agent: "vlc".into(),
            inspect_max_chunks: 64,
            inspect_preview_bytes: 8 * 1024,
        }
    }
}

/// Compatibility (ffmpeg) rendition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatConfig {
    /// Root directory holding one sub-directory per live job.
    pub output_root: PathBuf,
    /// URL prefix under which job directories are served.
    pub serve_prefix: String,
    /// Target HLS segment duration.
    pub segment_secs: u32,
    /// Segments kept in the rolling playlist.
    pub list_size: u32,
    /// How often the watcher inspects the job playlist.
    pub poll_interval_ms: u64,
    pub remux_ready_timeout_secs: u64,
    pub transcode_ready_timeout_secs: u64,
    pub default_mode: CompatMode,
    pub default_video_bitrate: Bitrate,
    pub default_audio_bitrate: Bitrate,
    /// Lowest video bitrate used when falling back from remux to transcode.
    pub fallback_video_bitrate: Bitrate,
    /// x264 preset for transcode mode.
    pub video_preset: String,
    /// Jobs not accessed for this long are evicted.
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl CompatConfig {
    /// Readiness window for a job running in `mode`.
    pub fn ready_timeout(&self, mode: CompatMode) -> Duration {
        match mode {
            CompatMode::Remux => Duration::from_secs(self.remux_ready_timeout_secs),
            CompatMode::Transcode => Duration::from_secs(self.transcode_ready_timeout_secs),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CompatConfig {
    fn default() -> Self {
        Self {
            output_root: std::env::temp_dir().join("streamrelay").join("compat"),
            serve_prefix: "/compat".into(),
            segment_secs: 4,
            list_size: 6,
            poll_interval_ms: 500,
            remux_ready_timeout_secs: 20,
            transcode_ready_timeout_secs: 45,
            default_mode: CompatMode::Remux,
            default_video_bitrate: Bitrate::from_kbps(1800),
            default_audio_bitrate: Bitrate::from_kbps(128),
            fallback_video_bitrate: Bitrate::from_kbps(2500),
            video_preset: "veryfast".into(),
            idle_timeout_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
}
