//! # sr-av
//!
//! External transcoder management for streamrelay compatibility renditions.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache the ffmpeg path.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for short tool invocations.
//! - **Live HLS** ([`hls_live`]) -- ffmpeg argument construction for rolling
//!   remux/transcode outputs, process spawning and playlist readiness checks.

pub mod command;
pub mod hls_live;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use hls_live::{playlist_has_segment, HeaderHints, LiveHlsOptions, PLAYLIST_NAME};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
