//! Rolling live HLS output from a network source.
//!
//! Produces, inside the job's output directory:
//! - `index.m3u8` -- always-live playlist (no `#EXT-X-ENDLIST`)
//! - `seg_00000.ts`, `seg_00001.ts`, ... -- MPEG-TS segments; old ones are
//!   deleted as the window rolls forward

use std::path::{Path, PathBuf};
use std::process::Stdio;

use sr_core::{Bitrate, CompatMode};
use tokio::process::{Child, Command};

/// File name of the rolling playlist inside a job directory.
pub const PLAYLIST_NAME: &str = "index.m3u8";

/// Segment file name pattern inside a job directory.
pub const SEGMENT_PATTERN: &str = "seg_%05d.ts";

/// Marker that appears once the playlist lists at least one segment.
const SEGMENT_MARKER: &str = "#EXTINF";

/// Request headers forwarded to the source origin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderHints {
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub origin: Option<String>,
}

/// Everything needed to start one live HLS ffmpeg process.
#[derive(Debug, Clone)]
pub struct LiveHlsOptions {
    pub source: String,
    pub mode: CompatMode,
    pub video_bitrate: Bitrate,
    pub audio_bitrate: Bitrate,
    pub headers: HeaderHints,
    pub output_dir: PathBuf,
    /// Target segment duration in seconds.
    pub segment_secs: u32,
    /// Segments kept in the playlist window.
    pub list_size: u32,
    /// x264 preset used in transcode mode.
    pub video_preset: String,
}

impl LiveHlsOptions {
    pub fn playlist_path(&self) -> PathBuf {
        self.output_dir.join(PLAYLIST_NAME)
    }

    /// Build the ffmpeg argument vector.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-loglevel", "warning", "-y"]
            .into_iter()
            .map(String::from)
            .collect();

        if is_network_source(&self.source) {
            args.extend(
                [
                    "-reconnect",
                    "1",
                    "-reconnect_streamed",
                    "1",
                    "-reconnect_on_network_error",
                    "1",
                    "-reconnect_delay_max",
                    "5",
                ]
                .map(String::from),
            );
        }

        if let Some(ref ua) = self.headers.user_agent {
            args.extend(["-user_agent".to_string(), ua.clone()]);
        }
        if let Some(ref referer) = self.headers.referer {
            args.extend(["-referer".to_string(), referer.clone()]);
        }
        if let Some(ref origin) = self.headers.origin {
            args.extend(["-headers".to_string(), format!("Origin: {origin}\r\n")]);
        }

        args.extend(["-i".to_string(), self.source.clone()]);
        args.extend(["-map", "0:v:0?", "-map", "0:a:0?"].map(String::from));

        match self.mode {
            CompatMode::Remux => {
                args.extend(["-c:v", "copy"].map(String::from));
            }
            CompatMode::Transcode => {
                let vbr = self.video_bitrate.to_string();
                args.extend(["-c:v", "libx264", "-preset"].map(String::from));
                args.push(self.video_preset.clone());
                args.extend(["-tune", "zerolatency", "-pix_fmt", "yuv420p"].map(String::from));
                args.extend(["-b:v".to_string(), vbr.clone()]);
                args.extend(["-maxrate".to_string(), vbr]);
                args.extend(["-bufsize".to_string(), self.video_bitrate.scaled(2, 1).to_string()]);
                args.extend([
                    "-force_key_frames".to_string(),
                    format!("expr:gte(t,n_forced*{})", self.segment_secs),
                ]);
            }
        }

        args.extend(["-c:a", "aac", "-ac", "2"].map(String::from));
        args.extend(["-b:a".to_string(), self.audio_bitrate.to_string()]);

        args.extend(["-f", "hls"].map(String::from));
        args.extend(["-hls_time".to_string(), self.segment_secs.to_string()]);
        args.extend(["-hls_list_size".to_string(), self.list_size.to_string()]);
        args.extend(["-hls_flags", "delete_segments+omit_endlist"].map(String::from));
        args.extend([
            "-hls_segment_filename".to_string(),
            self.output_dir.join(SEGMENT_PATTERN).to_string_lossy().to_string(),
        ]);
        args.push(self.playlist_path().to_string_lossy().to_string());

        args
    }

    /// Spawn ffmpeg. Stderr is piped so the caller can collect diagnostics;
    /// the child is killed if its handle is dropped.
    pub fn spawn(&self, ffmpeg: &Path) -> sr_core::Result<Child> {
        let args = self.build_args();
        tracing::debug!(
            source = %self.source,
            mode = %self.mode,
            output = %self.output_dir.display(),
            "Spawning ffmpeg: {}",
            args.join(" ")
        );

        Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| sr_core::Error::tool("ffmpeg", format!("failed to spawn: {e}")))
    }
}

fn is_network_source(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Whether the playlist at `path` lists at least one segment. A missing or
/// unreadable file counts as not ready.
pub async fn playlist_has_segment(path: &Path) -> bool {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents.contains(SEGMENT_MARKER),
        Err(_) => false,
    }
}
