//! Per-job watcher task.
//!
//! The watcher owns the child process. It publishes the job's lifecycle on a
//! `watch` channel, polls the output playlist until it lists a segment, and
//! kills the process when the job's cancellation token fires.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sr_av::playlist_has_segment;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Stderr lines kept for failure messages.
const STDERR_TAIL_LINES: usize = 20;

/// Lifecycle of a compatibility job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Process running, no segment written yet.
    Starting,
    /// The playlist lists at least one segment.
    Ready,
    /// The process died with an error.
    Failed(String),
    /// The process ended cleanly or was stopped.
    Exited,
}

impl JobState {
    /// Whether the process is still expected to produce output.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Starting | Self::Ready)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
            Self::Exited => "exited",
        }
    }
}

/// Start watching `child`. Returns the state receiver and the task handle.
pub fn spawn_watcher(
    mut child: Child,
    job_id: String,
    playlist: PathBuf,
    poll: Duration,
    cancel: CancellationToken,
) -> (watch::Receiver<JobState>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(JobState::Starting);
    let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
    let mut stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(collect_stderr(stderr, job_id.clone(), tail.clone())));

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut starting = true;

        let final_state = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::debug!(job_id = %job_id, "Kill failed: {e}");
                    }
                    tracing::debug!(job_id = %job_id, "Job process stopped");
                    break JobState::Exited;
                }
                status = child.wait() => {
                    if let Some(task) = stderr_task.take() {
                        let _ = tokio::time::timeout(Duration::from_millis(500), task).await;
                    }
                    break exit_state(status, &tail.lock());
                }
                _ = ticker.tick(), if starting => {
                    if playlist_has_segment(&playlist).await {
                        starting = false;
                        tx.send_replace(JobState::Ready);
                        tracing::info!(job_id = %job_id, "Job ready");
                    }
                }
            }
        };

        match final_state {
            JobState::Failed(ref reason) => {
                tracing::warn!(job_id = %job_id, "Job process failed: {reason}")
            }
            _ => tracing::info!(job_id = %job_id, "Job process exited"),
        }
        tx.send_replace(final_state);
    });

    (rx, handle)
}

fn exit_state(status: std::io::Result<ExitStatus>, tail: &VecDeque<String>) -> JobState {
    match status {
        Ok(status) if status.success() => JobState::Exited,
        Ok(status) => {
            let mut reason = format!("ffmpeg {status}");
            if let Some(line) = tail.back() {
                reason.push_str(": ");
                reason.push_str(line);
            }
            JobState::Failed(reason)
        }
        Err(e) => JobState::Failed(format!("failed to wait for ffmpeg: {e}")),
    }
}

async fn collect_stderr(stderr: ChildStderr, job_id: String, tail: Arc<Mutex<VecDeque<String>>>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        tracing::debug!(job_id = %job_id, "ffmpeg: {line}");
        let mut tail = tail.lock();
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn sh(script: &str, dir: &std::path::Path) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .env("OUT", dir)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    async fn settle(rx: &mut watch::Receiver<JobState>) -> JobState {
        let state = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| *s != JobState::Starting),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        state
    }

    #[tokio::test]
    async fn becomes_ready_when_playlist_lists_a_segment() {
        let dir = tempfile::tempdir().unwrap();
        let child = sh(
            r#"printf '#EXTM3U\n#EXTINF:4.0,\nseg_00000.ts\n' > "$OUT/index.m3u8"; sleep 30"#,
            dir.path(),
        );
        let cancel = CancellationToken::new();
        let (mut rx, handle) = spawn_watcher(
            child,
            "t1".into(),
            dir.path().join("index.m3u8"),
            Duration::from_millis(20),
            cancel.clone(),
        );

        assert_eq!(settle(&mut rx).await, JobState::Ready);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(*rx.borrow(), JobState::Exited);
    }

    #[tokio::test]
    async fn failure_carries_last_stderr_line() {
        let dir = tempfile::tempdir().unwrap();
        let child = sh("echo 'first' >&2; echo 'Connection refused' >&2; exit 1", dir.path());
        let (mut rx, handle) = spawn_watcher(
            child,
            "t2".into(),
            dir.path().join("index.m3u8"),
            Duration::from_millis(20),
            CancellationToken::new(),
        );

        match settle(&mut rx).await {
            JobState::Failed(reason) => assert!(reason.contains("Connection refused"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn clean_exit_is_exited() {
        let dir = tempfile::tempdir().unwrap();
        let child = sh("exit 0", dir.path());
        let (mut rx, _handle) = spawn_watcher(
            child,
            "t3".into(),
            dir.path().join("index.m3u8"),
            Duration::from_millis(20),
            CancellationToken::new(),
        );
        assert_eq!(settle(&mut rx).await, JobState::Exited);
        assert!(!JobState::Exited.is_live());
        assert!(JobState::Ready.is_live());
    }
}
