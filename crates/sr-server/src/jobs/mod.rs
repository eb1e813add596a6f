//! Compatibility job supervisor.
//!
//! A job is one ffmpeg process writing a rolling HLS rendition of a source URL
//! into `<output_root>/<job_id>/`. Job ids are content-addressed, so identical
//! requests share one process. Creation is serialized per id; lookups, touches
//! and listing are lock-free reads of the job table. A background sweeper
//! evicts jobs nobody has touched for a while.

pub mod launcher;
pub mod watcher;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sr_av::{playlist_has_segment, HeaderHints, LiveHlsOptions, PLAYLIST_NAME};
use sr_core::config::CompatConfig;
use sr_core::{Bitrate, CompatMode, Error, Result};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use launcher::{FfmpegLauncher, Launcher};
pub use watcher::JobState;

/// Content-addressed job id: the first 16 hex characters of SHA-256 over the
/// newline-joined source, mode and bitrates.
pub fn job_id(source: &str, mode: CompatMode, video: Bitrate, audio: Bitrate) -> String {
    let digest = Sha256::digest(format!("{source}\n{mode}\n{video}\n{audio}").as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(16);
    id
}

/// Video bitrate used when a remux job falls back to transcoding.
pub fn fallback_bitrate(requested: Bitrate, floor: Bitrate) -> Bitrate {
    requested.scaled(3, 2).max(floor)
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One supervised ffmpeg process and its output directory.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub source: String,
    pub mode: CompatMode,
    pub video_bitrate: Bitrate,
    pub audio_bitrate: Bitrate,
    pub output_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    last_access: parking_lot::Mutex<Instant>,
    state: watch::Receiver<JobState>,
    /// Waiters and in-flight file requests holding the job alive.
    pins: AtomicUsize,
    cancel: CancellationToken,
    watcher: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Job {
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    pub fn is_live(&self) -> bool {
        self.state.borrow().is_live()
    }

    pub fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_access.lock().elapsed()
    }

    pub fn pins(&self) -> usize {
        self.pins.load(Ordering::Acquire)
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.output_dir.join(PLAYLIST_NAME)
    }

    /// Stop the process and wait for the watcher to finish.
    async fn terminate(&self) {
        self.cancel.cancel();
        let handle = self.watcher.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                tracing::warn!(job_id = %self.id, "Watcher did not stop in time");
            }
        }
    }
}

/// Keeps a job out of the sweeper's reach while held.
#[derive(Debug)]
pub struct PinGuard {
    job: Arc<Job>,
}

impl PinGuard {
    fn new(job: Arc<Job>) -> Self {
        job.pins.fetch_add(1, Ordering::AcqRel);
        job.touch();
        Self { job }
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.job.touch();
        self.job.pins.fetch_sub(1, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// Requests and snapshots
// ---------------------------------------------------------------------------

/// Parameters of a `start-compat` call.
#[derive(Debug, Clone)]
pub struct EnsureRequest {
    pub source: String,
    pub mode: CompatMode,
    pub video_bitrate: Bitrate,
    pub audio_bitrate: Bitrate,
    pub headers: HeaderHints,
    /// Block until the playlist lists a segment.
    pub wait: bool,
    /// Retry a remux that never became ready as a transcode.
    pub auto_fallback: bool,
}

/// A job that is running (and ready, if the caller waited).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnsureOutcome {
    pub id: String,
    pub mode: CompatMode,
    /// Path the client should play, under the serve prefix.
    pub play: String,
}

/// Point-in-time view of a job for the listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub source: String,
    pub mode: CompatMode,
    pub video_bitrate: Bitrate,
    pub audio_bitrate: Bitrate,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub idle_secs: u64,
    pub pins: usize,
    pub play: String,
}

// ---------------------------------------------------------------------------
// JobSupervisor
// ---------------------------------------------------------------------------

/// Owns the job table. Cheap to clone.
#[derive(Clone)]
pub struct JobSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: CompatConfig,
    launcher: Arc<dyn Launcher>,
    jobs: DashMap<String, Arc<Job>>,
    /// Per-id creation locks.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl JobSupervisor {
    pub fn new(config: CompatConfig, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                launcher,
                jobs: DashMap::new(),
                locks: DashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &CompatConfig {
        &self.inner.config
    }

    /// Path a client plays for `id`.
    pub fn play_path(&self, id: &str) -> String {
        format!(
            "{}/{id}/{PLAYLIST_NAME}",
            self.inner.config.serve_prefix.trim_end_matches('/')
        )
    }

    /// Make sure a job for `request` is running, optionally waiting for it to
    /// become playable and falling back from remux to transcode.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] if the job did not produce a segment in time.
    /// - [`Error::Tool`] if ffmpeg is missing, could not start, or died.
    /// - [`Error::Io`] if the output directory could not be prepared.
    pub async fn ensure(&self, request: &EnsureRequest) -> Result<EnsureOutcome> {
        let primary = self
            .attempt(request, request.mode, request.video_bitrate)
            .await;

        match primary {
            Err(Error::NotReady { job_id, waited })
                if request.auto_fallback && request.mode == CompatMode::Remux =>
            {
                let video = fallback_bitrate(
                    request.video_bitrate,
                    self.inner.config.fallback_video_bitrate,
                );
                tracing::info!(
                    job_id = %job_id,
                    waited_secs = waited.as_secs(),
                    video_bitrate = %video,
                    "Remux not ready, falling back to transcode"
                );
                self.attempt(request, CompatMode::Transcode, video).await
            }
            other => other,
        }
    }

    async fn attempt(
        &self,
        request: &EnsureRequest,
        mode: CompatMode,
        video_bitrate: Bitrate,
    ) -> Result<EnsureOutcome> {
        let id = job_id(&request.source, mode, video_bitrate, request.audio_bitrate);
        let pin = self.get_or_spawn(&id, request, mode, video_bitrate).await?;

        if request.wait {
            self.wait_ready(pin.job(), self.inner.config.ready_timeout(mode))
                .await?;
        }

        Ok(EnsureOutcome {
            play: self.play_path(&id),
            id,
            mode,
        })
    }

    fn creation_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.inner
            .locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Reuse a live job or start a new one, under the id's creation lock.
    async fn get_or_spawn(
        &self,
        id: &str,
        request: &EnsureRequest,
        mode: CompatMode,
        video_bitrate: Bitrate,
    ) -> Result<PinGuard> {
        let lock = self.creation_lock(id);
        let creating = lock.lock().await;

        let existing = self.inner.jobs.get(id).map(|e| e.value().clone());
        if let Some(job) = existing {
            if job.is_live() {
                tracing::debug!(job_id = %id, state = job.state().label(), "Reusing job");
                return Ok(PinGuard::new(job));
            }
            tracing::info!(job_id = %id, state = job.state().label(), "Restarting job");
            self.inner.jobs.remove(id);
            job.terminate().await;
        }

        let output_dir = self.inner.config.output_root.join(id);
        if let Err(e) = reset_dir(&output_dir).await {
            drop(creating);
            self.release_lock(id);
            return Err(e);
        }

        let options = LiveHlsOptions {
            source: request.source.clone(),
            mode,
            video_bitrate,
            audio_bitrate: request.audio_bitrate,
            headers: request.headers.clone(),
            output_dir: output_dir.clone(),
            segment_secs: self.inner.config.segment_secs,
            list_size: self.inner.config.list_size,
            video_preset: self.inner.config.video_preset.clone(),
        };
        let child = match self.inner.launcher.launch(&options) {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Failed to launch compat job");
                remove_dir(&output_dir).await;
                drop(creating);
                self.release_lock(id);
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let (state, handle) = watcher::spawn_watcher(
            child,
            id.to_string(),
            options.playlist_path(),
            self.inner.config.poll_interval(),
            cancel.clone(),
        );

        let job = Arc::new(Job {
            id: id.to_string(),
            source: request.source.clone(),
            mode,
            video_bitrate,
            audio_bitrate: request.audio_bitrate,
            output_dir,
            created_at: Utc::now(),
            last_access: parking_lot::Mutex::new(Instant::now()),
            state,
            pins: AtomicUsize::new(0),
            cancel,
            watcher: parking_lot::Mutex::new(Some(handle)),
        });
        self.inner.jobs.insert(id.to_string(), job.clone());

        tracing::info!(
            job_id = %id,
            mode = %mode,
            video_bitrate = %video_bitrate,
            source = %request.source,
            "Started compat job"
        );

        drop(creating);
        Ok(PinGuard::new(job))
    }

    /// Drop the creation lock for `id` unless another task still holds a
    /// handle to it. Call with the caller's own `Arc` still alive.
    fn release_lock(&self, id: &str) {
        self.inner
            .locks
            .remove_if(id, |_, l| Arc::strong_count(l) == 2);
    }

    async fn wait_ready(&self, job: &Arc<Job>, timeout: Duration) -> Result<()> {
        let mut state = job.state.clone();
        let settled = tokio::time::timeout(timeout, state.wait_for(|s| *s != JobState::Starting))
            .await
            .map(|r| r.map(|s| (*s).clone()));

        match settled {
            Err(_elapsed) => Err(Error::NotReady {
                job_id: job.id.clone(),
                waited: timeout,
            }),
            Ok(Err(_closed)) => Err(Error::tool("ffmpeg", "job watcher stopped unexpectedly")),
            Ok(Ok(JobState::Ready)) => Ok(()),
            Ok(Ok(JobState::Failed(reason))) => Err(Error::tool("ffmpeg", reason)),
            Ok(Ok(_)) => {
                if playlist_has_segment(&job.playlist_path()).await {
                    Ok(())
                } else {
                    Err(Error::tool("ffmpeg", "exited before writing any segment"))
                }
            }
        }
    }

    /// Record an access to `id`. Returns whether the job exists.
    pub fn touch(&self, id: &str) -> bool {
        match self.inner.jobs.get(id) {
            Some(job) => {
                job.touch();
                true
            }
            None => false,
        }
    }

    /// Pin `id` for the lifetime of the returned guard. The pin is taken
    /// while the table entry is still borrowed, so eviction cannot remove the
    /// job in between.
    pub fn pin(&self, id: &str) -> Option<PinGuard> {
        let entry = self.inner.jobs.get(id)?;
        Some(PinGuard::new(entry.value().clone()))
    }

    pub fn get(&self, id: &str) -> Option<Arc<Job>> {
        self.inner.jobs.get(id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.jobs.is_empty()
    }

    /// Snapshot of every job, newest first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self
            .inner
            .jobs
            .iter()
            .map(|entry| {
                let job = entry.value();
                let state = job.state();
                JobSnapshot {
                    id: job.id.clone(),
                    source: job.source.clone(),
                    mode: job.mode,
                    video_bitrate: job.video_bitrate,
                    audio_bitrate: job.audio_bitrate,
                    state: state.label(),
                    error: match state {
                        JobState::Failed(reason) => Some(reason),
                        _ => None,
                    },
                    created_at: job.created_at,
                    idle_secs: job.idle_for().as_secs(),
                    pins: job.pins(),
                    play: self.play_path(&job.id),
                }
            })
            .collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        snapshots
    }

    /// Evict jobs idle for longer than `threshold`. Jobs that are pinned or
    /// being created are skipped. Returns the evicted ids.
    pub async fn evict_idle_older_than(&self, threshold: Duration) -> Vec<String> {
        let candidates: Vec<String> = self
            .inner
            .jobs
            .iter()
            .filter(|e| e.value().pins() == 0 && e.value().idle_for() > threshold)
            .map(|e| e.key().clone())
            .collect();

        let mut evicted = Vec::new();
        for id in candidates {
            let lock = self.creation_lock(&id);
            let Ok(guard) = lock.try_lock() else {
                tracing::debug!(job_id = %id, "Job is being created, not evicting");
                continue;
            };

            let removed = self
                .inner
                .jobs
                .remove_if(&id, |_, job| job.pins() == 0 && job.idle_for() > threshold);

            if let Some((_, job)) = removed {
                job.terminate().await;
                remove_dir(&job.output_dir).await;
                tracing::info!(
                    job_id = %id,
                    idle_secs = job.idle_for().as_secs(),
                    "Evicted idle compat job"
                );
                evicted.push(id.clone());
            }

            drop(guard);
            self.release_lock(&id);
        }
        evicted
    }

    /// Evict jobs idle past the configured timeout.
    pub async fn sweep(&self) -> Vec<String> {
        self.evict_idle_older_than(self.inner.config.idle_timeout())
            .await
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires.
    pub fn start_sweeper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = supervisor.sweep().await;
                        if !evicted.is_empty() {
                            tracing::debug!(count = evicted.len(), "Sweep finished");
                        }
                    }
                }
            }
            tracing::debug!("Job sweeper stopped");
        })
    }

    /// Stop every job and delete its output.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.inner.jobs.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, job)) = self.inner.jobs.remove(&id) {
                job.terminate().await;
                remove_dir(&job.output_dir).await;
            }
        }
        self.inner.locks.clear();
        tracing::info!("All compat jobs stopped");
    }
}

async fn reset_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

async fn remove_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {e}", dir.display());
        }
    }
}
