//! In-memory job registry and per-job event broadcasting.
//!
//! Each submitted conversion runs on its own tokio task. Its progress is
//! stored in a [`JobEntry`] and fanned out over a `broadcast` channel to any
//! number of subscribers. A deferred task purges the job and its artifact
//! once the TTL has elapsed since creation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Semaphore};

use cg_av::{convert_to_gif, ToolRegistry, TrimWindow};
use cg_core::config::{ConversionDefaults, JobsConfig};
use cg_core::events::{JobEvent, JobSnapshot, JobStatus, Phase, ProgressEvent};
use cg_core::{ConversionRequest, JobId, LoopMode};

/// Per-job broadcast buffer. Lagging subscribers skip progress events.
const EVENT_CAPACITY: usize = 64;

/// Conversion parameters accepted by [`JobRegistry::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOptions {
    pub width: u32,
    pub fps: u32,
    pub start: Option<String>,
    pub duration: Option<String>,
    pub loop_mode: LoopMode,
    /// Delete the input once the conversion ends (uploads).
    pub remove_input: bool,
}

impl JobOptions {
    pub fn from_defaults(defaults: &ConversionDefaults) -> Self {
        Self {
            width: defaults.width,
            fps: defaults.fps,
            start: None,
            duration: None,
            loop_mode: defaults.loop_mode,
            remove_input: false,
        }
    }
}

struct JobState {
    status: JobStatus,
    progress: ProgressEvent,
    error: Option<String>,
}

/// One tracked job.
struct JobEntry {
    id: JobId,
    created_at: DateTime<Utc>,
    created: Instant,
    output: PathBuf,
    state: Mutex<JobState>,
    tx: broadcast::Sender<JobEvent>,
}

impl JobEntry {
    fn snapshot_locked(&self, state: &JobState) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            status: state.status,
            progress: state.progress,
            error: state.error.clone(),
            created_at: self.created_at,
        }
    }

    fn snapshot(&self) -> JobSnapshot {
        let state = self.state.lock();
        self.snapshot_locked(&state)
    }

    fn publish_progress(&self, event: ProgressEvent) {
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return;
        }
        state.progress = event;
        // The terminal `done` event is sent by `finish` once the pipeline
        // has returned.
        if event.phase != Phase::Done {
            let _ = self.tx.send(JobEvent::Progress(event));
        }
    }

    fn finish(&self) {
        let mut state = self.state.lock();
        if state.progress.phase != Phase::Done {
            state.progress = ProgressEvent::done(state.progress.duration_ms);
        }
        state.status = JobStatus::Done;
        let _ = self.tx.send(JobEvent::Done(state.progress));
    }

    fn fail(&self, message: String) {
        let mut state = self.state.lock();
        state.status = JobStatus::Error;
        state.error = Some(message.clone());
        let _ = self.tx.send(JobEvent::Error { message });
    }
}

/// Terminal event reconstructed from a stored snapshot.
fn terminal_event(snapshot: &JobSnapshot) -> Option<JobEvent> {
    match snapshot.status {
        JobStatus::Running => None,
        JobStatus::Done => Some(JobEvent::Done(snapshot.progress)),
        JobStatus::Error => Some(JobEvent::Error {
            message: snapshot.error.clone().unwrap_or_default(),
        }),
    }
}

/// Registry of asynchronous conversion jobs.
///
/// Cheap to clone; all clones share the same job map.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<DashMap<JobId, Arc<JobEntry>>>,
    tools: Arc<ToolRegistry>,
    work_dir: PathBuf,
    ttl: Duration,
    limiter: Option<Arc<Semaphore>>,
}

impl JobRegistry {
    pub fn new(tools: Arc<ToolRegistry>, config: &JobsConfig) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            tools,
            work_dir: config.work_dir(),
            ttl: config.ttl(),
            // Zero would block every job forever; treat it as unbounded.
            limiter: config
                .max_concurrent
                .filter(|&n| n > 0)
                .map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Scratch directory for uploads and artifacts.
    pub fn work_dir(&self) -> &std::path::Path {
        &self.work_dir
    }

    /// Start a conversion of `input` in the background and return its id.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`cg_core::Error::Validation`] for a zero width/fps or an unparseable
    /// trim spec. Nothing is registered in that case.
    pub fn submit(&self, input: impl Into<PathBuf>, options: JobOptions) -> cg_core::Result<JobId> {
        TrimWindow::resolve(options.start.as_deref(), options.duration.as_deref())?;

        let id = JobId::new();
        let output = self.work_dir.join(format!("{id}.gif"));
        let request = ConversionRequest::new(input, &output, options.width, options.fps)?
            .with_start(options.start)
            .with_duration(options.duration)
            .with_loop_mode(options.loop_mode)
            .with_overwrite(true);

        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        let entry = Arc::new(JobEntry {
            id,
            created_at: Utc::now(),
            created: Instant::now(),
            output,
            state: Mutex::new(JobState {
                status: JobStatus::Running,
                progress: ProgressEvent::default(),
                error: None,
            }),
            tx,
        });
        self.jobs.insert(id, entry.clone());

        tracing::info!(
            job_id = %id,
            input = %request.input().display(),
            width = request.width(),
            fps = request.fps(),
            "Job submitted"
        );

        let jobs = self.jobs.clone();
        let tools = self.tools.clone();
        let limiter = self.limiter.clone();
        let remove_input = options.remove_input;
        tokio::spawn(async move {
            run_job(jobs, entry, tools, limiter, request, remove_input).await;
        });

        self.schedule_cleanup(id);
        Ok(id)
    }

    fn get(&self, id: JobId) -> cg_core::Result<Arc<JobEntry>> {
        self.jobs
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or_else(|| cg_core::Error::job_not_found(id))
    }

    /// Current snapshot of a job.
    pub fn snapshot(&self, id: JobId) -> cg_core::Result<JobSnapshot> {
        Ok(self.get(id)?.snapshot())
    }

    /// Subscribe to a job's events.
    ///
    /// The stream yields the current status snapshot first, then every later
    /// progress event, then exactly one terminal event, and ends. Dropping
    /// the stream detaches it.
    pub fn subscribe(
        &self,
        id: JobId,
    ) -> cg_core::Result<impl Stream<Item = JobEvent> + Send + 'static> {
        let entry = self.get(id)?;
        // Snapshot and receiver are taken under the same lock that every send
        // happens under, so no event falls between them.
        let (snapshot, mut rx) = {
            let state = entry.state.lock();
            (entry.snapshot_locked(&state), entry.tx.subscribe())
        };
        drop(entry);

        Ok(async_stream::stream! {
            yield JobEvent::status(&snapshot);

            if let Some(terminal) = terminal_event(&snapshot) {
                yield terminal;
            } else {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            let terminal = event.is_terminal();
                            yield event;
                            if terminal {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!(job_id = %id, "Subscriber lagged by {n} events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    /// Path of the finished artifact.
    ///
    /// # Errors
    ///
    /// `JobNotFound` for an unknown id, `JobFailed` with the stored message
    /// if the job errored, `JobNotReady` while it is still running.
    pub fn fetch_result(&self, id: JobId) -> cg_core::Result<PathBuf> {
        let entry = self.get(id)?;
        let state = entry.state.lock();
        match state.status {
            JobStatus::Running => Err(cg_core::Error::JobNotReady(id.to_string())),
            JobStatus::Error => Err(cg_core::Error::JobFailed(
                state.error.clone().unwrap_or_default(),
            )),
            JobStatus::Done => Ok(entry.output.clone()),
        }
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn schedule_cleanup(&self, id: JobId) {
        let jobs = self.jobs.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            purge_expired(&jobs, id, ttl).await;
        });
    }
}

async fn run_job(
    jobs: Arc<DashMap<JobId, Arc<JobEntry>>>,
    entry: Arc<JobEntry>,
    tools: Arc<ToolRegistry>,
    limiter: Option<Arc<Semaphore>>,
    request: ConversionRequest,
    remove_input: bool,
) {
    let _permit = match limiter {
        Some(sem) => sem.acquire_owned().await.ok(),
        None => None,
    };

    let result = convert_to_gif(&tools, &request, |event| entry.publish_progress(event)).await;

    // Subscribers that see the terminal event must not find the upload.
    if remove_input {
        remove_quietly(request.input()).await;
    }

    match result {
        Ok(()) => {
            tracing::info!(job_id = %entry.id, "Job completed");
            entry.finish();
        }
        Err(e) => {
            tracing::warn!(job_id = %entry.id, "Job failed: {e}");
            entry.fail(e.to_string());
        }
    }

    // Purged while still running: nobody can fetch this artifact anymore.
    if !jobs.contains_key(&entry.id) {
        remove_quietly(&entry.output).await;
    }
}

async fn purge_expired(jobs: &DashMap<JobId, Arc<JobEntry>>, id: JobId, ttl: Duration) {
    let expired = jobs
        .get(&id)
        .map(|e| e.created.elapsed() >= ttl)
        .unwrap_or(false);
    if !expired {
        return;
    }

    if let Some((_, entry)) = jobs.remove(&id) {
        remove_quietly(&entry.output).await;
        tracing::info!(job_id = %id, "Job expired and purged");
    }
}

async fn remove_quietly(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!("Failed to remove {}: {e}", path.display()),
    }
}
