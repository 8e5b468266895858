// src/job.rs
//! Deletion jobs and the registry that owns them.
//!
//! Each run gets its own [`Job`] with a private cancellation flag, so a
//! cancel request is addressed to one run instead of a process-wide
//! boolean. The registry admits one running job at a time and keeps a
//! bounded history of finished ones for inspection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::error::{DeletionError, JobError};
use crate::message::DeletionResult;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// Progress notifications, streamed to web clients as they happen.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    PageScanned { page: u32, messages: usize },
    Deleted { message_id: String, content: String, total: usize },
    Skipped { message_id: String, reason: String },
    Finished { status: JobStatus },
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::PageScanned { .. } => "page_scanned",
            JobEvent::Deleted { .. } => "deleted",
            JobEvent::Skipped { .. } => "skipped",
            JobEvent::Finished { .. } => "finished",
        }
    }
}

#[derive(Debug, Default)]
struct Outcome {
    status: Option<JobStatus>,
    finished_at: Option<DateTime<Utc>>,
    result: Option<DeletionResult>,
    error: Option<String>,
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub channel_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_scanned: usize,
    pub messages_scanned: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub result: Option<DeletionResult>,
    pub error: Option<String>,
}

/// One deletion run: its cancellation flag and progress counters.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    channel_id: String,
    user_id: String,
    started_at: DateTime<Utc>,
    cancel: Arc<AtomicBool>,
    pages: AtomicUsize,
    scanned: AtomicUsize,
    deleted: AtomicUsize,
    skipped: AtomicUsize,
    outcome: Mutex<Outcome>,
    events: broadcast::Sender<JobEvent>,
}

impl Job {
    pub fn new(channel_id: &str, user_id: &str) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id: JobId::generate(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            started_at: Utc::now(),
            cancel: Arc::new(AtomicBool::new(false)),
            pages: AtomicUsize::new(0),
            scanned: AtomicUsize::new(0),
            deleted: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            outcome: Mutex::new(Outcome::default()),
            events,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Ask the run to stop at its next checkpoint. Returns immediately.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// The raw flag, for wiring to signal handlers.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn record_page(&self, page: u32, messages: usize) {
        self.pages.fetch_add(1, Ordering::Relaxed);
        self.scanned.fetch_add(messages, Ordering::Relaxed);
        self.emit(JobEvent::PageScanned { page, messages });
    }

    pub fn record_deleted(&self, message_id: &str, content: &str) {
        let total = self.deleted.fetch_add(1, Ordering::Relaxed) + 1;
        self.emit(JobEvent::Deleted {
            message_id: message_id.to_string(),
            content: content.to_string(),
            total,
        });
    }

    pub fn record_skipped(&self, message_id: &str, reason: &str) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        self.emit(JobEvent::Skipped {
            message_id: message_id.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> JobStatus {
        self.lock_outcome().status.unwrap_or(JobStatus::Running)
    }

    pub fn is_running(&self) -> bool {
        self.status() == JobStatus::Running
    }

    /// Store the run's outcome. Only the first call has an effect.
    pub fn finish(&self, outcome: &Result<DeletionResult, DeletionError>) -> JobStatus {
        match outcome {
            Ok(result) => {
                let status = if result.is_cancelled() {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Completed
                };
                self.settle(status, Some(result.clone()), None)
            }
            Err(e) => self.settle(JobStatus::Failed, e.partial().cloned(), Some(e.to_string())),
        }
    }

    /// Mark the job failed when the run never produced an outcome.
    pub fn abort(&self, reason: &str) -> JobStatus {
        self.settle(JobStatus::Failed, None, Some(reason.to_string()))
    }

    fn settle(
        &self,
        status: JobStatus,
        result: Option<DeletionResult>,
        error: Option<String>,
    ) -> JobStatus {
        {
            let mut slot = self.lock_outcome();
            if let Some(existing) = slot.status {
                return existing;
            }
            slot.status = Some(status);
            slot.finished_at = Some(Utc::now());
            slot.result = result;
            slot.error = error;
        }
        info!(job = %self.id, ?status, "Job finished");
        self.emit(JobEvent::Finished { status });
        status
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let outcome = self.lock_outcome();
        JobSnapshot {
            id: self.id.clone(),
            status: outcome.status.unwrap_or(JobStatus::Running),
            channel_id: self.channel_id.clone(),
            user_id: self.user_id.clone(),
            started_at: self.started_at,
            finished_at: outcome.finished_at,
            pages_scanned: self.pages.load(Ordering::Relaxed),
            messages_scanned: self.scanned.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            result: outcome.result.clone(),
            error: outcome.error.clone(),
        }
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is the common case.
        let _ = self.events.send(event);
    }

    fn lock_outcome(&self) -> MutexGuard<'_, Outcome> {
        self.outcome.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Feed a job's events to `on_event` from a blocking thread until its
/// `finished` event. Events dropped because the receiver fell behind are
/// skipped.
pub fn follow_events(
    events: &mut broadcast::Receiver<JobEvent>,
    mut on_event: impl FnMut(&JobEvent),
) {
    loop {
        match events.blocking_recv() {
            Ok(event) => {
                on_event(&event);
                if matches!(event, JobEvent::Finished { .. }) {
                    break;
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "Progress output fell behind, events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// All jobs of this process, newest last.
pub struct JobRegistry {
    jobs: Mutex<VecDeque<Arc<Job>>>,
    history: usize,
}

impl JobRegistry {
    /// `history` is the number of finished jobs kept around.
    pub fn new(history: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            history,
        }
    }

    /// Create and register a job, unless another one is still running.
    pub fn start(&self, channel_id: &str, user_id: &str) -> Result<Arc<Job>, JobError> {
        let mut jobs = self.lock_jobs();
        if let Some(running) = jobs.iter().find(|job| job.is_running()) {
            return Err(JobError::Busy(running.id().clone()));
        }

        let job = Arc::new(Job::new(channel_id, user_id));
        jobs.push_back(Arc::clone(&job));
        while jobs.len() > self.history + 1 {
            match jobs.iter().position(|job| !job.is_running()) {
                Some(oldest_finished) => {
                    jobs.remove(oldest_finished);
                }
                None => break,
            }
        }
        info!(job = %job.id(), channel_id, user_id, "Job started");
        Ok(job)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Job>, JobError> {
        self.lock_jobs()
            .iter()
            .find(|job| job.id().as_str() == id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    pub fn cancel(&self, id: &str) -> Result<(), JobError> {
        let job = self.get(id)?;
        job.request_cancel();
        info!(job = %job.id(), "Cancellation requested");
        Ok(())
    }

    /// Flag the running job, if any. Returns its id.
    pub fn cancel_running(&self) -> Option<JobId> {
        let running = self
            .lock_jobs()
            .iter()
            .find(|job| job.is_running())
            .cloned()?;
        running.request_cancel();
        info!(job = %running.id(), "Cancellation requested");
        Some(running.id().clone())
    }

    pub fn len(&self) -> usize {
        self.lock_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_jobs().is_empty()
    }

    fn lock_jobs(&self) -> MutexGuard<'_, VecDeque<Arc<Job>>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}
