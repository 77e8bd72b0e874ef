//! The observer contract between a backend worker and its consumer.
//!
//! A backend operation (put, write-to-file) hands back a [`TaskHandle`] and
//! keeps the paired [`TaskContext`]. The worker emits lifecycle events over a
//! bounded channel and polls the control flags cooperatively; the consumer
//! reads events and flips the flags. Terminal events (`Success`, `Failure`)
//! are emitted at most once, and a well-behaved worker stops after emitting
//! one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::status::BackendError;

const EVENT_BUFFER: usize = 32;
const CONTROL_POLL: Duration = Duration::from_millis(20);

/// Point-in-time view of an in-flight task.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub completed: u64,
    pub total: Option<u64>,
    pub error: Option<BackendError>,
    /// Remote path of the object the task operates on.
    pub path: String,
}

/// Lifecycle events emitted by a backend worker.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Progress(TaskSnapshot),
    Paused(TaskSnapshot),
    Resumed(TaskSnapshot),
    Success(TaskSnapshot),
    Failure(TaskSnapshot),
}

/// Consumer side of a running backend task.
///
/// Exclusively owned by the transfer that started the task. Control requests
/// are cooperative: `cancel` asks the worker to stop at its next checkpoint,
/// it does not guarantee immediate termination.
pub struct TaskHandle {
    events: mpsc::Receiver<TaskEvent>,
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Next lifecycle event, or `None` once the worker is gone.
    pub async fn next_event(&mut self) -> Option<TaskEvent> {
        self.events.recv().await
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Worker side of a task: emits events, observes control flags.
#[derive(Clone)]
pub struct TaskContext {
    events: mpsc::Sender<TaskEvent>,
    paused: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    path: String,
}

/// Create a connected handle/context pair for the object at `path`.
pub fn task_pair(path: &str) -> (TaskHandle, TaskContext) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let paused = Arc::new(AtomicBool::new(false));
    let cancelled = Arc::new(AtomicBool::new(false));
    let handle = TaskHandle {
        events: rx,
        paused: paused.clone(),
        cancelled: cancelled.clone(),
    };
    let ctx = TaskContext {
        events: tx,
        paused,
        cancelled,
        path: path.to_string(),
    };
    (handle, ctx)
}

impl TaskContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Resolves once cancellation is requested. Useful to race against a
    /// backend future that has no internal checkpoints.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(CONTROL_POLL).await;
        }
    }

    fn snapshot(&self, completed: u64, total: Option<u64>) -> TaskSnapshot {
        TaskSnapshot {
            completed,
            total,
            error: None,
            path: self.path.clone(),
        }
    }

    /// Emit a progress event. Returns `false` when the handle is gone and
    /// the worker should stop.
    pub async fn progress(&self, completed: u64, total: Option<u64>) -> bool {
        self.events
            .send(TaskEvent::Progress(self.snapshot(completed, total)))
            .await
            .is_ok()
    }

    pub async fn paused_at(&self, completed: u64, total: Option<u64>) -> bool {
        self.events
            .send(TaskEvent::Paused(self.snapshot(completed, total)))
            .await
            .is_ok()
    }

    pub async fn resumed_at(&self, completed: u64, total: Option<u64>) -> bool {
        self.events
            .send(TaskEvent::Resumed(self.snapshot(completed, total)))
            .await
            .is_ok()
    }

    /// Emit the terminal success event.
    pub async fn success(&self, completed: u64, total: Option<u64>) {
        let _ = self
            .events
            .send(TaskEvent::Success(self.snapshot(completed, total)))
            .await;
    }

    /// Emit the terminal failure event.
    pub async fn failure(&self, error: BackendError) {
        let mut snapshot = self.snapshot(0, None);
        snapshot.error = Some(error);
        let _ = self.events.send(TaskEvent::Failure(snapshot)).await;
    }
}
