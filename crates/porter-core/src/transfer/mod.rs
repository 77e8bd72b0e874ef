//! Transfer lifecycle state machines.
//!
//! A transfer is cold: construction resolves the reference and checks
//! synchronous preconditions, but no network work happens until the first
//! `start` call. `start` spawns a single driver task that exclusively owns
//! the backend task handle and the progress state; callers interact only
//! through `start`/`cancel` and the returned event stream. Exactly one
//! terminal event is delivered, and the stream closes right after it.

mod delete;
mod download;
mod upload;

pub use delete::Deletion;
pub use download::Download;
pub use upload::Upload;

use tokio::sync::{mpsc, watch};

use porter_storage::task::{TaskEvent, TaskHandle};

use crate::error::TransferError;
use crate::progress::Progress;

pub(crate) const EVENT_BUFFER: usize = 32;

/// Events delivered to a transfer's consumer: zero or more progress updates
/// followed by exactly one terminal outcome.
#[derive(Debug)]
pub enum TransferEvent {
    Progress(Progress),
    /// Terminal outcome. Nothing is delivered after this; cancellation
    /// surfaces as `Err(TransferError::Cancelled)`.
    Finished(Result<(), TransferError>),
}

/// Consumer-facing event channel. `finish` consumes the sink, so a second
/// terminal event is unrepresentable.
pub(crate) struct EventSink {
    tx: mpsc::Sender<TransferEvent>,
}

impl EventSink {
    pub(crate) fn channel() -> (Self, mpsc::Receiver<TransferEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        (Self { tx }, rx)
    }

    /// Forward a progress update. Returns `false` when the consumer dropped
    /// its receiver and the transfer should wind down.
    pub(crate) async fn progress(&self, progress: Progress) -> bool {
        self.tx
            .send(TransferEvent::Progress(progress))
            .await
            .is_ok()
    }

    /// Deliver the terminal outcome.
    pub(crate) async fn finish(self, outcome: Result<(), TransferError>) {
        let _ = self.tx.send(TransferEvent::Finished(outcome)).await;
    }
}

/// Cancellation side of a transfer. Requests are sticky and idempotent; a
/// request after the terminal outcome is delivered has no effect.
pub(crate) struct CancelSignal {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    pub(crate) fn channel() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    pub(crate) fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Resolves once cancellation is requested; pends forever if the transfer
/// handle is gone (cancellation can no longer arrive).
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|flagged| *flagged).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Outcome of driving a backend task to its terminal event.
pub(crate) enum TaskOutcome {
    /// The terminal was already delivered (failure, cancellation, or the
    /// consumer went away). Nothing further to do but clean up.
    Delivered,
    /// Clean backend success: the sink is handed back for the caller to
    /// finish, after any post-processing of its own.
    Success { sink: EventSink, progress: Progress },
}

/// Shared event loop for task-backed transfers: forwards progress, maps
/// failures through the taxonomy, and synthesizes the cancelled terminal
/// without waiting for backend acknowledgment.
pub(crate) async fn drive(
    mut task: TaskHandle,
    mut cancel_rx: watch::Receiver<bool>,
    sink: EventSink,
) -> TaskOutcome {
    let mut progress = Progress::default();
    loop {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => {
                task.cancel();
                sink.finish(Err(TransferError::Cancelled)).await;
                return TaskOutcome::Delivered;
            }
            event = task.next_event() => match event {
                Some(TaskEvent::Progress(snapshot)) => {
                    progress.update(snapshot.completed, snapshot.total);
                    if !sink.progress(progress).await {
                        task.cancel();
                        return TaskOutcome::Delivered;
                    }
                }
                Some(TaskEvent::Paused(_)) | Some(TaskEvent::Resumed(_)) => {
                    // Transient backend states; no terminal transition.
                }
                Some(TaskEvent::Success(snapshot)) => {
                    // A success snapshot can still carry an error.
                    if let Some(err) = snapshot.error {
                        sink.finish(Err(TransferError::from_backend(err))).await;
                        return TaskOutcome::Delivered;
                    }
                    progress.update(snapshot.completed, snapshot.total);
                    progress.complete();
                    let _ = sink.progress(progress).await;
                    return TaskOutcome::Success { sink, progress };
                }
                Some(TaskEvent::Failure(snapshot)) => {
                    let err = snapshot.error.map(TransferError::from_backend).unwrap_or_else(
                        || TransferError::Unknown("backend failure with no error".to_string()),
                    );
                    sink.finish(Err(err)).await;
                    return TaskOutcome::Delivered;
                }
                None => {
                    sink.finish(Err(TransferError::Unknown(
                        "backend task ended without a terminal event".to_string(),
                    )))
                    .await;
                    return TaskOutcome::Delivered;
                }
            }
        }
    }
}
