use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use porter_storage::backend::{ObjectRef, StorageBackend};

use crate::crypto::{SealKey, seal};
use crate::error::TransferError;
use crate::transfer::{CancelSignal, EventSink, TaskOutcome, TransferEvent, drive};

/// Upload of a single payload to a remote object.
///
/// Lifecycle: `Idle -> Started -> {Succeeded, Failed, Cancelled}`. The
/// payload is sealed before transfer when a key is present, so the backend
/// only ever sees ciphertext.
pub struct Upload<B: StorageBackend> {
    backend: Arc<B>,
    reference: B::Ref,
    payload: Option<Vec<u8>>,
    key: Option<SealKey>,
    cancel: CancelSignal,
    cancel_rx: watch::Receiver<bool>,
    started: bool,
}

impl<B: StorageBackend> std::fmt::Debug for Upload<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("reference", &self.reference.path())
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl<B: StorageBackend> Upload<B> {
    /// Construct a cold upload. Fails synchronously, before any backend
    /// task exists: `NotAuthenticated` when the reference cannot be
    /// resolved, `NoData` when there is no payload.
    pub fn new(
        backend: Arc<B>,
        remote_path: &str,
        payload: Option<Vec<u8>>,
        key: Option<SealKey>,
    ) -> Result<Self, TransferError> {
        let reference = backend
            .resolve(remote_path)
            .map_err(TransferError::from_backend)?;
        let payload = payload.ok_or(TransferError::NoData)?;
        let (cancel, cancel_rx) = CancelSignal::channel();
        Ok(Self {
            backend,
            reference,
            payload: Some(payload),
            key,
            cancel,
            cancel_rx,
            started: false,
        })
    }

    pub fn reference(&self) -> &B::Ref {
        &self.reference
    }

    /// Start the upload. The first call creates the single backend put-task
    /// and returns the event stream; every later call is a no-op returning
    /// `None`. Must be called within a tokio runtime.
    pub fn start(&mut self) -> Option<mpsc::Receiver<TransferEvent>> {
        if self.started {
            return None;
        }
        self.started = true;
        let payload = self.payload.take()?;

        let (sink, rx) = EventSink::channel();
        let backend = self.backend.clone();
        let reference = self.reference.clone();
        let key = self.key.clone();
        let cancel_rx = self.cancel_rx.clone();

        tokio::spawn(async move {
            // Cancelled before starting: never create the task.
            let already_cancelled = *cancel_rx.borrow();
            if already_cancelled {
                sink.finish(Err(TransferError::Cancelled)).await;
                return;
            }
            let body = match &key {
                Some(key) => match seal(&payload, key) {
                    Ok(sealed) => sealed,
                    Err(e) => {
                        sink.finish(Err(e)).await;
                        return;
                    }
                },
                None => payload,
            };
            let task = backend.put(&reference, body);
            match drive(task, cancel_rx, sink).await {
                TaskOutcome::Delivered => {}
                TaskOutcome::Success { sink, .. } => sink.finish(Ok(())).await,
            }
        });
        Some(rx)
    }

    /// Request cancellation. Synthesizes the `Cancelled` terminal
    /// immediately; the backend task is cancelled best-effort. No-op once
    /// the terminal outcome has been delivered.
    pub fn cancel(&self) {
        self.cancel.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use porter_storage::memory::MemoryBackend;

    #[tokio::test]
    async fn missing_payload_fails_before_any_task() {
        let backend = Arc::new(MemoryBackend::new());
        let err = Upload::new(backend.clone(), "vault/x", None, None).unwrap_err();
        assert_eq!(err, TransferError::NoData);
        assert_eq!(backend.tasks_started(), 0);
    }

    #[tokio::test]
    async fn unresolved_reference_fails_before_any_task() {
        let backend = Arc::new(MemoryBackend::unauthenticated());
        let err = Upload::new(backend.clone(), "vault/x", Some(vec![1]), None).unwrap_err();
        assert_eq!(err, TransferError::NotAuthenticated);
        assert_eq!(backend.tasks_started(), 0);
    }

    #[tokio::test]
    async fn second_start_is_a_noop() {
        let backend = Arc::new(MemoryBackend::new());
        let mut upload = Upload::new(backend.clone(), "vault/x", Some(vec![1, 2, 3]), None).unwrap();
        let mut events = upload.start().unwrap();
        assert!(upload.start().is_none());

        while let Some(ev) = events.recv().await {
            if let TransferEvent::Finished(outcome) = ev {
                outcome.unwrap();
            }
        }
        assert!(upload.start().is_none());
        assert_eq!(backend.tasks_started(), 1);
    }
}
