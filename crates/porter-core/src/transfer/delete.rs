use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::debug;

use porter_storage::backend::{ObjectRef, StorageBackend};

use crate::error::TransferError;

/// Deletion of a single remote object.
///
/// Lifecycle: `Idle -> Started -> {Succeeded, Failed}`. No progress channel;
/// the outcome is binary and delivered exactly once.
pub struct Deletion<B: StorageBackend> {
    backend: Arc<B>,
    reference: B::Ref,
    started: bool,
}

impl<B: StorageBackend> std::fmt::Debug for Deletion<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deletion")
            .field("reference", &self.reference.path())
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl<B: StorageBackend> Deletion<B> {
    /// Construct a cold deletion. Fails synchronously with
    /// `NotAuthenticated` when the reference cannot be resolved.
    pub fn new(backend: Arc<B>, remote_path: &str) -> Result<Self, TransferError> {
        let reference = backend
            .resolve(remote_path)
            .map_err(TransferError::from_backend)?;
        Ok(Self {
            backend,
            reference,
            started: false,
        })
    }

    pub fn reference(&self) -> &B::Ref {
        &self.reference
    }

    /// Start the deletion. The first call issues the single backend delete
    /// and returns the outcome channel; every later call is a no-op
    /// returning `None`. Must be called within a tokio runtime.
    pub fn start(&mut self) -> Option<oneshot::Receiver<Result<(), TransferError>>> {
        if self.started {
            return None;
        }
        self.started = true;

        let (tx, rx) = oneshot::channel();
        let backend = self.backend.clone();
        let reference = self.reference.clone();
        tokio::spawn(async move {
            let outcome = backend
                .delete(&reference)
                .await
                .map_err(TransferError::from_backend);
            let _ = tx.send(outcome);
        });
        Some(rx)
    }

    /// Accepted for API symmetry; the backend delete primitive offers no
    /// mid-flight cancellation, so this has no effect on an in-flight call.
    pub fn cancel(&self) {
        debug!("deletion of {} cannot be cancelled in flight", self.reference.path());
    }
}
