use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{Builder, NamedTempFile, TempDir};
use tokio::sync::{mpsc, watch};
use tracing::warn;

use porter_storage::backend::{ObjectRef, StorageBackend};

use crate::crypto::{SealKey, open};
use crate::error::TransferError;
use crate::transfer::{CancelSignal, EventSink, TaskOutcome, TransferEvent, drive};

/// Download of a remote object into a local destination file.
///
/// Lifecycle: `Idle -> Started -> Downloading -> Finalizing ->
/// {Succeeded, Failed, Cancelled}`. Bytes land in a private staging
/// directory first; the destination only ever sees a fully decrypted,
/// fully written file, placed by an atomic rename.
pub struct Download<B: StorageBackend> {
    backend: Arc<B>,
    reference: B::Ref,
    dest: PathBuf,
    key: Option<SealKey>,
    cancel: CancelSignal,
    cancel_rx: watch::Receiver<bool>,
    started: bool,
}

impl<B: StorageBackend> std::fmt::Debug for Download<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("reference", &self.reference.path())
            .field("dest", &self.dest)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl<B: StorageBackend> Download<B> {
    /// Construct a cold download. Fails synchronously, before any staging
    /// directory is created: `NotAuthenticated` when the reference cannot
    /// be resolved, `Misconfiguration` when `dest` has no final path
    /// component to name the file after.
    pub fn new(
        backend: Arc<B>,
        remote_path: &str,
        dest: impl Into<PathBuf>,
        key: Option<SealKey>,
    ) -> Result<Self, TransferError> {
        let reference = backend
            .resolve(remote_path)
            .map_err(TransferError::from_backend)?;
        let dest = dest.into();
        if dest.file_name().is_none() {
            return Err(TransferError::Misconfiguration(format!(
                "destination {} has no file name",
                dest.display()
            )));
        }
        let (cancel, cancel_rx) = CancelSignal::channel();
        Ok(Self {
            backend,
            reference,
            dest,
            key,
            cancel,
            cancel_rx,
            started: false,
        })
    }

    pub fn reference(&self) -> &B::Ref {
        &self.reference
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// Start the download. The first call creates the single backend
    /// write-to-file task and returns the event stream; every later call is
    /// a no-op returning `None`. Must be called within a tokio runtime.
    pub fn start(&mut self) -> Option<mpsc::Receiver<TransferEvent>> {
        if self.started {
            return None;
        }
        self.started = true;

        let (sink, rx) = EventSink::channel();
        let backend = self.backend.clone();
        let reference = self.reference.clone();
        let dest = self.dest.clone();
        let key = self.key.clone();
        let cancel_rx = self.cancel_rx.clone();

        tokio::spawn(async move {
            let already_cancelled = *cancel_rx.borrow();
            if already_cancelled {
                sink.finish(Err(TransferError::Cancelled)).await;
                return;
            }

            // Stage next to the destination so the final rename never
            // crosses filesystems.
            let parent = parent_dir(&dest).to_path_buf();
            if let Err(e) = fs::create_dir_all(&parent) {
                sink.finish(Err(TransferError::disk(&parent, e))).await;
                return;
            }
            let staging = match Builder::new().prefix(".porter-").tempdir_in(&parent) {
                Ok(dir) => dir,
                Err(e) => {
                    sink.finish(Err(TransferError::disk(&parent, e))).await;
                    return;
                }
            };
            let Some(file_name) = dest.file_name().map(ToOwned::to_owned) else {
                remove_staging(staging);
                sink.finish(Err(TransferError::Misconfiguration(format!(
                    "destination {} has no file name",
                    dest.display()
                ))))
                .await;
                return;
            };
            let tmp_path = staging.path().join(file_name);

            let task = backend.write_to_file(&reference, &tmp_path);
            match drive(task, cancel_rx.clone(), sink).await {
                TaskOutcome::Delivered => {
                    // Failure or cancellation: drop whatever partially landed.
                    remove_staging(staging);
                }
                TaskOutcome::Success { sink, .. } => {
                    // A cancel that raced the backend's success event still
                    // wins if it arrived before finalization begins.
                    let cancelled_now = *cancel_rx.borrow();
                    if cancelled_now {
                        remove_staging(staging);
                        sink.finish(Err(TransferError::Cancelled)).await;
                        return;
                    }
                    // Finalization runs off the event path: decrypt and file
                    // placement must not stall progress delivery.
                    let outcome = match tokio::task::spawn_blocking(move || {
                        finalize(staging, &tmp_path, &dest, key.as_ref())
                    })
                    .await
                    {
                        Ok(result) => result,
                        Err(e) => Err(TransferError::Unknown(format!(
                            "finalization task failed: {e}"
                        ))),
                    };
                    sink.finish(outcome).await;
                }
            }
        });
        Some(rx)
    }

    /// Request cancellation. Synthesizes the `Cancelled` terminal
    /// immediately; the backend task is cancelled best-effort and the
    /// staging directory is removed. No-op once the terminal outcome has
    /// been delivered.
    pub fn cancel(&self) {
        self.cancel.trigger();
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Decrypt (when keyed) and place the downloaded bytes, then remove the
/// staging directory on every exit path.
fn finalize(
    staging: TempDir,
    tmp_path: &Path,
    dest: &Path,
    key: Option<&SealKey>,
) -> Result<(), TransferError> {
    let placed = place(tmp_path, dest, key);
    remove_staging(staging);
    placed
}

fn place(tmp_path: &Path, dest: &Path, key: Option<&SealKey>) -> Result<(), TransferError> {
    match key {
        Some(key) => {
            let sealed = fs::read(tmp_path).map_err(|e| TransferError::disk(tmp_path, e))?;
            // On decryption failure the destination is left untouched.
            let plaintext = open(&sealed, key)?;
            let dir = parent_dir(dest);
            let mut out = NamedTempFile::new_in(dir).map_err(|e| TransferError::disk(dir, e))?;
            out.write_all(&plaintext)
                .map_err(|e| TransferError::disk(dest, e))?;
            out.persist(dest)
                .map_err(|e| TransferError::disk(dest, e.error))?;
        }
        None => {
            remove_stale(dest);
            fs::rename(tmp_path, dest).map_err(|e| TransferError::disk(dest, e))?;
        }
    }
    Ok(())
}

/// Best-effort removal of a stale destination file before the rename.
fn remove_stale(dest: &Path) {
    match fs::remove_file(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove stale file {}: {e}", dest.display()),
    }
}

/// Cleanup is best-effort: a leftover staging directory is logged, never
/// escalated over the outcome already being delivered.
fn remove_staging(staging: TempDir) {
    let path = staging.path().to_path_buf();
    if let Err(e) = staging.close() {
        warn!("failed to remove staging directory {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use porter_storage::memory::MemoryBackend;
    use tempfile::TempDir;

    async fn outcome_of(events: &mut mpsc::Receiver<TransferEvent>) -> Result<(), TransferError> {
        while let Some(ev) = events.recv().await {
            if let TransferEvent::Finished(outcome) = ev {
                return outcome;
            }
        }
        panic!("event stream closed without a terminal outcome");
    }

    #[tokio::test]
    async fn destination_without_file_name_is_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        let err = Download::new(backend, "vault/x", "/", None).unwrap_err();
        assert!(matches!(err, TransferError::Misconfiguration(_)));
    }

    #[tokio::test]
    async fn unresolved_reference_fails_before_staging_exists() {
        let backend = Arc::new(MemoryBackend::unauthenticated());
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out/file.bin");
        let err = Download::new(backend, "vault/x", &dest, None).unwrap_err();
        assert_eq!(err, TransferError::NotAuthenticated);
        // Not even the parent directory was created.
        assert!(!dest.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn garbage_ciphertext_leaves_destination_untouched() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("vault/blob", b"this is not a sealed payload".to_vec());
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("blob.bin");

        let mut download = Download::new(
            backend,
            "vault/blob",
            &dest,
            Some(crate::crypto::SealKey::generate()),
        )
        .unwrap();
        let mut events = download.start().unwrap();
        let err = outcome_of(&mut events).await.unwrap_err();
        assert!(matches!(err, TransferError::DecryptionFailure(_)));
        assert!(!dest.exists());
        // Staging directory was removed as well.
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn plain_download_replaces_stale_destination() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("vault/blob", b"fresh contents".to_vec());
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("blob.bin");
        std::fs::write(&dest, b"stale contents").unwrap();

        let mut download = Download::new(backend, "vault/blob", &dest, None).unwrap();
        let mut events = download.start().unwrap();
        outcome_of(&mut events).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"fresh contents");
    }
}
