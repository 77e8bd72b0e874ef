//! End-to-end transfer lifecycle tests against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use porter_core::crypto::{SealKey, open};
use porter_core::{Deletion, Download, TransferError, TransferEvent, Upload};
use porter_storage::memory::MemoryBackend;
use porter_storage::status::{BackendError, StatusCode};

/// Drain a transfer's event stream: progress events seen, the terminal
/// outcome, and a check that nothing follows the terminal.
async fn drain(
    mut events: mpsc::Receiver<TransferEvent>,
) -> (usize, Result<(), TransferError>) {
    let mut progress_events = 0;
    let mut outcome = None;
    while let Some(ev) = events.recv().await {
        match ev {
            TransferEvent::Progress(p) => {
                assert!(
                    outcome.is_none(),
                    "progress delivered after the terminal outcome"
                );
                assert!(p.fraction_completed() >= 0.0 && p.fraction_completed() <= 1.0);
                progress_events += 1;
            }
            TransferEvent::Finished(o) => {
                assert!(outcome.is_none(), "second terminal outcome delivered");
                outcome = Some(o);
            }
        }
    }
    (
        progress_events,
        outcome.expect("stream closed without a terminal outcome"),
    )
}

#[tokio::test]
async fn sealed_roundtrip_upload_then_download() {
    let backend = Arc::new(MemoryBackend::new().with_chunk_size(16));
    let key = SealKey::generate();
    let payload = b"the quick brown fox jumps over the lazy dog".to_vec();

    let mut upload = Upload::new(
        backend.clone(),
        "vault/items/fox.bin",
        Some(payload.clone()),
        Some(key.clone()),
    )
    .unwrap();
    let (progress_events, outcome) = drain(upload.start().unwrap()).await;
    outcome.unwrap();
    assert!(progress_events > 0);

    // The stored object is ciphertext, not the payload, and opens back.
    let stored = backend.object("vault/items/fox.bin").unwrap();
    assert_ne!(stored, payload);
    assert_eq!(open(&stored, &key).unwrap(), payload);

    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("fox.bin");
    let mut download = Download::new(
        backend.clone(),
        "vault/items/fox.bin",
        &dest,
        Some(key),
    )
    .unwrap();
    let (progress_events, outcome) = drain(download.start().unwrap()).await;
    outcome.unwrap();
    assert!(progress_events > 0);

    assert_eq!(std::fs::read(&dest).unwrap(), payload);
    // No staging directory survives next to the destination.
    let entries: Vec<_> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("fox.bin")]);
}

#[tokio::test]
async fn plain_upload_stores_the_payload_verbatim() {
    let backend = Arc::new(MemoryBackend::new());
    let payload = b"plain bytes".to_vec();

    let mut upload =
        Upload::new(backend.clone(), "vault/plain.bin", Some(payload.clone()), None).unwrap();
    let (_, outcome) = drain(upload.start().unwrap()).await;
    outcome.unwrap();

    assert_eq!(backend.object("vault/plain.bin").unwrap(), payload);
}

#[tokio::test]
async fn upload_success_ends_with_full_progress() {
    let backend = Arc::new(MemoryBackend::new().with_chunk_size(8));
    let payload = vec![7u8; 50];

    let mut upload =
        Upload::new(backend.clone(), "vault/p.bin", Some(payload), None).unwrap();
    let mut events = upload.start().unwrap();

    let mut last_progress = None;
    let mut completed_history = Vec::new();
    while let Some(ev) = events.recv().await {
        match ev {
            TransferEvent::Progress(p) => {
                completed_history.push(p.completed);
                last_progress = Some(p);
            }
            TransferEvent::Finished(outcome) => outcome.unwrap(),
        }
    }
    // Non-decreasing ordering, ending at the known total.
    assert!(completed_history.windows(2).all(|w| w[0] <= w[1]));
    let last = last_progress.unwrap();
    assert_eq!(last.completed, 50);
    assert_eq!(last.total, Some(50));
    assert_eq!(last.fraction_completed(), 1.0);
}

#[tokio::test]
async fn download_of_missing_object_is_item_not_found() {
    let backend = Arc::new(MemoryBackend::new());
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("missing.bin");

    let mut download = Download::new(backend, "vault/missing", &dest, None).unwrap();
    let (_, outcome) = drain(download.start().unwrap()).await;
    assert_eq!(outcome.unwrap_err(), TransferError::ItemNotFound);
    assert!(!dest.exists());
}

#[tokio::test]
async fn deletion_of_missing_object_is_item_not_found() {
    let backend = Arc::new(MemoryBackend::new());
    let mut deletion = Deletion::new(backend, "vault/missing").unwrap();
    let outcome = deletion.start().unwrap().await.unwrap();
    assert_eq!(outcome.unwrap_err(), TransferError::ItemNotFound);
}

#[tokio::test]
async fn unauthenticated_transfers_fail_before_any_event() {
    let backend = Arc::new(MemoryBackend::unauthenticated());

    let err = Upload::new(backend.clone(), "vault/x", Some(vec![1]), None).unwrap_err();
    assert_eq!(err, TransferError::NotAuthenticated);

    let err = Download::new(backend.clone(), "vault/x", "/tmp/porter-x.bin", None).unwrap_err();
    assert_eq!(err, TransferError::NotAuthenticated);

    let err = Deletion::new(backend.clone(), "vault/x").unwrap_err();
    assert_eq!(err, TransferError::NotAuthenticated);

    assert_eq!(backend.tasks_started(), 0);
}

#[tokio::test]
async fn cancelling_an_inflight_download_leaves_no_destination_file() {
    let backend = Arc::new(
        MemoryBackend::new()
            .with_chunk_size(8)
            .with_step_delay(Duration::from_millis(10)),
    );
    backend.insert("vault/big.bin", vec![0u8; 4096]);
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("big.bin");

    let mut download = Download::new(backend, "vault/big.bin", &dest, None).unwrap();
    let mut events = download.start().unwrap();

    // Wait for the first progress event so the transfer is genuinely in
    // flight, then cancel.
    match events.recv().await {
        Some(TransferEvent::Progress(_)) => download.cancel(),
        other => panic!("expected progress, got {other:?}"),
    }

    let mut outcome = None;
    while let Some(ev) = events.recv().await {
        if let TransferEvent::Finished(o) = ev {
            assert!(outcome.is_none(), "second terminal outcome");
            outcome = Some(o);
        }
    }
    assert_eq!(outcome.unwrap().unwrap_err(), TransferError::Cancelled);
    assert!(!dest.exists());
    // Cancel after the terminal is a no-op.
    download.cancel();
}

#[tokio::test]
async fn cancel_before_start_never_creates_a_task() {
    let backend = Arc::new(MemoryBackend::new());
    let mut upload =
        Upload::new(backend.clone(), "vault/x", Some(vec![1, 2, 3]), None).unwrap();
    upload.cancel();

    let (progress_events, outcome) = drain(upload.start().unwrap()).await;
    assert_eq!(progress_events, 0);
    assert_eq!(outcome.unwrap_err(), TransferError::Cancelled);
    assert_eq!(backend.tasks_started(), 0);
    assert!(!backend.contains("vault/x"));
}

#[tokio::test]
async fn backend_failure_maps_through_the_taxonomy() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_next(BackendError::new(StatusCode::QuotaExceeded, "quota"));

    let mut upload = Upload::new(backend, "vault/x", Some(vec![1]), None).unwrap();
    let (_, outcome) = drain(upload.start().unwrap()).await;
    assert_eq!(outcome.unwrap_err(), TransferError::ServiceUnavailable);
}

#[tokio::test]
async fn delete_roundtrip_removes_the_object() {
    let backend = Arc::new(MemoryBackend::new());
    let mut upload =
        Upload::new(backend.clone(), "vault/tmp.bin", Some(vec![9; 10]), None).unwrap();
    let (_, outcome) = drain(upload.start().unwrap()).await;
    outcome.unwrap();
    assert!(backend.contains("vault/tmp.bin"));

    let mut deletion = Deletion::new(backend.clone(), "vault/tmp.bin").unwrap();
    deletion.start().unwrap().await.unwrap().unwrap();
    assert!(!backend.contains("vault/tmp.bin"));
}
