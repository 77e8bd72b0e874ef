//! In-memory storage backend.
//!
//! A per-fixture object store for tests and offline use: no process-wide
//! state, auth is a property of the fixture, and failures can be injected to
//! exercise consumer error paths. Workers emit progress in configurable
//! chunks and observe pause/cancel between chunks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::backend::{ObjectRef, StorageBackend, display_name};
use crate::status::{BackendError, StatusCode};
use crate::task::{TaskContext, TaskHandle, task_pair};

const DEFAULT_CHUNK: usize = 64 * 1024;
const PAUSE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct MemoryRef {
    name: String,
    path: String,
}

impl ObjectRef for MemoryRef {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Default)]
struct MemoryState {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_next: Mutex<Option<BackendError>>,
    tasks_started: AtomicUsize,
}

impl MemoryState {
    fn take_injected(&self) -> Option<BackendError> {
        self.fail_next.lock().unwrap().take()
    }
}

/// In-memory [`StorageBackend`] fixture.
///
/// Clones share the same object store, so a test can hold one handle for
/// seeding/inspection while transfers drive another.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<MemoryState>,
    authenticated: bool,
    chunk_size: usize,
    step_delay: Option<Duration>,
}

impl MemoryBackend {
    /// Backend with an authenticated session.
    pub fn new() -> Self {
        Self {
            state: Arc::new(MemoryState::default()),
            authenticated: true,
            chunk_size: DEFAULT_CHUNK,
            step_delay: None,
        }
    }

    /// Backend with no signed-in session; `resolve` fails.
    pub fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            ..Self::new()
        }
    }

    /// Progress granularity for task workers.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Delay between worker steps, to make in-flight states observable.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Seed an object directly, bypassing the task machinery.
    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.state
            .objects
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.into());
    }

    /// Stored bytes for `path`, if present.
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.state.objects.lock().unwrap().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.objects.lock().unwrap().contains_key(path)
    }

    /// Make the next task or delete call fail with `error`.
    pub fn fail_next(&self, error: BackendError) {
        *self.state.fail_next.lock().unwrap() = Some(error);
    }

    /// Number of put/write-to-file tasks ever started.
    pub fn tasks_started(&self) -> usize {
        self.state.tasks_started.load(Ordering::Relaxed)
    }

    async fn step(&self) {
        match self.step_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Emit a pause event and hold until resumed or cancelled.
async fn hold_while_paused(ctx: &TaskContext, completed: u64, total: Option<u64>) {
    if !ctx.is_paused() {
        return;
    }
    let _ = ctx.paused_at(completed, total).await;
    while ctx.is_paused() && !ctx.is_cancelled() {
        tokio::time::sleep(PAUSE_POLL).await;
    }
    if !ctx.is_cancelled() {
        let _ = ctx.resumed_at(completed, total).await;
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Ref = MemoryRef;

    fn resolve(&self, path: &str) -> Result<Self::Ref, BackendError> {
        if !self.authenticated {
            return Err(BackendError::new(
                StatusCode::Unauthenticated,
                "no signed-in session",
            ));
        }
        Ok(MemoryRef {
            name: display_name(path).to_string(),
            path: path.to_string(),
        })
    }

    fn put(&self, reference: &Self::Ref, bytes: Vec<u8>) -> TaskHandle {
        let (handle, ctx) = task_pair(reference.path());
        self.state.tasks_started.fetch_add(1, Ordering::Relaxed);
        let backend = self.clone();
        let path = reference.path().to_string();
        tokio::spawn(async move {
            if let Some(err) = backend.state.take_injected() {
                ctx.failure(err).await;
                return;
            }
            let total = bytes.len() as u64;
            let chunk = backend.chunk_size as u64;
            let mut sent = 0u64;
            while sent < total {
                if ctx.is_cancelled() {
                    ctx.failure(BackendError::cancelled()).await;
                    return;
                }
                hold_while_paused(&ctx, sent, Some(total)).await;
                sent = (sent + chunk).min(total);
                if !ctx.progress(sent, Some(total)).await {
                    return;
                }
                backend.step().await;
            }
            if ctx.is_cancelled() {
                ctx.failure(BackendError::cancelled()).await;
                return;
            }
            backend.state.objects.lock().unwrap().insert(path, bytes);
            ctx.success(total, Some(total)).await;
        });
        handle
    }

    fn write_to_file(&self, reference: &Self::Ref, dest: &Path) -> TaskHandle {
        let (handle, ctx) = task_pair(reference.path());
        self.state.tasks_started.fetch_add(1, Ordering::Relaxed);
        let backend = self.clone();
        let path = reference.path().to_string();
        let dest = dest.to_path_buf();
        tokio::spawn(async move {
            if let Some(err) = backend.state.take_injected() {
                ctx.failure(err).await;
                return;
            }
            let Some(bytes) = backend.object(&path) else {
                ctx.failure(BackendError::new(
                    StatusCode::ObjectNotFound,
                    format!("no object at {path}"),
                ))
                .await;
                return;
            };
            let mut file = match tokio::fs::File::create(&dest).await {
                Ok(f) => f,
                Err(e) => {
                    ctx.failure(BackendError::new(
                        StatusCode::Unknown,
                        format!("create {}: {e}", dest.display()),
                    ))
                    .await;
                    return;
                }
            };
            let total = bytes.len() as u64;
            let mut written = 0usize;
            while written < bytes.len() {
                if ctx.is_cancelled() {
                    ctx.failure(BackendError::cancelled()).await;
                    return;
                }
                hold_while_paused(&ctx, written as u64, Some(total)).await;
                let end = (written + backend.chunk_size).min(bytes.len());
                if let Err(e) = file.write_all(&bytes[written..end]).await {
                    ctx.failure(BackendError::new(
                        StatusCode::Unknown,
                        format!("write {}: {e}", dest.display()),
                    ))
                    .await;
                    return;
                }
                written = end;
                if !ctx.progress(written as u64, Some(total)).await {
                    return;
                }
                backend.step().await;
            }
            if let Err(e) = file.flush().await {
                ctx.failure(BackendError::new(
                    StatusCode::Unknown,
                    format!("flush {}: {e}", dest.display()),
                ))
                .await;
                return;
            }
            if ctx.is_cancelled() {
                ctx.failure(BackendError::cancelled()).await;
                return;
            }
            ctx.success(total, Some(total)).await;
        });
        handle
    }

    async fn delete(&self, reference: &Self::Ref) -> Result<(), BackendError> {
        if let Some(err) = self.state.take_injected() {
            return Err(err);
        }
        match self
            .state
            .objects
            .lock()
            .unwrap()
            .remove(reference.path())
        {
            Some(_) => Ok(()),
            None => Err(BackendError::new(
                StatusCode::ObjectNotFound,
                format!("no object at {}", reference.path()),
            )),
        }
    }

    async fn download_url(&self, reference: &Self::Ref) -> Result<String, BackendError> {
        if self.contains(reference.path()) {
            Ok(format!("memory://{}", reference.path()))
        } else {
            Err(BackendError::new(
                StatusCode::ObjectNotFound,
                format!("no object at {}", reference.path()),
            ))
        }
    }
}
