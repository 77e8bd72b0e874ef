use async_trait::async_trait;
use std::path::Path;

use crate::status::BackendError;
use crate::task::TaskHandle;

/// Handle to a remote object.
pub trait ObjectRef: Clone + Send + Sync + 'static {
    /// Short display name: the last segment of the remote path.
    fn name(&self) -> &str;

    /// Fully-qualified remote path.
    fn path(&self) -> &str;
}

/// Capability set required of a storage backend.
///
/// `put` and `write_to_file` start the network work immediately and return a
/// [`TaskHandle`] for it; both must be called from within a tokio runtime.
/// `delete` is a single-shot call with no mid-flight cancellation.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    type Ref: ObjectRef;

    /// Resolve a remote path into a reference. Fails with an
    /// `Unauthenticated` status when no authenticated session exists.
    fn resolve(&self, path: &str) -> Result<Self::Ref, BackendError>;

    /// Start uploading `bytes` to the referenced object.
    fn put(&self, reference: &Self::Ref, bytes: Vec<u8>) -> TaskHandle;

    /// Start downloading the referenced object into the file at `dest`.
    fn write_to_file(&self, reference: &Self::Ref, dest: &Path) -> TaskHandle;

    /// Delete the referenced object.
    async fn delete(&self, reference: &Self::Ref) -> Result<(), BackendError>;

    /// Obtain a shareable download link for the referenced object.
    async fn download_url(&self, reference: &Self::Ref) -> Result<String, BackendError>;
}

/// Last path segment, used as an object's display name.
pub(crate) fn display_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
