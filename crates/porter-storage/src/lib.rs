pub mod backend;
pub mod memory;
pub mod s3;
pub mod status;
pub mod task;

pub use backend::{ObjectRef, StorageBackend};
pub use memory::{MemoryBackend, MemoryRef};
pub use status::{BackendError, StatusCode};
pub use task::{TaskContext, TaskEvent, TaskHandle, TaskSnapshot, task_pair};

#[cfg(feature = "s3")]
pub use s3::{S3Backend, S3Options, S3Ref};
