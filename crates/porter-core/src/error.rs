use std::path::Path;

use porter_storage::status::{BackendError, StatusCode};
use thiserror::Error;

/// Stable, backend-agnostic transfer failure taxonomy.
///
/// Every backend-specific failure is mapped into one of these kinds inside
/// the transfer that observed it; nothing backend-flavored crosses this
/// boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("no authenticated session")]
    NotAuthenticated,

    #[error("not authorized for this object")]
    Unauthorized,

    #[error("object not found")]
    ItemNotFound,

    #[error("transfer cancelled")]
    Cancelled,

    #[error("network unavailable")]
    NetworkUnavailable,

    #[error("storage service unavailable")]
    ServiceUnavailable,

    #[error("disk I/O error: {0}")]
    DiskIo(String),

    #[error("decryption failed: {0}")]
    DecryptionFailure(String),

    #[error("misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("no payload to upload")]
    NoData,

    #[error("storage error: {0}")]
    Unknown(String),
}

impl TransferError {
    /// Map a backend failure into the taxonomy. Total over the backend's
    /// code space: codes this build does not recognize land in `Unknown`,
    /// they are never rejected.
    pub fn from_backend(err: BackendError) -> Self {
        match err.code {
            StatusCode::Unauthenticated => TransferError::NotAuthenticated,
            StatusCode::Unauthorized => TransferError::Unauthorized,
            StatusCode::ObjectNotFound => TransferError::ItemNotFound,
            StatusCode::Cancelled => TransferError::Cancelled,
            StatusCode::RetryLimitExceeded => TransferError::NetworkUnavailable,
            StatusCode::QuotaExceeded => TransferError::ServiceUnavailable,
            StatusCode::BucketNotConfigured
            | StatusCode::ProjectNotConfigured
            | StatusCode::InvalidArgument => TransferError::Misconfiguration(err.message),
            _ => TransferError::Unknown(err.message),
        }
    }

    /// Disk failure with enough detail to diagnose: path plus OS error.
    pub(crate) fn disk(path: &Path, err: std::io::Error) -> Self {
        TransferError::DiskIo(format!("{}: {err}", path.display()))
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_codes_map_to_stable_kinds() {
        let cases = [
            (StatusCode::Unauthenticated, TransferError::NotAuthenticated),
            (StatusCode::Unauthorized, TransferError::Unauthorized),
            (StatusCode::ObjectNotFound, TransferError::ItemNotFound),
            (StatusCode::Cancelled, TransferError::Cancelled),
            (
                StatusCode::RetryLimitExceeded,
                TransferError::NetworkUnavailable,
            ),
            (StatusCode::QuotaExceeded, TransferError::ServiceUnavailable),
        ];
        for (code, expected) in cases {
            let mapped = TransferError::from_backend(BackendError::new(code, "detail"));
            assert_eq!(mapped, expected, "for {code:?}");
        }
    }

    #[test]
    fn misconfiguration_codes_keep_their_detail() {
        let mapped = TransferError::from_backend(BackendError::new(
            StatusCode::BucketNotConfigured,
            "bucket missing",
        ));
        assert_eq!(
            mapped,
            TransferError::Misconfiguration("bucket missing".into())
        );
    }

    #[test]
    fn unrecognized_codes_become_unknown() {
        for code in [
            StatusCode::Unknown,
            StatusCode::ChecksumMismatch,
            StatusCode::DownloadSizeExceeded,
        ] {
            match TransferError::from_backend(BackendError::new(code, "detail")) {
                TransferError::Unknown(msg) => assert_eq!(msg, "detail"),
                other => panic!("expected Unknown for {code:?}, got {other:?}"),
            }
        }
    }
}
