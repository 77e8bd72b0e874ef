use thiserror::Error;

/// Backend status-code vocabulary.
///
/// This is the raw signal set a storage service can report. It is normalized
/// into the caller-facing error taxonomy by `porter-core`; nothing outside
/// the backend layer should match on these directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StatusCode {
    /// The configured bucket does not exist or is not reachable.
    BucketNotConfigured,
    /// The project/account the bucket belongs to is misconfigured.
    ProjectNotConfigured,
    Cancelled,
    InvalidArgument,
    ChecksumMismatch,
    ObjectNotFound,
    QuotaExceeded,
    RetryLimitExceeded,
    Unauthenticated,
    Unauthorized,
    DownloadSizeExceeded,
    Unknown,
}

impl StatusCode {
    /// Classify an HTTP status. Total over the whole status space: services
    /// add codes over time, so anything unrecognized lands in `Unknown`
    /// instead of being rejected.
    pub fn from_http(status: u16) -> Self {
        match status {
            400 => StatusCode::InvalidArgument,
            401 => StatusCode::Unauthenticated,
            403 => StatusCode::Unauthorized,
            404 => StatusCode::ObjectNotFound,
            408 => StatusCode::RetryLimitExceeded,
            429 => StatusCode::QuotaExceeded,
            503 => StatusCode::QuotaExceeded,
            _ => StatusCode::Unknown,
        }
    }
}

/// A failure reported by a storage backend, carrying the normalized status
/// code plus whatever detail the service gave us.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} ({code:?})")]
pub struct BackendError {
    pub code: StatusCode,
    pub message: String,
}

impl BackendError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(StatusCode::Cancelled, "task cancelled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_classification() {
        assert_eq!(StatusCode::from_http(404), StatusCode::ObjectNotFound);
        assert_eq!(StatusCode::from_http(401), StatusCode::Unauthenticated);
        assert_eq!(StatusCode::from_http(403), StatusCode::Unauthorized);
        assert_eq!(StatusCode::from_http(429), StatusCode::QuotaExceeded);
    }

    #[test]
    fn http_classification_is_total() {
        // No status value may panic or be rejected.
        for status in 0..=u16::MAX {
            let _ = StatusCode::from_http(status);
        }
        assert_eq!(StatusCode::from_http(599), StatusCode::Unknown);
        assert_eq!(StatusCode::from_http(0), StatusCode::Unknown);
    }

    #[test]
    fn backend_error_display() {
        let err = BackendError::new(StatusCode::ObjectNotFound, "no object at x/y");
        assert_eq!(err.to_string(), "no object at x/y (ObjectNotFound)");
    }
}
