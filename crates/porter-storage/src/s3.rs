#[cfg(feature = "s3")]
mod inner {
    use std::path::Path;
    use std::time::Duration;

    use async_trait::async_trait;
    use aws_sdk_s3::Client;
    use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
    use aws_sdk_s3::presigning::PresigningConfig;
    use aws_sdk_s3::primitives::ByteStream;
    use tokio::io::AsyncWriteExt;

    use crate::backend::{ObjectRef, StorageBackend, display_name};
    use crate::status::{BackendError, StatusCode};
    use crate::task::{TaskHandle, task_pair};

    const PRESIGN_EXPIRY: Duration = Duration::from_secs(3600);

    /// AWS S3 and S3-compatible storage backend.
    ///
    /// Works with AWS S3, MinIO, RustFS, Garage, Ceph RGW, SeaweedFS,
    /// and any other service implementing the S3 API.
    pub struct S3Backend {
        client: Client,
        bucket: String,
    }

    /// Options for creating an S3 backend.
    pub struct S3Options<'a> {
        pub bucket: &'a str,
        pub region: Option<&'a str>,
        /// Custom endpoint URL (e.g. `http://localhost:9000` for MinIO).
        pub endpoint_url: Option<&'a str>,
        /// Force path-style addressing (`http://host/bucket/key` instead of
        /// `http://bucket.host/key`). Most S3-compatible servers require this.
        pub path_style: bool,
        /// Explicit access key. If None, uses env/profile credentials.
        pub access_key: Option<&'a str>,
        /// Explicit secret key. If None, uses env/profile credentials.
        pub secret_key: Option<&'a str>,
    }

    #[derive(Debug, Clone)]
    pub struct S3Ref {
        name: String,
        path: String,
    }

    impl ObjectRef for S3Ref {
        fn name(&self) -> &str {
            &self.name
        }

        fn path(&self) -> &str {
            &self.path
        }
    }

    impl S3Backend {
        /// Create for standard AWS S3.
        pub async fn new(bucket: &str, region: Option<&str>) -> anyhow::Result<Self> {
            Self::with_options(S3Options {
                bucket,
                region,
                endpoint_url: None,
                path_style: false,
                access_key: None,
                secret_key: None,
            })
            .await
        }

        /// Create for an S3-compatible service (MinIO, RustFS, Garage, etc.)
        pub async fn s3_compatible(
            bucket: &str,
            endpoint_url: &str,
            region: Option<&str>,
            access_key: Option<&str>,
            secret_key: Option<&str>,
        ) -> anyhow::Result<Self> {
            Self::with_options(S3Options {
                bucket,
                region: Some(region.unwrap_or("us-east-1")),
                endpoint_url: Some(endpoint_url),
                path_style: true,
                access_key,
                secret_key,
            })
            .await
        }

        /// Create with full options.
        pub async fn with_options(opts: S3Options<'_>) -> anyhow::Result<Self> {
            let mut config_loader = aws_config::from_env();

            if let Some(r) = opts.region {
                config_loader = config_loader.region(aws_config::Region::new(r.to_string()));
            }

            // If explicit credentials are provided, inject them
            if let (Some(ak), Some(sk)) = (opts.access_key, opts.secret_key) {
                let creds =
                    aws_sdk_s3::config::Credentials::new(ak, sk, None, None, "porter-config");
                config_loader = config_loader.credentials_provider(creds);
            }

            let sdk_config = config_loader.load().await;

            let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

            if let Some(endpoint) = opts.endpoint_url {
                s3_config_builder = s3_config_builder.endpoint_url(endpoint);
            }

            if opts.path_style {
                s3_config_builder = s3_config_builder.force_path_style(true);
            }

            let client = Client::from_conf(s3_config_builder.build());

            Ok(Self {
                client,
                bucket: opts.bucket.to_string(),
            })
        }
    }

    /// S3 service error codes mapped into the backend vocabulary. Total:
    /// anything this build does not recognize becomes `Unknown`.
    fn service_status(code: &str) -> StatusCode {
        match code {
            "NoSuchKey" | "NotFound" => StatusCode::ObjectNotFound,
            "NoSuchBucket" => StatusCode::BucketNotConfigured,
            "AccessDenied" => StatusCode::Unauthorized,
            "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken"
            | "TokenRefreshRequired" => StatusCode::Unauthenticated,
            "InvalidArgument" | "InvalidBucketName" => StatusCode::InvalidArgument,
            "BadDigest" | "InvalidDigest" => StatusCode::ChecksumMismatch,
            "QuotaExceeded" | "SlowDown" | "ServiceUnavailable" => StatusCode::QuotaExceeded,
            "EntityTooLarge" => StatusCode::DownloadSizeExceeded,
            "RequestTimeout" => StatusCode::RetryLimitExceeded,
            _ => StatusCode::Unknown,
        }
    }

    /// Normalize an SDK error into a [`BackendError`] at the point it
    /// crosses out of the S3 layer.
    fn normalize<E>(err: SdkError<E>) -> BackendError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let message = ProvideErrorMetadata::message(&err)
            .map(str::to_owned)
            .unwrap_or_else(|| err.to_string());
        let status = if matches!(
            err,
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)
        ) {
            StatusCode::RetryLimitExceeded
        } else if let Some(code) = ProvideErrorMetadata::code(&err) {
            service_status(code)
        } else if let Some(response) = err.raw_response() {
            StatusCode::from_http(response.status().as_u16())
        } else {
            StatusCode::Unknown
        };
        BackendError::new(status, message)
    }

    #[async_trait]
    impl StorageBackend for S3Backend {
        type Ref = S3Ref;

        fn resolve(&self, path: &str) -> Result<Self::Ref, BackendError> {
            // Credentials are bound at client construction; an invalid or
            // expired session surfaces as a task failure, not here.
            Ok(S3Ref {
                name: display_name(path).to_string(),
                path: path.to_string(),
            })
        }

        fn put(&self, reference: &Self::Ref, bytes: Vec<u8>) -> TaskHandle {
            let (handle, ctx) = task_pair(reference.path());
            let client = self.client.clone();
            let bucket = self.bucket.clone();
            let key = reference.path().to_string();
            tokio::spawn(async move {
                let total = bytes.len() as u64;
                if !ctx.progress(0, Some(total)).await {
                    return;
                }
                // put_object is a single call: progress is coarse (start and
                // end), cancellation races the request future.
                let request = client
                    .put_object()
                    .bucket(&bucket)
                    .key(&key)
                    .body(ByteStream::from(bytes))
                    .send();
                tokio::select! {
                    _ = ctx.cancelled() => {
                        tracing::debug!("upload of {key} cancelled mid-flight");
                        ctx.failure(BackendError::cancelled()).await;
                    }
                    result = request => match result {
                        Ok(_) => ctx.success(total, Some(total)).await,
                        Err(e) => ctx.failure(normalize(e)).await,
                    },
                }
            });
            handle
        }

        fn write_to_file(&self, reference: &Self::Ref, dest: &Path) -> TaskHandle {
            let (handle, ctx) = task_pair(reference.path());
            let client = self.client.clone();
            let bucket = self.bucket.clone();
            let key = reference.path().to_string();
            let dest = dest.to_path_buf();
            tokio::spawn(async move {
                let response = tokio::select! {
                    _ = ctx.cancelled() => {
                        ctx.failure(BackendError::cancelled()).await;
                        return;
                    }
                    result = client.get_object().bucket(&bucket).key(&key).send() => {
                        match result {
                            Ok(r) => r,
                            Err(e) => {
                                ctx.failure(normalize(e)).await;
                                return;
                            }
                        }
                    }
                };
                let total = response
                    .content_length()
                    .and_then(|len| u64::try_from(len).ok());
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
                let mut body = response.body;
                let mut completed = 0u64;
                loop {
                    if ctx.is_cancelled() {
                        tracing::debug!("download of {key} cancelled mid-stream");
                        ctx.failure(BackendError::cancelled()).await;
                        return;
                    }
                    match body.try_next().await {
                        Ok(Some(chunk)) => {
                            if let Err(e) = file.write_all(&chunk).await {
                                ctx.failure(BackendError::new(
                                    StatusCode::Unknown,
                                    format!("write {}: {e}", dest.display()),
                                ))
                                .await;
                                return;
                            }
                            completed += chunk.len() as u64;
                            if !ctx.progress(completed, total).await {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            ctx.failure(BackendError::new(
                                StatusCode::RetryLimitExceeded,
                                format!("read object body: {e}"),
                            ))
                            .await;
                            return;
                        }
                    }
                }
                if let Err(e) = file.flush().await {
                    ctx.failure(BackendError::new(
                        StatusCode::Unknown,
                        format!("flush {}: {e}", dest.display()),
                    ))
                    .await;
                    return;
                }
                ctx.success(completed, total.or(Some(completed))).await;
            });
            handle
        }

        async fn delete(&self, reference: &Self::Ref) -> Result<(), BackendError> {
            // S3 deletes are idempotent, so probe first: deleting an object
            // that was never uploaded must surface ObjectNotFound.
            if let Err(err) = self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(reference.path())
                .send()
                .await
            {
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_not_found())
                {
                    return Err(BackendError::new(
                        StatusCode::ObjectNotFound,
                        format!("no object at {}", reference.path()),
                    ));
                }
                return Err(normalize(err));
            }
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(reference.path())
                .send()
                .await
                .map_err(normalize)?;
            Ok(())
        }

        async fn download_url(&self, reference: &Self::Ref) -> Result<String, BackendError> {
            let config = PresigningConfig::expires_in(PRESIGN_EXPIRY).map_err(|e| {
                BackendError::new(StatusCode::InvalidArgument, format!("presign config: {e}"))
            })?;
            let presigned = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(reference.path())
                .presigned(config)
                .await
                .map_err(normalize)?;
            Ok(presigned.uri().to_string())
        }
    }

}

#[cfg(feature = "s3")]
pub use inner::{S3Backend, S3Options, S3Ref};
