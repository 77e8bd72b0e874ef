pub mod delete;
pub mod download;
pub mod init;
pub mod upload;
pub mod url;

use std::path::Path;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use porter_core::config::PorterConfig;
use porter_core::crypto::SealKey;
use porter_storage::s3::{S3Backend, S3Options};

pub(crate) fn load_config(base_dir: &Path) -> anyhow::Result<PorterConfig> {
    Ok(PorterConfig::load(&PorterConfig::default_path(base_dir))?)
}

/// Build the S3 backend from the loaded configuration.
pub(crate) async fn backend_from_config(config: &PorterConfig) -> anyhow::Result<Arc<S3Backend>> {
    let storage = &config.storage;
    let backend = S3Backend::with_options(S3Options {
        bucket: &storage.bucket,
        region: storage.region.as_deref(),
        endpoint_url: storage.endpoint_url.as_deref(),
        path_style: storage.path_style,
        access_key: storage.access_key.as_deref(),
        secret_key: storage.secret_key.as_deref(),
    })
    .await?;
    Ok(Arc::new(backend))
}

/// Resolve the sealing key: `--key-hex`/`PORTER_KEY` wins, then the
/// configured key file. No key means plaintext transfers.
pub(crate) fn load_key(
    config: &PorterConfig,
    key_hex: &Option<String>,
) -> anyhow::Result<Option<SealKey>> {
    if let Some(hex) = key_hex {
        return Ok(Some(SealKey::from_hex(hex)?));
    }
    match &config.storage.key_file {
        Some(path) if Path::new(path).exists() => {
            let content = std::fs::read_to_string(path)?;
            Ok(Some(SealKey::from_hex(&content)?))
        }
        _ => Ok(None),
    }
}

/// Byte progress bar in the house style.
pub(crate) fn transfer_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );
    pb
}
