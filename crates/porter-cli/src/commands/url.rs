use anyhow::Result;
use std::path::Path;

use porter_storage::backend::StorageBackend;

pub async fn run(remote: &str, base_dir: &Path) -> Result<()> {
    let config = super::load_config(base_dir)?;
    let backend = super::backend_from_config(&config).await?;

    let reference = backend.resolve(remote)?;
    let url = backend.download_url(&reference).await?;
    println!("{url}");
    Ok(())
}
