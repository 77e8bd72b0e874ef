use anyhow::Result;
use std::path::Path;

use porter_core::Deletion;

pub async fn run(remote: &str, base_dir: &Path) -> Result<()> {
    let config = super::load_config(base_dir)?;
    let backend = super::backend_from_config(&config).await?;

    let mut deletion = Deletion::new(backend, remote)?;
    let Some(outcome) = deletion.start() else {
        anyhow::bail!("deletion already started");
    };
    outcome.await??;

    println!("Deleted {remote}");
    Ok(())
}
