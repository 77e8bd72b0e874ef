use anyhow::Result;
use std::path::Path;

use porter_core::config::PorterConfig;
use porter_core::crypto::SealKey;

pub fn run(
    base_dir: &Path,
    bucket: &str,
    region: Option<&str>,
    endpoint_url: Option<&str>,
) -> Result<()> {
    let config_path = PorterConfig::default_path(base_dir);
    if config_path.exists() {
        anyhow::bail!("configuration already exists at {}", config_path.display());
    }

    let mut config = PorterConfig::default_config(base_dir, bucket);
    config.storage.region = region.map(str::to_owned);
    config.storage.endpoint_url = endpoint_url.map(str::to_owned);
    // S3-compatible endpoints almost always need path-style addressing.
    config.storage.path_style = endpoint_url.is_some();
    config.save(&config_path)?;
    println!("Wrote {}", config_path.display());

    if let Some(key_file) = &config.storage.key_file {
        let key_path = Path::new(key_file);
        if !key_path.exists() {
            std::fs::write(key_path, SealKey::generate().to_hex())?;
            println!("Generated sealing key at {key_file}");
            println!("Keep this file safe: objects sealed with it cannot be recovered without it.");
        }
    }

    Ok(())
}
