use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TransferError};

/// Top-level Porter configuration stored as TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PorterConfig {
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub bucket: String,
    pub region: Option<String>,
    /// Custom endpoint URL for S3-compatible services (MinIO, RustFS, Garage, etc.)
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Use path-style addressing (required by most S3-compatible servers).
    #[serde(default)]
    pub path_style: bool,
    /// S3 access key. If absent, env/profile credentials are used.
    #[serde(default)]
    pub access_key: Option<String>,
    /// S3 secret key. If absent, env/profile credentials are used.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Path to a file holding the hex-encoded sealing key. Absent means
    /// payloads are transferred as-is.
    #[serde(default)]
    pub key_file: Option<String>,
}

impl PorterConfig {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TransferError::Misconfiguration(format!(
                "configuration not found at {} — run `porter init` first",
                path.display()
            )));
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| TransferError::disk(path, e))?;
        toml::from_str(&content).map_err(|e| TransferError::Misconfiguration(e.to_string()))
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TransferError::Misconfiguration(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TransferError::disk(parent, e))?;
        }
        std::fs::write(path, content).map_err(|e| TransferError::disk(path, e))?;
        Ok(())
    }

    /// Default config for `porter init`.
    pub fn default_config(base_dir: &Path, bucket: &str) -> Self {
        Self {
            storage: StorageSettings {
                bucket: bucket.to_string(),
                region: None,
                endpoint_url: None,
                path_style: false,
                access_key: None,
                secret_key: None,
                key_file: Some(base_dir.join("key.hex").display().to_string()),
            },
        }
    }

    /// Resolve the config file path: `<base_dir>/porter.toml`
    pub fn default_path(base_dir: &Path) -> PathBuf {
        base_dir.join("porter.toml")
    }

    /// Resolve the default porter home directory: `~/.porter`
    pub fn default_base_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".porter"))
            .ok_or_else(|| {
                TransferError::Misconfiguration("cannot determine home directory".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn roundtrip_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("porter.toml");
        let config = PorterConfig::default_config(tmp.path(), "my-bucket");
        config.save(&path).unwrap();
        let loaded = PorterConfig::load(&path).unwrap();
        assert_eq!(loaded.storage.bucket, "my-bucket");
        assert!(!loaded.storage.path_style);
        assert!(loaded.storage.key_file.is_some());
    }

    #[test]
    fn load_nonexistent_returns_error() {
        let result = PorterConfig::load(Path::new("/nonexistent/porter.toml"));
        assert!(matches!(result, Err(TransferError::Misconfiguration(_))));
    }

    #[test]
    fn optional_fields_default() {
        let toml = "[storage]\nbucket = \"b\"\n";
        let config: PorterConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.bucket, "b");
        assert!(config.storage.endpoint_url.is_none());
        assert!(config.storage.key_file.is_none());
    }
}
