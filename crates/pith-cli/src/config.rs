use std::path::Path;

use anyhow::Context;
use pith_backend::BackendConfig;
use pith_identity::IdentityConfig;
use serde::{Deserialize, Serialize};

/// Directory used when no configuration file is given.
pub const DEFAULT_DATA_DIR: &str = ".pith";

/// Contents of the CLI configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendConfig,
    #[serde(default)]
    pub identity: Option<IdentityConfig>,
}

fn default_backend() -> BackendConfig {
    BackendConfig::persistent(DEFAULT_DATA_DIR)
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            identity: None,
        }
    }
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.backend.validate()?;
        Ok(config)
    }

    pub fn identity(&self) -> anyhow::Result<&IdentityConfig> {
        self.identity
            .as_ref()
            .context("no [identity] section in the configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pith_types::VersioningPolicy;

    #[test]
    fn both_sections() {
        let config = CliConfig::parse(
            r#"
            [backend]
            block_size = 65536
            versioning = "manual"
            block_path = "/srv/pith/blocks"
            journal_path = "/srv/pith/journal.log"

            [identity]
            url = "https://accounts.example.com"
            retries = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.block_size, 65536);
        assert_eq!(config.backend.versioning, VersioningPolicy::Manual);
        assert_eq!(config.identity().unwrap().retries, 3);
    }

    #[test]
    fn empty_file_uses_local_data_dir() {
        let config = CliConfig::parse("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert!(config.backend.block_path.unwrap().starts_with(DEFAULT_DATA_DIR));
        assert!(CliConfig::default().identity().is_err());
    }

    #[test]
    fn invalid_backend_rejected() {
        assert!(CliConfig::parse("[backend]\nblock_size = 0").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pith.toml");
        std::fs::write(&path, "[identity]\nurl = \"http://localhost:8000\"\n").unwrap();
        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.identity().unwrap().url, "http://localhost:8000");
        assert!(CliConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
