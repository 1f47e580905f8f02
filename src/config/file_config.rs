use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub logging_level: Option<String>,

    // Feature configs
    pub moderation: Option<ModerationConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ModerationConfig {
    /// Whether approvals leave the display rows reserved for follow-up
    /// edits instead of releasing them.
    pub keep_reservations: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "db_path = \"/tmp/catalog.db\"\n\n[moderation]\nkeep_reservations = true"
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.db_path.as_deref(), Some("/tmp/catalog.db"));
        assert_eq!(
            config.moderation.unwrap().keep_reservations,
            Some(true)
        );
        assert!(config.logging_level.is_none());
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert!(config.db_path.is_none());
        assert!(config.moderation.is_none());
    }
}
