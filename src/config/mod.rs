mod file_config;

pub use file_config::{FileConfig, ModerationConfig};

use anyhow::Result;
use std::path::PathBuf;

/// Resolved application configuration: CLI arguments merged with the
/// optional TOML file, file values winning where both are present.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub logging_level: String,
    pub keep_reservations: bool,
}

pub fn resolve_config(
    cli_db_path: PathBuf,
    cli_logging_level: Option<String>,
    file: Option<FileConfig>,
) -> Result<AppConfig> {
    let file = file.unwrap_or_default();
    let moderation = file.moderation.unwrap_or_default();
    Ok(AppConfig {
        db_path: file.db_path.map(PathBuf::from).unwrap_or(cli_db_path),
        logging_level: file
            .logging_level
            .or(cli_logging_level)
            .unwrap_or_else(|| "info".to_string()),
        keep_reservations: moderation.keep_reservations.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_cli() {
        let file = FileConfig {
            db_path: Some("/data/catalog.db".to_string()),
            logging_level: None,
            moderation: None,
        };
        let config = resolve_config(
            PathBuf::from("/cli/catalog.db"),
            Some("debug".to_string()),
            Some(file),
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/data/catalog.db"));
        assert_eq!(config.logging_level, "debug");
        assert!(!config.keep_reservations);
    }
}
