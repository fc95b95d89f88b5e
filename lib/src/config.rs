// lib/src/config.rs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use models::errors::{WardError, WardResult};

fn default_data_directory() -> Option<PathBuf> {
    Some(PathBuf::from("/var/lib/ward/data"))
}

fn default_cache_capacity() -> u64 {
    64 * 1024 * 1024
}

fn default_max_txn_retries() -> u32 {
    3
}

fn default_codec_key_id() -> String {
    "ward-default".to_string()
}

/// Engine configuration, loaded from a TOML file or built in code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WardConfig {
    /// Where the database lives. `None` opens a temporary database that is
    /// discarded on drop.
    #[serde(default = "default_data_directory")]
    pub data_directory: Option<PathBuf>,
    /// Page-cache budget handed to the storage engine, in bytes.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
    /// Total attempts per operation when the store reports a conflict.
    #[serde(default = "default_max_txn_retries")]
    pub max_txn_retries: u32,
    /// Key id the document codec binds sealed blobs to.
    #[serde(default = "default_codec_key_id")]
    pub codec_key_id: String,
}

impl Default for WardConfig {
    fn default() -> Self {
        WardConfig {
            data_directory: default_data_directory(),
            cache_capacity: default_cache_capacity(),
            max_txn_retries: default_max_txn_retries(),
            codec_key_id: default_codec_key_id(),
        }
    }
}

impl WardConfig {
    /// Loads configuration from a TOML file. Missing fields fall back to
    /// their defaults.
    pub fn load(path: &Path) -> WardResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WardError::Config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| WardError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// A configuration backed by a temporary database, for tests and local
    /// experiments.
    pub fn temporary() -> Self {
        WardConfig {
            data_directory: None,
            ..WardConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WardConfig;
    use models::errors::WardError;
    use std::io::Write;

    #[test]
    fn should_fill_missing_fields_with_defaults() {
        let config: WardConfig = toml::from_str("max_txn_retries = 7").unwrap();
        assert_eq!(config.max_txn_retries, 7);
        assert_eq!(config, WardConfig {
            max_txn_retries: 7,
            ..WardConfig::default()
        });
    }

    #[test]
    fn should_load_a_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "codec_key_id = \"ward-2024\"").unwrap();
        writeln!(file, "data_directory = \"/srv/ward\"").unwrap();
        let config = WardConfig::load(file.path()).unwrap();
        assert_eq!(config.codec_key_id, "ward-2024");
        assert_eq!(
            config.data_directory.as_deref(),
            Some(std::path::Path::new("/srv/ward"))
        );
    }

    #[test]
    fn should_report_unreadable_files() {
        let result = WardConfig::load(std::path::Path::new("/nonexistent/ward.toml"));
        assert!(matches!(result, Err(WardError::Config(_))));
    }

    #[test]
    fn should_use_no_data_directory_when_temporary() {
        assert_eq!(WardConfig::temporary().data_directory, None);
    }
}
