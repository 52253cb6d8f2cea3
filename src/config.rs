use crate::db::FilterMode;
use anyhow::{Context, Result, anyhow, bail};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".tasker";
const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_DB_FILE: &str = "tasks.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub export_dir: PathBuf,
    pub default_filter_mode: FilterMode,
    pub confirm_delete: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            export_dir: PathBuf::from("."),
            default_filter_mode: FilterMode::And,
            confirm_delete: true,
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    /// Falls back to defaults when no config file has been written yet.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(config_path)?;

        Ok(())
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match normalize_config_key(key) {
            "db_path" => {
                if value.trim().is_empty() {
                    bail!("db_path must not be empty");
                }
                self.db_path = expand_home(value.trim());
            }
            "export_dir" => {
                self.export_dir = expand_home(value.trim());
            }
            "default_filter_mode" => {
                self.default_filter_mode = value
                    .parse()
                    .map_err(|_| anyhow!("default_filter_mode must be AND/OR"))?;
            }
            "confirm_delete" => {
                self.confirm_delete = value
                    .trim()
                    .parse::<bool>()
                    .map_err(|_| anyhow!("confirm_delete must be true/false"))?;
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: db_path|db.path, export_dir|export.dir, default_filter_mode|filter.mode, confirm_delete|delete.confirm"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "db_path" => Some(self.db_path.display().to_string()),
            "export_dir" => Some(self.export_dir.display().to_string()),
            "default_filter_mode" => Some(self.default_filter_mode.to_string()),
            "confirm_delete" => Some(self.confirm_delete.to_string()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "db_path" | "db.path" => "db_path",
        "export_dir" | "export.dir" => "export_dir",
        "default_filter_mode" | "filter.mode" => "default_filter_mode",
        "confirm_delete" | "delete.confirm" => "confirm_delete",
        _ => key,
    }
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::db::FilterMode;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn defaults_point_at_working_directory_db() {
        let config = Config::default();

        assert_eq!(config.db_path, PathBuf::from("tasks.db"));
        assert_eq!(config.get_value("filter.mode").as_deref(), Some("AND"));
    }

    #[test]
    fn set_value_accepts_aliases_and_validates() {
        let mut config = Config::default();

        config.set_value("db.path", "/tmp/work.db").expect("db path");
        config.set_value("filter.mode", "or").expect("mode");
        config.set_value("confirm_delete", "false").expect("confirm");

        assert_eq!(config.db_path, PathBuf::from("/tmp/work.db"));
        assert_eq!(config.default_filter_mode, FilterMode::Or);
        assert!(!config.confirm_delete);
        assert!(config.set_value("confirm_delete", "maybe").is_err());
        assert!(config.set_value("window.size", "10").is_err());
        assert_eq!(config.get_value("window.size"), None);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config").join("config.json");
        let config = Config {
            default_filter_mode: FilterMode::Or,
            ..Config::default()
        };

        config.save_to(&path).expect("save");
        assert_eq!(Config::load_from(&path).expect("load"), config);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "confirm_delete": false }"#).expect("write");

        let config = Config::load_from(&path).expect("load");
        assert!(!config.confirm_delete);
        assert_eq!(config.db_path, PathBuf::from("tasks.db"));
    }
}
