use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_batch_budget_ms")]
    pub batch_budget_ms: u64,
    /// Rows shown on each side of the cursor in interactive mode
    #[serde(default = "default_context_rows")]
    pub context_rows: usize,
}

fn default_batch_budget_ms() -> u64 {
    12
}
fn default_context_rows() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            batch_budget_ms: default_batch_budget_ms(),
            context_rows: default_context_rows(),
        }
    }
}

impl SearchConfig {
    pub fn batch_budget(&self) -> Duration {
        Duration::from_millis(self.batch_budget_ms)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub show_timing: bool,
    pub show_summary: bool,
    pub color: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_timing: true,
            show_summary: true,
            color: true,
        }
    }
}

impl Config {
    /// Load from an explicit path, or from the first config file found in the usual places
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_path(),
        };

        let config = if let Some(path) = config_path {
            log::debug!("Reading config from {}", path.display());
            Self::from_path(&path)?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.search.batch_budget_ms == 0 {
            bail!("search.batch_budget_ms must be greater than zero");
        }
        Ok(())
    }

    fn find_config_path() -> Option<PathBuf> {
        if let Some(xdg_config) = dirs::config_dir() {
            let xdg_path = xdg_config.join("tracegrep/config.toml");
            if xdg_path.exists() {
                return Some(xdg_path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let home_path = home.join(".tracegrep.toml");
            if home_path.exists() {
                return Some(home_path);
            }
        }

        let current_path = Path::new(".tracegrep.toml");
        if current_path.exists() {
            return Some(current_path.to_path_buf());
        }

        None
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.search.batch_budget(), Duration::from_millis(12));
        assert_eq!(config.search.context_rows, 5);
        assert!(config.display.show_summary);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[search]\nbatch_budget_ms = 4\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.search.batch_budget_ms, 4);
        assert_eq!(config.search.context_rows, 5);
        assert!(config.display.color);
    }

    #[test]
    fn test_zero_budget_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[search]\nbatch_budget_ms = 0\n").unwrap();

        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = Config::default();
        config.display.show_timing = false;

        config.save(&path).unwrap();
        let loaded = Config::from_path(&path).unwrap();
        assert!(!loaded.display.show_timing);
    }
}
