// Configuration file loading

use crate::agents::palette::default_colors;
use crate::conflicts::{ConflictPolicy, DEFAULT_HISTORY_LIMIT};
use crate::navigation::UriOrder;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_DIR_NAME: &str = "edit-coordinator";
const PROJECT_DIR_NAME: &str = ".edit-coordinator";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Coordinator configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoordinatorConfig {
    /// Conflict detection settings
    #[serde(default)]
    pub conflicts: ConflictsConfig,
    /// Agent registration settings
    #[serde(default)]
    pub agents: AgentsConfig,
    /// Navigation settings
    #[serde(default)]
    pub navigation: NavigationConfig,
}

/// Conflict detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictsConfig {
    /// Which overlaps count as a conflict
    #[serde(default)]
    pub policy: ConflictPolicy,
    /// Resolved conflicts kept for inspection
    #[serde(rename = "historyLimit", alias = "history_limit", default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_history_limit() -> usize { DEFAULT_HISTORY_LIMIT }

impl Default for ConflictsConfig {
    fn default() -> Self {
        Self {
            policy: ConflictPolicy::default(),
            history_limit: default_history_limit(),
        }
    }
}

/// Agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Colors assigned round-robin at registration
    #[serde(default = "default_colors")]
    pub palette: Vec<String>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            palette: default_colors(),
        }
    }
}

/// Navigation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NavigationConfig {
    /// Order of files with changes
    #[serde(rename = "uriOrder", alias = "uri_order", default)]
    pub uri_order: UriOrder,
}

/// Config loader
pub struct ConfigLoader {
    /// Global config path
    global_path: Option<PathBuf>,
    /// Project config path
    project_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            global_path: Self::get_global_config_path(),
            project_path: None,
        }
    }

    /// Set the project directory; its config lives under `.edit-coordinator/`
    pub fn with_project_path(mut self, path: &Path) -> Self {
        self.project_path = Some(path.join(PROJECT_DIR_NAME).join(CONFIG_FILE_NAME));
        self
    }

    fn get_global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn load_global(&self) -> Result<Option<CoordinatorConfig>> {
        match self.global_path {
            Some(ref path) => self.load_from_path(path),
            None => Ok(None),
        }
    }

    pub fn load_project(&self) -> Result<Option<CoordinatorConfig>> {
        match self.project_path {
            Some(ref path) => self.load_from_path(path),
            None => Ok(None),
        }
    }

    /// Effective config: project file, else global file, else defaults.
    /// A file that exists but fails to parse or validate is an error.
    pub fn load(&self) -> Result<CoordinatorConfig> {
        if let Some(config) = self.load_project()? {
            log::debug!("[Config] Using project config");
            return Ok(config);
        }
        if let Some(config) = self.load_global()? {
            log::debug!("[Config] Using global config");
            return Ok(config);
        }
        Ok(CoordinatorConfig::default())
    }

    /// Load config from a specific path
    pub fn load_from_path(&self, path: &Path) -> Result<Option<CoordinatorConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: CoordinatorConfig = toml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;

        validate_config(&config)?;

        Ok(Some(config))
    }

    pub fn global_config_path(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    pub fn project_config_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    pub fn save_project(&self, config: &CoordinatorConfig) -> Result<PathBuf> {
        match self.project_path {
            Some(ref path) => {
                self.save_to_path(path, config)?;
                Ok(path.clone())
            }
            None => Err(anyhow!("No project config path available")),
        }
    }

    /// Save config to a specific path
    pub fn save_to_path(&self, path: &Path, config: &CoordinatorConfig) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    anyhow!("Failed to create config directory '{}': {}", parent.display(), e)
                })?;
            }
        }

        validate_config(config)?;

        let contents = to_toml(config)?;
        fs::write(path, contents)
            .map_err(|e| anyhow!("Failed to write config file '{}': {}", path.display(), e))?;

        log::info!("Saved config to: {}", path.display());
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate config values
pub fn validate_config(config: &CoordinatorConfig) -> Result<()> {
    if config.conflicts.history_limit == 0 {
        return Err(anyhow!("conflicts.historyLimit must be greater than 0"));
    }

    if config.agents.palette.is_empty() {
        return Err(anyhow!("agents.palette must contain at least one color"));
    }

    if let Some(color) = config.agents.palette.iter().find(|c| c.trim().is_empty()) {
        return Err(anyhow!("agents.palette contains an empty color: {:?}", color));
    }

    Ok(())
}

pub fn to_toml(config: &CoordinatorConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| anyhow!("Failed to serialize config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn write_project_config(dir: &TempDir, contents: &str) {
        let config_dir = dir.path().join(PROJECT_DIR_NAME);
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join(CONFIG_FILE_NAME), contents).unwrap();
    }

    #[test]
    fn test_loads_project_config() {
        let temp_dir = create_test_dir();
        write_project_config(
            &temp_dir,
            r#"
[conflicts]
policy = "range_overlap"
historyLimit = 5

[navigation]
uri_order = "lexicographic"
"#,
        );

        let loader = ConfigLoader::new().with_project_path(temp_dir.path());
        let config = loader.load_project().unwrap().unwrap();

        assert_eq!(config.conflicts.policy, ConflictPolicy::RangeOverlap);
        assert_eq!(config.conflicts.history_limit, 5);
        assert_eq!(config.navigation.uri_order, UriOrder::Lexicographic);
        assert_eq!(config.agents.palette, default_colors());
    }

    #[test]
    fn test_loads_global_config() {
        let temp_dir = create_test_dir();
        let path = temp_dir.path().join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[agents]\npalette = [\"red\", \"blue\"]\n").unwrap();

        let loader = ConfigLoader {
            global_path: Some(path),
            project_path: None,
        };

        let config = loader.load().unwrap();
        assert_eq!(config.agents.palette, vec!["red", "blue"]);
    }

    #[test]
    fn test_project_config_wins_over_global() {
        let temp_dir = create_test_dir();
        let global = temp_dir.path().join("global.toml");
        fs::write(&global, "[navigation]\nuriOrder = \"lexicographic\"\n").unwrap();
        write_project_config(&temp_dir, "[conflicts]\npolicy = \"same_file\"\n");

        let loader = ConfigLoader {
            global_path: Some(global),
            project_path: Some(temp_dir.path().join(PROJECT_DIR_NAME).join(CONFIG_FILE_NAME)),
        };

        let config = loader.load().unwrap();
        assert_eq!(config.navigation.uri_order, UriOrder::FirstTouched);
    }

    #[test]
    fn test_handles_missing_config_files_gracefully() {
        let temp_dir = create_test_dir();
        let loader = ConfigLoader {
            global_path: Some(temp_dir.path().join("missing.toml")),
            project_path: None,
        }
        .with_project_path(temp_dir.path());

        assert!(loader.load_project().unwrap().is_none());
        assert_eq!(loader.load().unwrap(), CoordinatorConfig::default());
    }

    #[test]
    fn test_rejects_empty_palette() {
        let temp_dir = create_test_dir();
        write_project_config(&temp_dir, "[agents]\npalette = []\n");

        let loader = ConfigLoader::new().with_project_path(temp_dir.path());
        assert!(loader.load_project().is_err());
    }

    #[test]
    fn test_validates_history_limit_greater_than_zero() {
        let temp_dir = create_test_dir();
        write_project_config(&temp_dir, "[conflicts]\nhistoryLimit = 0\n");

        let loader = ConfigLoader::new().with_project_path(temp_dir.path());
        assert!(loader.load_project().is_err());
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let temp_dir = create_test_dir();
        write_project_config(&temp_dir, "[conflicts]\npolicy = \"sometimes\"\n");

        let loader = ConfigLoader::new().with_project_path(temp_dir.path());
        let err = loader.load_project().unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = create_test_dir();
        let loader = ConfigLoader::new().with_project_path(temp_dir.path());

        let mut config = CoordinatorConfig::default();
        config.conflicts.policy = ConflictPolicy::RangeOverlap;
        let path = loader.save_project(&config).unwrap();
        assert!(path.exists());

        let reloaded = loader.load_project().unwrap().unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_default_config_values() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.conflicts.policy, ConflictPolicy::SameFile);
        assert_eq!(config.conflicts.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(config.navigation.uri_order, UriOrder::FirstTouched);
        assert_eq!(config.agents.palette.len(), 8);
    }
}
