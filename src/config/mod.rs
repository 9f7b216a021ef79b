// Configuration system

pub mod loader;

pub use loader::{
    to_toml, validate_config, AgentsConfig, ConfigLoader, ConflictsConfig, CoordinatorConfig,
    NavigationConfig,
};

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Load the effective configuration
/// Priority: Project -> Global -> Defaults
pub fn load_config(project_path: Option<&Path>) -> Result<CoordinatorConfig> {
    loader_for(project_path).load()
}

/// Get config file paths for debugging
pub fn get_config_paths(project_path: Option<&Path>) -> (Option<PathBuf>, Option<PathBuf>) {
    let loader = loader_for(project_path);
    (
        loader.global_config_path().map(|p| p.to_path_buf()),
        loader.project_config_path().map(|p| p.to_path_buf()),
    )
}

fn loader_for(project_path: Option<&Path>) -> ConfigLoader {
    match project_path {
        Some(path) => ConfigLoader::new().with_project_path(path),
        None => ConfigLoader::new(),
    }
}
