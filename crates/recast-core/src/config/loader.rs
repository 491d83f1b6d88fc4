//! Configuration file discovery and loading

use std::path::{Path, PathBuf};

use super::recast_config::RecastConfig;
use crate::error::RecastError;
use crate::result::Result;

/// Names searched in each directory, in priority order
pub const CONFIG_FILE_NAMES: &[&str] = &[".recastrc.json", "recast.yaml", "recast.yml", "recast.json"];

/// Finds and loads [`RecastConfig`] files
pub struct ConfigLoader;

impl ConfigLoader {
    /// Walk upward from `start_path` until a config file is found or the root is reached
    pub fn auto_discover(start_path: &Path) -> Result<Option<PathBuf>> {
        let mut current = start_path
            .canonicalize()
            .map_err(|e| RecastError::config_error(format!("Invalid path: {e}")))?;

        loop {
            for filename in CONFIG_FILE_NAMES {
                let config_path = current.join(filename);
                if config_path.is_file() {
                    tracing::debug!("Found config: {}", config_path.display());
                    return Ok(Some(config_path));
                }
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    /// Load one file, resolving its relative paths against its directory
    pub fn load_from_file(path: &Path) -> Result<RecastConfig> {
        let config = RecastConfig::load(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.resolve_paths(base))
    }

    /// Load `custom_path` if given, else auto-discover from `start_dir` (or `.`).
    ///
    /// An explicit path must exist; finding nothing by discovery yields defaults.
    pub fn load(custom_path: Option<&Path>, start_dir: Option<&Path>) -> Result<RecastConfig> {
        if let Some(path) = custom_path {
            if !path.is_file() {
                return Err(RecastError::config_error(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::load_from_file(path);
        }

        let search_dir = start_dir.unwrap_or_else(|| Path::new("."));
        match Self::auto_discover(search_dir)? {
            Some(path) => Self::load_from_file(&path),
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(RecastConfig::default())
            }
        }
    }
}
