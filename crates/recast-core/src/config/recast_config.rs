use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RecastError;
use crate::result::Result;

/// Defaults for `recast run`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecastConfig {
    /// Directory transformed bundles are written to
    pub output_dir: Option<PathBuf>,

    /// Pretty-print output JSON
    pub pretty: Option<bool>,

    /// Fail on `$findRef` targets that match nothing
    pub strict_references: Option<bool>,

    /// Seed for `$randomCode`
    pub seed: Option<u64>,

    /// Folder of StructureDefinitions and ValueSets
    pub implementation_guide: Option<PathBuf>,
}

impl RecastConfig {
    /// Load from YAML (`.yaml`, `.yml`) or JSON (`.json`)
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| RecastError::io_error(path, e))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| RecastError::parse_error(path, e))
            }
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| RecastError::parse_error(path, e))
            }
            _ => Err(RecastError::config_error(format!(
                "Unsupported config extension for '{}' (expected .yaml, .yml, or .json)",
                path.display()
            ))),
        }
    }

    /// Relative paths in the file are taken from the file's own directory
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |path: PathBuf| {
            if path.is_relative() {
                base.join(path)
            } else {
                path
            }
        };
        self.output_dir = self.output_dir.map(resolve);
        self.implementation_guide = self.implementation_guide.map(resolve);
        self
    }

    pub fn pretty(&self) -> bool {
        self.pretty.unwrap_or(false)
    }

    pub fn strict_references(&self) -> bool {
        self.strict_references.unwrap_or(false)
    }
}
