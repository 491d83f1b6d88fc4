//! Run configuration for recast
//!
//! Settings come from an explicit `--config` file or from the first of
//! `.recastrc.json`, `recast.yaml`, `recast.yml` or `recast.json` found while
//! walking up from the working directory. Command-line flags override them.
//!
//! ```yaml
//! outputDir: ./out
//! pretty: true
//! strictReferences: false
//! seed: 42
//! implementationGuide: ./ig
//! ```

mod loader;
mod recast_config;

pub use loader::{CONFIG_FILE_NAMES, ConfigLoader};
pub use recast_config::RecastConfig;
