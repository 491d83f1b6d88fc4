//! Filesystem side of a run: bundles in, implementation guides, bundles out

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::RecastError;
use crate::model::Bundle;
use crate::result::{Result, ResultExt};
use crate::schema::{FieldCatalog, SchemaTable, StructureDefinition};
use crate::valueset::CodeRegistry;

pub fn read_json(path: &Path) -> Result<JsonValue> {
    let text = fs::read_to_string(path).map_err(|e| RecastError::io_error(path, e))?;
    serde_json::from_str(&text).map_err(|e| RecastError::parse_error(path, e))
}

pub fn load_bundle(path: &Path, catalog: &dyn FieldCatalog) -> Result<Bundle> {
    let value = read_json(path)?;
    if value.get("resourceType").and_then(JsonValue::as_str) != Some("Bundle") {
        return Err(RecastError::parse_error(path, "not a Bundle resource"));
    }
    let bundle = Bundle::from_json(&value, catalog)?;
    debug!("Loaded {} with {} entries", path.display(), bundle.len());
    Ok(bundle)
}

/// A single bundle file, or every `.json` file directly inside a directory (sorted)
pub fn bundle_sources(path: &Path) -> Result<Vec<PathBuf>> {
    let metadata = fs::metadata(path).map_err(|e| RecastError::io_error(path, e))?;
    if metadata.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut sources: Vec<PathBuf> = WalkDir::new(path)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
        .map(|e| e.into_path())
        .collect();
    sources.sort();
    Ok(sources)
}

/// What an implementation guide directory contributed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuideSummary {
    pub files: usize,
    pub structure_definitions: usize,
    pub value_sets: usize,
}

/// Load StructureDefinitions into `schema` and ValueSets into `codes`.
///
/// The directory must exist and hold at least one file.
pub fn load_implementation_guide(
    dir: &Path,
    schema: &mut SchemaTable,
    codes: &mut CodeRegistry,
) -> Result<GuideSummary> {
    if !dir.is_dir() {
        return Err(RecastError::io_error(
            dir,
            std::io::Error::new(IoErrorKind::NotFound, "implementation guide directory not found"),
        ));
    }

    let files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    if files.is_empty() {
        return Err(RecastError::config_error(format!(
            "implementation guide directory '{}' is empty",
            dir.display()
        )));
    }

    let mut summary = GuideSummary {
        files: files.len(),
        ..GuideSummary::default()
    };
    for path in files
        .iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
    {
        let Some(value) = read_json(path).skip_with_warning("Skipping implementation guide file")
        else {
            continue;
        };
        match value.get("resourceType").and_then(JsonValue::as_str) {
            Some("StructureDefinition") => {
                match serde_json::from_value::<StructureDefinition>(value) {
                    Ok(definition) => {
                        schema.add_structure_definition(&definition);
                        summary.structure_definitions += 1;
                    }
                    Err(err) => warn!("Skipping {}: {}", path.display(), err),
                }
            }
            Some("ValueSet") => {
                if codes
                    .load_value_set(&value)
                    .skip_with_warning(format_args!("Skipping {}", path.display()))
                    .is_some()
                {
                    summary.value_sets += 1;
                }
            }
            _ => {}
        }
    }

    info!(
        "Implementation guide {}: {} StructureDefinitions, {} ValueSets",
        dir.display(),
        summary.structure_definitions,
        summary.value_sets
    );
    Ok(summary)
}

/// Write `bundle` to `<out_dir>/<epoch-ms>_<file name of source>`.
///
/// Existing files are never replaced; a name collision moves to the next millisecond.
pub fn write_bundle(out_dir: &Path, source: &Path, bundle: &Bundle, pretty: bool) -> Result<PathBuf> {
    fs::create_dir_all(out_dir).map_err(|e| RecastError::io_error(out_dir, e))?;
    let file_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bundle.json".to_string());

    let json = bundle.to_json();
    let text = if pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    }
    .map_err(|e| RecastError::internal_error(e.to_string()))?;

    let mut stamp = Utc::now().timestamp_millis();
    loop {
        let path = out_dir.join(format!("{stamp}_{file_name}"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(text.as_bytes())
                    .map_err(|e| RecastError::io_error(&path, e))?;
                debug!("Wrote {}", path.display());
                return Ok(path);
            }
            Err(err) if err.kind() == IoErrorKind::AlreadyExists => stamp += 1,
            Err(err) => return Err(RecastError::io_error(&path, err)),
        }
    }
}
