//! CLI command implementations

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use recast_core::{
    Bundle, CodeRegistry, ConfigLoader, FhirPathLite, GuideSummary, Mapping, SchemaTable,
    SubjectContext, SubjectRecord, Transformer, bundle_sources, load_bundle,
    load_implementation_guide, write_bundle,
};
use tracing::{debug, info};

const DEFAULT_OUTPUT_DIR: &str = "output";

/// Flags of `recast run`
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mapping: PathBuf,
    pub source: PathBuf,
    pub ig: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub subject: Option<PathBuf>,
    pub seed: Option<u64>,
    pub strict: bool,
    pub pretty: bool,
}

/// One transformed bundle
#[derive(Debug, Clone)]
pub struct BundleReport {
    pub source: PathBuf,
    pub written: PathBuf,
    pub entries_before: usize,
    pub entries_after: usize,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mapping: String,
    pub guide: Option<GuideSummary>,
    pub bundles: Vec<BundleReport>,
    pub elapsed: std::time::Duration,
}

/// Run command implementation
///
/// Every input is read before the first transformation and every bundle is
/// transformed before the first write, so a failure leaves no partial output.
pub fn run_command(options: RunOptions, config_path: Option<&Path>) -> anyhow::Result<RunSummary> {
    let start = Instant::now();
    let config = ConfigLoader::load(config_path, None)?;
    debug!("Effective config: {:?}", config);

    let output_dir = options
        .output
        .or_else(|| config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let ig = options.ig.or_else(|| config.implementation_guide.clone());
    let strict = options.strict || config.strict_references();
    let pretty = options.pretty || config.pretty();
    let seed = options.seed.or(config.seed);

    let mapping = Mapping::load(&options.mapping)
        .with_context(|| format!("Failed to load mapping {}", options.mapping.display()))?;

    let mut schema = SchemaTable::r4_core();
    let mut codes = CodeRegistry::new(seed);
    let guide = match &ig {
        Some(dir) => Some(load_implementation_guide(dir, &mut schema, &mut codes)?),
        None => None,
    };

    let subject = options
        .subject
        .as_deref()
        .map(SubjectRecord::load)
        .transpose()
        .context("Failed to load subject record")?;

    let sources = bundle_sources(&options.source)?;
    if sources.is_empty() {
        anyhow::bail!("No .json bundles found in {}", options.source.display());
    }
    let bundles = sources
        .iter()
        .map(|path| load_bundle(path, &schema))
        .collect::<recast_core::Result<Vec<Bundle>>>()?;

    let mut transformer = Transformer::new(&schema, &FhirPathLite)
        .with_codes(codes)
        .with_subject(subject.as_ref().map(|s| s as &dyn SubjectContext))
        .strict(strict);

    let mut transformed = Vec::with_capacity(bundles.len());
    for (path, bundle) in sources.iter().zip(bundles) {
        info!("Transforming {}", path.display());
        let before = bundle.len();
        let out = transformer
            .apply_mapping(bundle, &mapping)
            .with_context(|| format!("Failed to transform {}", path.display()))?;
        transformed.push((path, before, out));
    }

    let mut reports = Vec::with_capacity(transformed.len());
    for (path, before, bundle) in transformed {
        let written = write_bundle(&output_dir, path, &bundle, pretty)?;
        reports.push(BundleReport {
            source: path.clone(),
            written,
            entries_before: before,
            entries_after: bundle.len(),
        });
    }

    Ok(RunSummary {
        mapping: mapping.name,
        guide,
        bundles: reports,
        elapsed: start.elapsed(),
    })
}

/// Check command implementation
pub fn check_command(path: &Path) -> anyhow::Result<Mapping> {
    Mapping::load(path).with_context(|| format!("Invalid mapping {}", path.display()))
}
