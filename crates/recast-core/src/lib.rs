//! Recast Core
//!
//! Declarative transformation of FHIR R4 bundles. A [`Mapping`] lists actions
//! (profiles, set_values, create_resource, shift_dates, ...) that a
//! [`Transformer`] applies to a [`Bundle`] in order. Field writes go through the
//! path mutation engine in [`engine`], which creates missing structure as needed.

pub mod actions;
pub mod config;
pub mod directive;
pub mod engine;
pub mod error;
pub mod io;
pub mod mapping;
pub mod model;
pub mod path;
pub mod result;
pub mod schema;
pub mod script;
pub mod subject;
pub mod temporal;
pub mod transforms;
pub mod valueset;

pub use actions::Transformer;
pub use config::{ConfigLoader, RecastConfig};
pub use directive::{Directive, DirectiveResolver};
pub use engine::{Assignment, MappingEntry, PathGenerator, ValueSpec};
pub use error::{ErrorKind, RecastError};
pub use io::{GuideSummary, bundle_sources, load_bundle, load_implementation_guide, write_bundle};
pub use mapping::{Action, ActionKind, Mapping};
pub use model::{Bundle, Document, Element};
pub use path::{FhirPathLite, PathEngine, PathError, PathEvaluator, PathValue};
pub use result::{Result, ResultExt};
pub use schema::{FieldCatalog, SchemaTable};
pub use script::{NativeScriptHost, ScriptHost};
pub use subject::{StateVisit, SubjectContext, SubjectRecord};
pub use temporal::{DateRange, ShiftAmount};
pub use transforms::ValueTransform;
pub use valueset::{Code, CodeRegistry};

/// Initialize the tracing subscriber; `RUST_LOG` takes precedence over `default_filter`
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
