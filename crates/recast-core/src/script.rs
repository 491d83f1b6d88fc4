//! Script host seam for `execute_script` actions
//!
//! Scripts see the bundle as plain JSON and mutate it in place. The host
//! shipped here runs functions registered from Rust; `load_script` only
//! checks that a function of that name exists.

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::RecastError;
use crate::result::Result;

/// Runs named functions over a bundle or its resources
pub trait ScriptHost {
    /// Make `function_name` (defined by `source`) callable
    fn load_script(&mut self, function_name: &str, source: &str) -> Result<()>;

    /// Invoke `function_name(bundle)`
    fn apply_to_bundle(&mut self, function_name: &str, bundle: &mut JsonValue) -> Result<()>;

    /// Invoke `function_name(resource, bundle)`; `bundle` is read-only context
    fn apply_to_document(
        &mut self,
        function_name: &str,
        resource: &mut JsonValue,
        bundle: &JsonValue,
    ) -> Result<()>;
}

pub type BundleFn = Box<dyn Fn(&mut JsonValue) -> anyhow::Result<()>>;
pub type ResourceFn = Box<dyn Fn(&mut JsonValue, &JsonValue) -> anyhow::Result<()>>;

enum NativeFn {
    Bundle(BundleFn),
    Resource(ResourceFn),
}

/// Script host backed by Rust closures
#[derive(Default)]
pub struct NativeScriptHost {
    functions: IndexMap<String, NativeFn>,
}

impl std::fmt::Debug for NativeScriptHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeScriptHost")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl NativeScriptHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host preloaded with the stock functions
    pub fn with_builtins() -> Self {
        let mut host = Self::new();
        host.register_resource_fn("stripNarrative", |resource, _| {
            if let Some(object) = resource.as_object_mut() {
                object.shift_remove("text");
            }
            Ok(())
        });
        host.register_bundle_fn("dropEmptyEntries", |bundle| {
            if let Some(entries) = bundle.get_mut("entry").and_then(JsonValue::as_array_mut) {
                entries.retain(|entry| entry.get("resource").is_some_and(|r| !r.is_null()));
            }
            Ok(())
        });
        host
    }

    pub fn register_bundle_fn(
        &mut self,
        name: &str,
        function: impl Fn(&mut JsonValue) -> anyhow::Result<()> + 'static,
    ) {
        self.functions
            .insert(name.to_string(), NativeFn::Bundle(Box::new(function)));
    }

    pub fn register_resource_fn(
        &mut self,
        name: &str,
        function: impl Fn(&mut JsonValue, &JsonValue) -> anyhow::Result<()> + 'static,
    ) {
        self.functions
            .insert(name.to_string(), NativeFn::Resource(Box::new(function)));
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    fn function(&self, name: &str) -> Result<&NativeFn> {
        self.functions.get(name).ok_or_else(|| {
            RecastError::script_error(name, "no native function registered under this name")
        })
    }
}

impl ScriptHost for NativeScriptHost {
    fn load_script(&mut self, function_name: &str, source: &str) -> Result<()> {
        self.function(function_name)?;
        debug!(
            "Using native '{}' in place of {} bytes of script source",
            function_name,
            source.len()
        );
        Ok(())
    }

    fn apply_to_bundle(&mut self, function_name: &str, bundle: &mut JsonValue) -> Result<()> {
        let outcome = match self.function(function_name)? {
            NativeFn::Bundle(function) => function(bundle),
            NativeFn::Resource(_) => {
                return Err(RecastError::script_error(
                    function_name,
                    "function takes a resource, not a bundle",
                ));
            }
        };
        outcome.map_err(|e| RecastError::script_error(function_name, format!("{e:#}")))
    }

    fn apply_to_document(
        &mut self,
        function_name: &str,
        resource: &mut JsonValue,
        bundle: &JsonValue,
    ) -> Result<()> {
        let outcome = match self.function(function_name)? {
            NativeFn::Resource(function) => function(resource, bundle),
            NativeFn::Bundle(_) => {
                return Err(RecastError::script_error(
                    function_name,
                    "function takes a bundle, not a resource",
                ));
            }
        };
        outcome.map_err(|e| RecastError::script_error(function_name, format!("{e:#}")))
    }
}
