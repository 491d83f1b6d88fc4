//! Bundle transformation: applies a mapping's actions in order
//!
//! Every action except `execute_script` mutates the bundle in place;
//! scripts rebuild it from their JSON output.

mod create;
mod filter;
mod profiles;
mod script;
mod set_values;
mod shift;

use tracing::{debug, info};

use crate::directive::DirectiveResolver;
use crate::engine::{Assignment, MappingEntry, PathGenerator, expand_entries};
use crate::mapping::{Action, ActionKind, Mapping};
use crate::model::{Bundle, Document};
use crate::path::{PathEngine, PathEvaluator};
use crate::result::{Result, ResultExt};
use crate::schema::FieldCatalog;
use crate::script::{NativeScriptHost, ScriptHost};
use crate::subject::SubjectContext;
use crate::valueset::CodeRegistry;

/// Applies mappings to bundles
pub struct Transformer<'a> {
    catalog: &'a dyn FieldCatalog,
    engine: &'a dyn PathEngine,
    codes: CodeRegistry,
    subject: Option<&'a dyn SubjectContext>,
    scripts: Box<dyn ScriptHost + 'a>,
    strict: bool,
}

impl<'a> Transformer<'a> {
    pub fn new(catalog: &'a dyn FieldCatalog, engine: &'a dyn PathEngine) -> Self {
        Self {
            catalog,
            engine,
            codes: CodeRegistry::default(),
            subject: None,
            scripts: Box::new(NativeScriptHost::with_builtins()),
            strict: false,
        }
    }

    pub fn with_codes(mut self, codes: CodeRegistry) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_subject(mut self, subject: Option<&'a dyn SubjectContext>) -> Self {
        self.subject = subject;
        self
    }

    pub fn with_script_host(mut self, host: impl ScriptHost + 'a) -> Self {
        self.scripts = Box::new(host);
        self
    }

    /// Treat unresolved `$findRef` targets as errors
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn codes(&self) -> &CodeRegistry {
        &self.codes
    }

    /// Apply every action of `mapping` to `bundle`, in order
    pub fn apply_mapping(&mut self, mut bundle: Bundle, mapping: &Mapping) -> Result<Bundle> {
        for value_set in &mapping.custom_value_sets {
            if let Some(url) = self
                .codes
                .load_value_set(value_set)
                .skip_with_warning(format_args!("Mapping '{}'", mapping.name))
            {
                debug!("Mapping '{}' registered ValueSet {}", mapping.name, url);
            }
        }

        let evaluator = PathEvaluator::new(self.engine, &mapping.variables);
        if let Some(applicability) = &mapping.applicability
            && !evaluator.applies_to_bundle(&bundle, applicability)?
        {
            info!(
                "Mapping '{}' does not apply to this bundle ({})",
                mapping.name, applicability
            );
            return Ok(bundle);
        }

        for action in &mapping.actions {
            let before = bundle.len();
            bundle = self.apply_action(bundle, action, &mapping.name, &evaluator)?;
            info!(
                "{}: {} -> {} entries",
                action.label(),
                before,
                bundle.len()
            );
        }
        Ok(bundle)
    }

    fn apply_action(
        &mut self,
        mut bundle: Bundle,
        action: &Action,
        mapping_name: &str,
        evaluator: &PathEvaluator<'_>,
    ) -> Result<Bundle> {
        let ctx = ActionContext {
            mapping: mapping_name,
            catalog: self.catalog,
            evaluator,
            codes: &self.codes,
            subject: self.subject,
            strict: self.strict,
        };

        match &action.kind {
            ActionKind::ApplyProfiles(rules) => profiles::apply_profiles(&ctx, &mut bundle, rules)?,
            ActionKind::SetValues(rules) => set_values::set_values(&ctx, &mut bundle, rules)?,
            ActionKind::KeepResources(selectors) => {
                filter::keep_resources(&ctx, &mut bundle, selectors)?
            }
            ActionKind::DeleteResources(selectors) => {
                filter::delete_resources(&ctx, &mut bundle, selectors)?
            }
            ActionKind::CreateResource(rules) => create::create_resources(&ctx, &mut bundle, rules)?,
            ActionKind::ShiftDates(rule) => shift::shift_dates(&ctx, &mut bundle, rule)?,
            ActionKind::DateFilter(range) => filter::date_filter(&ctx, &mut bundle, range),
            ActionKind::ExecuteScript(scripts) => {
                return script::execute_scripts(
                    self.scripts.as_mut(),
                    self.catalog,
                    bundle,
                    scripts,
                );
            }
        }
        Ok(bundle)
    }
}

/// Shared, read-only state for one action
pub(crate) struct ActionContext<'c> {
    pub mapping: &'c str,
    pub catalog: &'c dyn FieldCatalog,
    pub evaluator: &'c PathEvaluator<'c>,
    pub codes: &'c CodeRegistry,
    pub subject: Option<&'c dyn SubjectContext>,
    pub strict: bool,
}

impl ActionContext<'_> {
    pub fn generator(&self) -> PathGenerator<'_> {
        PathGenerator::new(self.catalog, self.evaluator.engine())
    }

    /// Resolve `fields` with `current` as the document directives read from
    pub fn resolve_fields(
        &self,
        bundle: &Bundle,
        current: Option<&Document>,
        fields: &[MappingEntry],
    ) -> Result<Vec<Assignment>> {
        let resolver = DirectiveResolver::new(self.mapping, bundle, self.evaluator, self.codes)
            .with_current(current)
            .with_subject(self.subject)
            .strict(self.strict);
        let assignments = expand_entries(fields, &resolver)?;
        debug!(
            "Resolved {} fields into {} assignments",
            fields.len(),
            assignments.len()
        );
        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::FhirPathLite;
    use crate::schema::SchemaTable;
    use serde_json::json;

    fn bundle(schema: &SchemaTable) -> Bundle {
        Bundle::from_json(
            &json!({
                "resourceType": "Bundle",
                "type": "collection",
                "entry": [
                    {"resource": {"resourceType": "Patient", "id": "p1", "gender": "male"}},
                    {"resource": {"resourceType": "Encounter", "id": "e1", "status": "finished"}}
                ]
            }),
            schema,
        )
        .unwrap()
    }

    #[test]
    fn test_mapping_applicability_gates_the_bundle() {
        let schema = SchemaTable::r4_core();
        let mapping = Mapping::from_yaml_str(
            "applicability: Patient.gender = 'female'\nactions:\n  - delete_resources: [Encounter]\n",
        )
        .unwrap();
        let mut transformer = Transformer::new(&schema, &FhirPathLite);
        let out = transformer.apply_mapping(bundle(&schema), &mapping).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_actions_run_in_order() {
        let schema = SchemaTable::r4_core();
        let mapping = Mapping::from_yaml_str(
            r#"
applicability: Patient
actions:
  - name: tag
    profiles:
      - profile: http://example.org/enc
        applicability: Encounter
  - name: trim
    keep_resources: [Encounter]
"#,
        )
        .unwrap();
        let mut transformer = Transformer::new(&schema, &FhirPathLite);
        let out = transformer.apply_mapping(bundle(&schema), &mapping).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(
            out.document(0).unwrap().profiles(),
            vec!["http://example.org/enc".to_string()]
        );
    }

    #[test]
    fn test_custom_value_sets_are_loaded() {
        let schema = SchemaTable::r4_core();
        let mapping = Mapping::from_yaml_str(
            r#"
customValueSets:
  - resourceType: ValueSet
    url: urn:vs:status
    compose:
      include:
        - system: urn:cs
          concept: [{code: ok}]
actions:
  - set_values:
      - applicability: Encounter
        fields:
          - location: Encounter.class
            value: $randomCode([urn:vs:status])
"#,
        )
        .unwrap();
        let mut transformer =
            Transformer::new(&schema, &FhirPathLite).with_codes(CodeRegistry::new(Some(5)));
        let out = transformer.apply_mapping(bundle(&schema), &mapping).unwrap();
        assert!(transformer.codes().contains("urn:vs:status"));
        assert_eq!(
            out.to_json()["entry"][1]["resource"]["class"],
            json!({"system": "urn:cs", "code": "ok", "display": "ok"})
        );
    }
}
