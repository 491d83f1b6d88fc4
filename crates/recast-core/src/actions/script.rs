//! `execute_script`: hand the bundle's JSON to a script host
//!
//! In resource mode every function sees the bundle as it was before that
//! function ran, not the partially updated one.

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::mapping::{ScriptRule, ScriptTarget};
use crate::model::Bundle;
use crate::result::Result;
use crate::schema::FieldCatalog;
use crate::script::ScriptHost;

pub(super) fn execute_scripts(
    host: &mut dyn ScriptHost,
    catalog: &dyn FieldCatalog,
    bundle: Bundle,
    scripts: &[ScriptRule],
) -> Result<Bundle> {
    let mut json = bundle.to_json();
    for script in scripts {
        host.load_script(&script.function_name, &script.function)?;
        match &script.target {
            ScriptTarget::Bundle => host.apply_to_bundle(&script.function_name, &mut json)?,
            ScriptTarget::Resources(resource_type) => {
                let snapshot = json.clone();
                let Some(entries) = json.get_mut("entry").and_then(JsonValue::as_array_mut) else {
                    continue;
                };
                let mut calls = 0;
                for resource in entries.iter_mut().filter_map(|e| e.get_mut("resource")) {
                    if !matches_type(resource, resource_type.as_deref()) {
                        continue;
                    }
                    host.apply_to_document(&script.function_name, resource, &snapshot)?;
                    calls += 1;
                }
                debug!("{} applied to {} resources", script.function_name, calls);
            }
        }
    }
    Bundle::from_json(&json, catalog)
}

fn matches_type(resource: &JsonValue, resource_type: Option<&str>) -> bool {
    let Some(wanted) = resource_type else {
        return true;
    };
    resource
        .get("resourceType")
        .and_then(JsonValue::as_str)
        .is_some_and(|actual| actual.eq_ignore_ascii_case(wanted))
}

#[cfg(test)]
mod tests {
    use crate::actions::Transformer;
    use crate::error::RecastError;
    use crate::mapping::Mapping;
    use crate::model::Bundle;
    use crate::path::FhirPathLite;
    use crate::schema::SchemaTable;
    use crate::script::NativeScriptHost;
    use serde_json::json;

    fn bundle(schema: &SchemaTable) -> Bundle {
        Bundle::from_json(
            &json!({
                "resourceType": "Bundle",
                "type": "collection",
                "entry": [
                    {"resource": {"resourceType": "Patient", "id": "p1",
                        "text": {"status": "generated", "div": "<div>p1</div>"}}},
                    {"resource": {"resourceType": "Encounter", "id": "e1", "status": "finished",
                        "text": {"status": "generated", "div": "<div>e1</div>"}}}
                ]
            }),
            schema,
        )
        .unwrap()
    }

    #[test]
    fn test_resource_scripts_filter_by_type() {
        let schema = SchemaTable::r4_core();
        let mapping = Mapping::from_yaml_str(
            r#"
actions:
  - execute_script:
      - function_name: stripNarrative
        apply_to: resources
        resource_type: encounter
"#,
        )
        .unwrap();
        let mut transformer = Transformer::new(&schema, &FhirPathLite);
        let out = transformer
            .apply_mapping(bundle(&schema), &mapping)
            .unwrap()
            .to_json();
        assert!(out["entry"][0]["resource"].get("text").is_some());
        assert!(out["entry"][1]["resource"].get("text").is_none());
    }

    #[test]
    fn test_resource_scripts_see_the_snapshot() {
        let schema = SchemaTable::r4_core();
        let mut host = NativeScriptHost::new();
        host.register_resource_fn("countTagged", |resource, bundle| {
            let tagged = bundle["entry"]
                .as_array()
                .map(|entries| {
                    entries
                        .iter()
                        .filter(|e| e["resource"].get("language").is_some())
                        .count()
                })
                .unwrap_or(0);
            resource["language"] = json!(format!("n{tagged}"));
            Ok(())
        });
        let mapping = Mapping::from_yaml_str(
            "actions:\n  - execute_script:\n      - function_name: countTagged\n        apply_to: resources\n",
        )
        .unwrap();
        let mut transformer = Transformer::new(&schema, &FhirPathLite).with_script_host(host);
        let out = transformer
            .apply_mapping(bundle(&schema), &mapping)
            .unwrap()
            .to_json();
        // The Patient is tagged first, but the Encounter's call sees the snapshot
        assert_eq!(out["entry"][0]["resource"]["language"], json!("n0"));
        assert_eq!(out["entry"][1]["resource"]["language"], json!("n0"));
    }

    #[test]
    fn test_bundle_script_rebuilds_the_bundle() {
        let schema = SchemaTable::r4_core();
        let mut host = NativeScriptHost::new();
        host.register_bundle_fn("onlyFirst", |bundle| {
            if let Some(entries) = bundle["entry"].as_array_mut() {
                entries.truncate(1);
            }
            Ok(())
        });
        let mapping = Mapping::from_yaml_str(
            "actions:\n  - execute_script:\n      - function_name: onlyFirst\n        apply_to: bundle\n",
        )
        .unwrap();
        let mut transformer = Transformer::new(&schema, &FhirPathLite).with_script_host(host);
        let out = transformer.apply_mapping(bundle(&schema), &mapping).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.documents().next().map(|d| d.identity()), Some("Patient/p1".into()));
    }

    #[test]
    fn test_unknown_function_fails_the_action() {
        let schema = SchemaTable::r4_core();
        let mapping = Mapping::from_yaml_str(
            "actions:\n  - execute_script:\n      - function_name: nope\n        apply_to: bundle\n",
        )
        .unwrap();
        let mut transformer = Transformer::new(&schema, &FhirPathLite);
        let err = transformer
            .apply_mapping(bundle(&schema), &mapping)
            .unwrap_err();
        assert!(matches!(err, RecastError::ScriptError { .. }));
    }
}
