//! `create_resource`: synthesize documents, optionally one per source
//!
//! Sources are either bundle documents selected by a path, or visits of a
//! module state in the subject's history. State visits are presented to
//! directives as Encounters, so `State.entered`/`State.exited` are rewritten
//! to the Encounter's period.

use chrono::SecondsFormat;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use super::ActionContext;
use crate::engine::{Assignment, MappingEntry, ValueSpec};
use crate::error::RecastError;
use crate::mapping::{BasedOn, CreateResourceRule};
use crate::model::{Bundle, Cardinality, Document, Element, FieldKind, Node, URN_UUID_PREFIX};
use crate::result::Result;
use crate::subject::StateVisit;
use crate::temporal::parse_moment;

pub(super) fn create_resources(
    ctx: &ActionContext<'_>,
    bundle: &mut Bundle,
    rules: &[CreateResourceRule],
) -> Result<()> {
    for rule in rules {
        let created = match &rule.based_on {
            None => {
                let assignments = ctx.resolve_fields(bundle, None, &rule.fields)?;
                push_created(ctx, bundle, rule, &assignments)?;
                1
            }
            Some(BasedOn {
                resource: Some(path),
                ..
            }) => from_documents(ctx, bundle, rule, path)?,
            Some(BasedOn {
                module: Some(module),
                state: Some(state),
                ..
            }) => from_state_visits(ctx, bundle, rule, module, state)?,
            Some(_) => {
                return Err(RecastError::mapping_error(format!(
                    "create_resource {}: incomplete based_on",
                    rule.resource_type
                )));
            }
        };
        debug!("Created {} {} documents", created, rule.resource_type);
    }
    Ok(())
}

/// One new document per selected source, with writeback onto that source
fn from_documents(
    ctx: &ActionContext<'_>,
    bundle: &mut Bundle,
    rule: &CreateResourceRule,
    path: &str,
) -> Result<usize> {
    let generator = ctx.generator();
    let sources = ctx.evaluator.select_documents(bundle, path)?;
    for &source in &sources {
        let assignments = ctx.resolve_fields(bundle, bundle.document(source), &rule.fields)?;
        let created = push_created(ctx, bundle, rule, &assignments)?;

        if rule.writeback.is_empty() {
            continue;
        }
        let writeback = ctx.resolve_fields(bundle, bundle.document(created), &rule.writeback)?;
        if let Some(document) = bundle.document_mut(source) {
            generator.update(document, &writeback)?;
        }
    }
    Ok(sources.len())
}

fn from_state_visits(
    ctx: &ActionContext<'_>,
    bundle: &mut Bundle,
    rule: &CreateResourceRule,
    module: &str,
    state: &str,
) -> Result<usize> {
    let history_key = format!("{module} Module");
    let history = ctx
        .subject
        .and_then(|subject| subject.module_history(module))
        .ok_or_else(|| RecastError::unresolved_reference(ctx.mapping, "subject", &history_key))?;
    if !rule.writeback.is_empty() {
        warn!(
            "create_resource {}: writeback is ignored for module-based sources",
            rule.resource_type
        );
    }

    let fields = rewrite_state_fields(&rule.fields);
    let visits: Vec<&StateVisit> = history.iter().filter(|visit| visit.name == state).collect();
    for visit in &visits {
        let source = visit_encounter(bundle, visit);
        let assignments = ctx.resolve_fields(bundle, Some(&source), &fields)?;
        push_created(ctx, bundle, rule, &assignments)?;
    }
    Ok(visits.len())
}

fn push_created(
    ctx: &ActionContext<'_>,
    bundle: &mut Bundle,
    rule: &CreateResourceRule,
    assignments: &[Assignment],
) -> Result<usize> {
    let mut document = ctx.generator().generate(&rule.resource_type, assignments)?;
    document.set_id(&Uuid::new_v4().to_string());
    for profile in &rule.profiles {
        document.add_profile(profile);
    }
    Ok(bundle.push_document(document))
}

fn rewrite_state_fields(fields: &[MappingEntry]) -> Vec<MappingEntry> {
    fields
        .iter()
        .map(|entry| match &entry.value {
            ValueSpec::Directive(text) if text.contains("State.") => MappingEntry {
                value: ValueSpec::Directive(
                    text.replace("State.entered", "Encounter.period.start")
                        .replace("State.exited", "Encounter.period.end"),
                ),
                ..entry.clone()
            },
            _ => entry.clone(),
        })
        .collect()
}

/// Stand-in Encounter for one state visit
fn visit_encounter(bundle: &Bundle, visit: &StateVisit) -> Document {
    let mut encounter = Document::new("Encounter");
    let root = encounter.root_mut();

    let mut period = Element::new("Period");
    for (field, moment) in [("start", visit.entered), ("end", visit.exited)] {
        if let Some(moment) = moment {
            period.set_primitive(
                field,
                json!(moment.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
                Some("dateTime"),
            );
        }
    }
    root.slot_or_insert("period", Cardinality::Single, FieldKind::Composite)
        .nodes = vec![Node::Element(period)];

    if let Some(active) = encounter_at_visit(bundle, visit)
        && let Some(id) = active.id()
    {
        let mut part_of = Element::new("Reference");
        part_of.set_primitive(
            "reference",
            json!(format!("{URN_UUID_PREFIX}{id}")),
            Some("string"),
        );
        root.slot_or_insert("partOf", Cardinality::Single, FieldKind::Reference)
            .nodes = vec![Node::Element(part_of)];

        if let Some(participant) = active.root().slot("participant") {
            root.fields
                .insert("participant".to_string(), participant.clone());
        }
    }
    encounter
}

/// The encounter the visit started, or the first one open when it was entered
fn encounter_at_visit<'b>(bundle: &'b Bundle, visit: &StateVisit) -> Option<&'b Document> {
    let mut encounters = bundle
        .documents()
        .filter(|document| document.resource_type() == "Encounter");

    if let Some(id) = &visit.encounter {
        return encounters.find(|document| document.id().as_deref() == Some(id.as_str()));
    }

    let entered = visit.entered?.fixed_offset();
    encounters.find(|document| {
        let Some(period) = document.root().child_element("period") else {
            return false;
        };
        let Some(start) = period.primitive_text("start").as_deref().and_then(parse_moment) else {
            return false;
        };
        let end = period.primitive_text("end").as_deref().and_then(parse_moment);
        start <= entered && end.is_none_or(|end| entered <= end)
    })
}

#[cfg(test)]
mod tests {
    use crate::actions::Transformer;
    use crate::error::RecastError;
    use crate::mapping::Mapping;
    use crate::model::Bundle;
    use crate::path::FhirPathLite;
    use crate::schema::SchemaTable;
    use crate::subject::{StateVisit, SubjectRecord};
    use chrono::{DateTime, Utc};
    use serde_json::{Value as JsonValue, json};

    fn bundle(schema: &SchemaTable, bundle_type: &str) -> Bundle {
        Bundle::from_json(
            &json!({
                "resourceType": "Bundle",
                "type": bundle_type,
                "entry": [
                    {"resource": {"resourceType": "Patient", "id": "p1"}},
                    {"resource": {"resourceType": "Encounter", "id": "e1",
                        "period": {"start": "2020-01-01T09:00:00Z", "end": "2020-01-01T10:00:00Z"},
                        "participant": [{"individual": {"reference": "Practitioner/dr1"}}]}},
                    {"resource": {"resourceType": "Procedure", "id": "pr1", "status": "completed",
                        "subject": {"reference": "Patient/p1"}}},
                    {"resource": {"resourceType": "Procedure", "id": "pr2", "status": "completed",
                        "subject": {"reference": "Patient/p1"}}}
                ]
            }),
            schema,
        )
        .unwrap()
    }

    fn at(text: &str) -> Option<DateTime<Utc>> {
        Some(text.parse().unwrap())
    }

    #[test]
    fn test_one_document_per_source_with_writeback() {
        let schema = SchemaTable::r4_core();
        let mapping = Mapping::from_yaml_str(
            r#"
actions:
  - create_resource:
      - resourceType: ServiceRequest
        based_on:
          resource: Procedure
        profiles: [http://example.org/sr]
        fields:
          - location: ServiceRequest.subject.reference
            value: $getField([Procedure.subject.reference])
          - location: ServiceRequest.status
            value: active
        writeback:
          - location: Procedure.basedOn.reference
            value: $setRef([])
"#,
        )
        .unwrap();
        let mut transformer = Transformer::new(&schema, &FhirPathLite);
        let out = transformer
            .apply_mapping(bundle(&schema, "transaction"), &mapping)
            .unwrap();
        let json = out.to_json();
        assert_eq!(out.len(), 6);

        for (source, created) in [(2, 4), (3, 5)] {
            let request = &json["entry"][created];
            let id = request["resource"]["id"].as_str().unwrap();
            assert!(uuid::Uuid::parse_str(id).is_ok());
            assert_eq!(request["fullUrl"], json!(format!("urn:uuid:{id}")));
            assert_eq!(request["request"], json!({"method": "POST", "url": "ServiceRequest"}));
            assert_eq!(request["resource"]["status"], json!("active"));
            assert_eq!(
                request["resource"]["subject"],
                json!({"reference": "Patient/p1"})
            );
            assert_eq!(
                request["resource"]["meta"]["profile"],
                json!(["http://example.org/sr"])
            );

            // Exactly one basedOn per created request
            assert_eq!(
                json["entry"][source]["resource"]["basedOn"],
                json!([{"reference": format!("ServiceRequest/{id}")}])
            );
        }
    }

    #[test]
    fn test_zero_sources_create_nothing() {
        let schema = SchemaTable::r4_core();
        let mapping = Mapping::from_yaml_str(
            "actions:\n  - create_resource:\n      - resourceType: ServiceRequest\n        based_on:\n          resource: Condition\n",
        )
        .unwrap();
        let mut transformer = Transformer::new(&schema, &FhirPathLite);
        let out = transformer
            .apply_mapping(bundle(&schema, "collection"), &mapping)
            .unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_standalone_document_in_collection() {
        let schema = SchemaTable::r4_core();
        let mapping = Mapping::from_yaml_str(
            r#"
actions:
  - create_resource:
      - resourceType: Observation
        fields:
          - location: Observation.status
            value: final
          - location: Observation.subject.reference
            value: $findRef([Patient])
"#,
        )
        .unwrap();
        let mut transformer = Transformer::new(&schema, &FhirPathLite);
        let out = transformer
            .apply_mapping(bundle(&schema, "collection"), &mapping)
            .unwrap();
        let entry = &out.to_json()["entry"][4];
        assert!(entry.get("request").is_none());
        assert_eq!(entry["resource"]["status"], json!("final"));
        assert_eq!(entry["resource"]["subject"], json!({"reference": "Patient/p1"}));
    }

    #[test]
    fn test_documents_from_module_state_visits() {
        let schema = SchemaTable::r4_core();
        let subject = SubjectRecord::default().with_module(
            "Diabetes",
            vec![
                StateVisit {
                    entered: at("2020-01-01T09:30:00Z"),
                    exited: at("2020-01-01T09:45:00Z"),
                    ..StateVisit::new("Screening")
                },
                StateVisit::new("Initial"),
                StateVisit {
                    entered: at("2021-03-01T00:00:00Z"),
                    exited: None,
                    ..StateVisit::new("Screening")
                },
            ],
        );
        let mapping = Mapping::from_yaml_str(
            r#"
actions:
  - create_resource:
      - resourceType: Procedure
        based_on:
          module: Diabetes
          state: Screening
        fields:
          - location: Procedure.status
            value: completed
          - location: Procedure.performedPeriod.start
            value: $getField([State.entered])
          - location: Procedure.performedPeriod.end
            value: $getField([State.exited])
          - location: Procedure.encounter.reference
            value: $getField([Encounter.partOf.reference])
"#,
        )
        .unwrap();
        let mut transformer =
            Transformer::new(&schema, &FhirPathLite).with_subject(Some(&subject));
        let out = transformer
            .apply_mapping(bundle(&schema, "collection"), &mapping)
            .unwrap()
            .to_json();

        let first = &out["entry"][4]["resource"];
        assert_eq!(
            first["performedPeriod"],
            json!({"start": "2020-01-01T09:30:00Z", "end": "2020-01-01T09:45:00Z"})
        );
        assert_eq!(first["encounter"], json!({"reference": "urn:uuid:e1"}));

        let second = &out["entry"][5]["resource"];
        assert_eq!(
            second["performedPeriod"],
            json!({"start": "2021-03-01T00:00:00Z"})
        );
        assert_eq!(second.get("encounter"), None::<&JsonValue>);
    }

    #[test]
    fn test_missing_module_history_is_fatal() {
        let schema = SchemaTable::r4_core();
        let mapping = Mapping::from_yaml_str(
            "actions:\n  - create_resource:\n      - resourceType: Procedure\n        based_on:\n          module: Asthma\n          state: Attack\n",
        )
        .unwrap();
        let subject = SubjectRecord::default();
        let mut transformer =
            Transformer::new(&schema, &FhirPathLite).with_subject(Some(&subject));
        let err = transformer
            .apply_mapping(bundle(&schema, "collection"), &mapping)
            .unwrap_err();
        assert!(matches!(
            err,
            RecastError::UnresolvedReference { ref target, .. } if target == "Asthma Module"
        ));
    }
}
