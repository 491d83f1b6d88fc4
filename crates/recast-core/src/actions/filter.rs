//! Entry removal: keep/delete by selector and date-range filtering
//!
//! All three are single passes. Documents that reference a removed document
//! are left in place.

use tracing::debug;

use super::ActionContext;
use crate::model::Bundle;
use crate::result::Result;
use crate::temporal::DateRange;

pub(super) fn keep_resources(
    ctx: &ActionContext<'_>,
    bundle: &mut Bundle,
    selectors: &[String],
) -> Result<()> {
    let matched = matches_any(ctx, bundle, selectors)?;
    bundle.retain_flags(&matched);
    Ok(())
}

pub(super) fn delete_resources(
    ctx: &ActionContext<'_>,
    bundle: &mut Bundle,
    selectors: &[String],
) -> Result<()> {
    let keep: Vec<bool> = matches_any(ctx, bundle, selectors)?
        .into_iter()
        .map(|matched| !matched)
        .collect();
    bundle.retain_flags(&keep);
    Ok(())
}

pub(super) fn date_filter(ctx: &ActionContext<'_>, bundle: &mut Bundle, range: &DateRange) {
    if range.is_unbounded() {
        return;
    }
    let keep: Vec<bool> = bundle
        .documents()
        .map(|document| {
            let fields = ctx.catalog.temporal_fields(document.resource_type());
            let admitted = range.admits(document, &fields);
            if !admitted {
                debug!("{} falls outside the date range", document.identity());
            }
            admitted
        })
        .collect();
    bundle.retain_flags(&keep);
}

/// Per entry: does any selector pick it?
fn matches_any(ctx: &ActionContext<'_>, bundle: &Bundle, selectors: &[String]) -> Result<Vec<bool>> {
    let mut matched = vec![false; bundle.len()];
    for selector in selectors {
        let selector = selector.trim();
        if is_type_name(selector) {
            for (index, document) in bundle.documents().enumerate() {
                if document.resource_type() == selector {
                    matched[index] = true;
                }
            }
        } else {
            for index in ctx.evaluator.select_documents(bundle, selector)? {
                if let Some(flag) = matched.get_mut(index) {
                    *flag = true;
                }
            }
        }
    }
    debug!(
        "{} of {} entries match {:?}",
        matched.iter().filter(|m| **m).count(),
        matched.len(),
        selectors
    );
    Ok(matched)
}

/// A bare resource type such as `Patient`
fn is_type_name(selector: &str) -> bool {
    selector.starts_with(|c: char| c.is_ascii_uppercase())
        && selector.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use crate::actions::Transformer;
    use crate::mapping::Mapping;
    use crate::model::Bundle;
    use crate::path::FhirPathLite;
    use crate::schema::SchemaTable;
    use serde_json::json;

    fn bundle(schema: &SchemaTable) -> Bundle {
        Bundle::from_json(
            &json!({
                "resourceType": "Bundle",
                "type": "collection",
                "entry": [
                    {"resource": {"resourceType": "Patient", "id": "p1"}},
                    {"resource": {"resourceType": "Encounter", "id": "e1",
                        "period": {"start": "2015-03-01T10:00:00Z", "end": "2015-03-01T11:00:00Z"}}},
                    {"resource": {"resourceType": "Encounter", "id": "e2",
                        "period": {"start": "2021-06-01T10:00:00Z", "end": "2021-06-01T11:00:00Z"}}},
                    {"resource": {"resourceType": "Claim", "id": "c1"}},
                    {"resource": {"resourceType": "Observation", "id": "o1", "status": "final",
                        "subject": {"reference": "Patient/p1"}}}
                ]
            }),
            schema,
        )
        .unwrap()
    }

    fn run(yaml: &str) -> Vec<String> {
        let schema = SchemaTable::r4_core();
        let mapping = Mapping::from_yaml_str(yaml).unwrap();
        let mut transformer = Transformer::new(&schema, &FhirPathLite);
        transformer
            .apply_mapping(bundle(&schema), &mapping)
            .unwrap()
            .documents()
            .map(|d| d.identity())
            .collect()
    }

    #[test]
    fn test_keep_and_delete_are_complements() {
        let kept = run("actions:\n  - keep_resources: [Patient, Encounter]\n");
        let deleted = run("actions:\n  - delete_resources: [Patient, Encounter]\n");
        assert_eq!(kept, vec!["Patient/p1", "Encounter/e1", "Encounter/e2"]);
        assert_eq!(deleted, vec!["Claim/c1", "Observation/o1"]);
    }

    #[test]
    fn test_delete_does_not_cascade() {
        let remaining = run("actions:\n  - delete_resources: [Patient]\n");
        assert!(remaining.contains(&"Observation/o1".to_string()));
    }

    #[test]
    fn test_selectors_may_be_paths() {
        let remaining = run(
            "actions:\n  - delete_resources: [\"Encounter.where(id = 'e2')\", Claim]\n",
        );
        assert_eq!(remaining, vec!["Patient/p1", "Encounter/e1", "Observation/o1"]);
    }

    #[test]
    fn test_date_filter_drops_documents_outside_the_range() {
        let remaining = run("actions:\n  - min_date: \"2020-01-01\"\n    max_date: \"2022-01-01\"\n");
        assert_eq!(
            remaining,
            vec!["Patient/p1", "Encounter/e2", "Claim/c1", "Observation/o1"]
        );
    }
}
