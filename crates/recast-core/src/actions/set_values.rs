use tracing::debug;

use super::ActionContext;
use crate::mapping::SetValuesRule;
use crate::model::Bundle;
use crate::result::Result;

/// Resolve fields per selected document, then mutate that document in place
pub(super) fn set_values(
    ctx: &ActionContext<'_>,
    bundle: &mut Bundle,
    rules: &[SetValuesRule],
) -> Result<()> {
    let generator = ctx.generator();
    for rule in rules {
        let selected = ctx.evaluator.select_documents(bundle, &rule.applicability)?;
        debug!(
            "set_values '{}' selected {} documents",
            rule.applicability,
            selected.len()
        );
        for index in selected {
            let assignments = ctx.resolve_fields(bundle, bundle.document(index), &rule.fields)?;
            if let Some(document) = bundle.document_mut(index) {
                generator.update(document, &assignments)?;
            }
        }
    }
    Ok(())
}
