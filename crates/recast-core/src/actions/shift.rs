use tracing::debug;

use super::ActionContext;
use crate::mapping::ShiftDatesRule;
use crate::model::Bundle;
use crate::result::Result;
use crate::temporal::shift_document;

/// Shift every temporal value of the selected documents (all by default)
pub(super) fn shift_dates(
    ctx: &ActionContext<'_>,
    bundle: &mut Bundle,
    rule: &ShiftDatesRule,
) -> Result<()> {
    let selected = match &rule.applicability {
        Some(applicability) => Some(ctx.evaluator.select_documents(bundle, applicability)?),
        None => None,
    };

    let mut total = 0;
    for (index, entry) in bundle.entries.iter_mut().enumerate() {
        if selected
            .as_ref()
            .is_some_and(|selected| !selected.contains(&index))
        {
            continue;
        }
        let fields = ctx.catalog.temporal_fields(entry.resource.resource_type());
        if fields.is_empty() {
            continue;
        }
        total += shift_document(&mut entry.resource, &fields, &rule.amount);
    }
    debug!("Shifted {} temporal values", total);
    Ok(())
}
