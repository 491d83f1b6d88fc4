use tracing::debug;

use super::ActionContext;
use crate::mapping::ProfileRule;
use crate::model::Bundle;
use crate::result::Result;

/// Append each rule's profile to `meta.profile` of the documents it selects
pub(super) fn apply_profiles(
    ctx: &ActionContext<'_>,
    bundle: &mut Bundle,
    rules: &[ProfileRule],
) -> Result<()> {
    for rule in rules {
        let selected = ctx.evaluator.select_documents(bundle, &rule.applicability)?;
        debug!(
            "Profile {} applies to {} documents",
            rule.profile,
            selected.len()
        );
        for index in selected {
            if let Some(document) = bundle.document_mut(index) {
                document.add_profile(&rule.profile);
            }
        }
    }
    Ok(())
}
