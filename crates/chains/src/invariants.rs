//! Post-transform invariant checks. Every check fails fast with the stage
//! name and the counts involved.

use std::collections::BTreeMap;

use attribution_core::error::{AttributionError, AttributionResult};

/// No conversion id may be assigned to more than one chain.
pub fn ensure_unique_conversion_ids<'a>(
    stage: &'static str,
    ids: impl IntoIterator<Item = &'a str>,
) -> AttributionResult<()> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for id in ids {
        *counts.entry(id).or_default() += 1;
    }
    match counts.into_iter().find(|(_, n)| *n > 1) {
        Some((id, occurrences)) => Err(AttributionError::DuplicateConversionId {
            stage,
            conversion_id: id.to_string(),
            occurrences,
        }),
        None => Ok(()),
    }
}

pub fn ensure_conversion_count(
    stage: &'static str,
    expected: usize,
    found: usize,
) -> AttributionResult<()> {
    if expected != found {
        return Err(AttributionError::ConversionCountMismatch {
            stage,
            expected,
            found,
        });
    }
    Ok(())
}
