//! Cross-window merge: one deterministic answer per field.

use crate::attribution::AttributionResolver;
use crate::patterns::WindowHit;
use crate::schema::{ExtractionResult, ExtractionSource, Field};
use std::collections::HashMap;
use tracing::debug;

/// Pick the winning hit per field and attribute it.
///
/// The longest value wins (most complete phrasing); among equally long
/// values the first in window order is kept. Fields without hits get no entry.
pub fn merge_window_hits(
    hits: &[WindowHit],
    resolver: &AttributionResolver<'_>,
) -> HashMap<Field, ExtractionResult> {
    let mut best: HashMap<Field, &WindowHit> = HashMap::new();

    for hit in hits {
        best.entry(hit.field)
            .and_modify(|current| {
                if hit.value.chars().count() > current.value.chars().count() {
                    *current = hit;
                }
            })
            .or_insert(hit);
    }

    best.into_iter()
        .map(|(field, hit)| {
            let attribution =
                resolver.resolve(&hit.value, Some(hit.page_number), Some(&hit.window_text));
            debug!(
                "Regex result for '{}': '{}' (page {:?})",
                field, hit.value, attribution.page_number
            );
            (
                field,
                ExtractionResult::new(hit.value.clone(), ExtractionSource::Regex, attribution),
            )
        })
        .collect()
}
