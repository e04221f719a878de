//! Response composition: final text plus the ordered, deduplicated citation list.

use std::collections::HashSet;

use super::state::ContextItem;

#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub text: String,
    pub citations: Vec<String>,
}

/// Pair the draft with one citation per distinct source reference.
///
/// Citations are deduplicated by reference, not item id, and keep the order in
/// which each reference first appears in `context`. The draft is returned as is.
pub fn compose(draft: &str, context: &[ContextItem]) -> Composition {
    let mut seen = HashSet::new();
    let citations = context
        .iter()
        .map(|item| item.source_reference.as_str())
        .filter(|reference| !reference.is_empty() && seen.insert(*reference))
        .map(String::from)
        .collect();

    Composition {
        text: draft.to_string(),
        citations,
    }
}
