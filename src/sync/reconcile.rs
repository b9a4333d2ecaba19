//! Stage 3: create field mappings for tokens that don't have one yet

use crate::error::Result;
use crate::store::RecordStore;
use std::collections::HashSet;
use tracing::{debug, warn};

/// What reconciling one template did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Tokens that got a new mapping
    pub created: Vec<String>,
    /// Tokens whose mapping appeared between the read and the insert
    pub already_present: Vec<String>,
    /// (token, error) for each mapping that could not be created
    pub failed: Vec<(String, String)>,
}

/// Tokens with no existing mapping, in token order, each at most once
pub fn unmapped_tokens(tokens: &[String], existing: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .filter(|t| !existing.contains(*t) && seen.insert(t.as_str()))
        .cloned()
        .collect()
}

/// Create one mapping per unmapped token under `local_key`.
///
/// Only loading the existing mappings can fail the whole call; a token whose
/// mapping can't be saved is recorded in `failed` and the rest still run.
pub fn reconcile<R: RecordStore + ?Sized>(
    store: &R,
    local_key: i32,
    tokens: &[String],
) -> Result<ReconcileOutcome> {
    let existing = store.mapped_field_names(local_key)?;
    let mut outcome = ReconcileOutcome::default();

    for token in unmapped_tokens(tokens, &existing) {
        match store.create_field_mapping(local_key, &token) {
            Ok(true) => {
                debug!(local_key, token = %token, "created field mapping");
                outcome.created.push(token);
            }
            Ok(false) => outcome.already_present.push(token),
            Err(e) => {
                warn!(local_key, token = %token, error = %e, "field mapping failed");
                outcome.failed.push((token, e.to_string()));
            }
        }
    }

    Ok(outcome)
}
