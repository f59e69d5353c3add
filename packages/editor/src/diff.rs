//! Single-hunk text diff.
//!
//! Trims the longest common prefix and suffix of two texts and describes what
//! is left as one delete+insert. Used wherever a full-text snapshot has to be
//! turned back into an edit: the replicated-text binding forwarding buffer
//! changes, and the foreign-surface adapter patching the shared document.
//!
//! Two snapshots that differ in several places produce one patch spanning
//! from the first to the last difference.

use crate::change::EditIntent;
use serde::{Deserialize, Serialize};

/// Replace `delete_len` bytes at `offset` with `insert`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPatch {
    pub offset: usize,
    pub delete_len: usize,
    pub insert: String,
}

impl TextPatch {
    pub fn to_intent(&self) -> EditIntent {
        EditIntent::new(self.offset, self.offset + self.delete_len, self.insert.clone())
    }

    pub fn is_pure_insert(&self) -> bool {
        self.delete_len == 0
    }
}

/// Minimal single-hunk patch turning `old` into `new`, or `None` if equal.
///
/// Offsets are byte offsets that always fall on char boundaries of both texts.
pub fn compute_patch(old: &str, new: &str) -> Option<TextPatch> {
    if old == new {
        return None;
    }

    let prefix = old
        .char_indices()
        .zip(new.chars())
        .find(|((_, a), b)| a != b)
        .map_or_else(|| old.len().min(new.len()), |((idx, _), _)| idx);

    let old_rest = &old[prefix..];
    let new_rest = &new[prefix..];

    let suffix: usize = old_rest
        .chars()
        .rev()
        .zip(new_rest.chars().rev())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.len_utf8())
        .sum();

    Some(TextPatch {
        offset: prefix,
        delete_len: old_rest.len() - suffix,
        insert: new_rest[..new_rest.len() - suffix].to_string(),
    })
}
