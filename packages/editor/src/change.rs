//! # Change Sets and Position Mapping
//!
//! Every buffer mutation is described by a [`ChangeSet`]: a sorted list of
//! non-overlapping [`EditIntent`]s expressed in the coordinates of the text
//! *before* the change. Anything that stores offsets into the buffer (the
//! selection, protected ranges, deferred insert points) is carried across a
//! change with [`ChangeSet::map_pos`].
//!
//! ## Mapping rules
//!
//! - Positions before a change are untouched.
//! - Positions after a change shift by the change's length delta.
//! - A position at a pure insertion point stays before the inserted text with
//!   [`Assoc::Before`] and moves past it with [`Assoc::After`].
//! - A position inside a replaced region collapses to the start of the
//!   replacement ([`Assoc::Before`]) or its end ([`Assoc::After`]).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A proposed buffer mutation: replace `from..to` with `insert`.
///
/// Covers insertion (`from == to`), deletion (`insert` empty) and replacement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditIntent {
    pub from: usize,
    pub to: usize,
    pub insert: String,
}

impl EditIntent {
    pub fn new(from: usize, to: usize, insert: impl Into<String>) -> Self {
        Self {
            from,
            to,
            insert: insert.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::new(at, at, text)
    }

    pub fn delete(from: usize, to: usize) -> Self {
        Self::new(from, to, String::new())
    }

    /// True when the intent removes no text.
    pub fn is_insertion(&self) -> bool {
        self.from == self.to
    }

    /// True when the intent changes nothing at all.
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.insert.is_empty()
    }

    /// Net change in text length caused by this intent.
    pub fn len_delta(&self) -> isize {
        self.insert.len() as isize - (self.to - self.from) as isize
    }
}

/// Which side of an insertion a mapped position sticks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Before,
    After,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChangeError {
    #[error("inverted edit: from {from} is after to {to}")]
    Inverted { from: usize, to: usize },

    #[error("overlapping edits at offset {0}")]
    Overlap(usize),

    #[error("offset {pos} is past the end of the text (length {len})")]
    OutOfBounds { pos: usize, len: usize },

    #[error("offset {0} is not on a character boundary")]
    NotCharBoundary(usize),
}

/// Sorted, non-overlapping edits in pre-change coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<EditIntent>,
}

impl ChangeSet {
    /// Build a change set, sorting the intents and dropping no-ops.
    ///
    /// Intents may touch (`a.to == b.from`) but not overlap. Two pure
    /// insertions at the same offset are rejected as ambiguous.
    pub fn new(intents: impl IntoIterator<Item = EditIntent>) -> Result<Self, ChangeError> {
        let mut changes: Vec<EditIntent> = intents.into_iter().filter(|c| !c.is_noop()).collect();

        for change in &changes {
            if change.from > change.to {
                return Err(ChangeError::Inverted {
                    from: change.from,
                    to: change.to,
                });
            }
        }

        changes.sort_by_key(|c| (c.from, c.to));

        for pair in changes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if b.from < a.to || (a.is_insertion() && b.is_insertion() && a.from == b.from) {
                return Err(ChangeError::Overlap(b.from));
            }
        }

        Ok(Self { changes })
    }

    pub fn single(intent: EditIntent) -> Self {
        Self {
            changes: if intent.is_noop() { vec![] } else { vec![intent] },
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[EditIntent] {
        &self.changes
    }

    /// Check every offset against `text` without applying anything.
    pub fn validate(&self, text: &str) -> Result<(), ChangeError> {
        for change in &self.changes {
            for pos in [change.from, change.to] {
                if pos > text.len() {
                    return Err(ChangeError::OutOfBounds {
                        pos,
                        len: text.len(),
                    });
                }
                if !text.is_char_boundary(pos) {
                    return Err(ChangeError::NotCharBoundary(pos));
                }
            }
        }
        Ok(())
    }

    /// Apply to `text` in place. Offsets are validated first, so a failed
    /// apply leaves `text` untouched.
    pub fn apply(&self, text: &mut String) -> Result<(), ChangeError> {
        self.validate(text)?;
        for change in self.changes.iter().rev() {
            text.replace_range(change.from..change.to, &change.insert);
        }
        Ok(())
    }

    /// Length of the text after this change set, given the length before.
    pub fn new_len(&self, old_len: usize) -> usize {
        let delta: isize = self.changes.iter().map(EditIntent::len_delta).sum();
        (old_len as isize + delta).max(0) as usize
    }

    /// Map a pre-change offset to its post-change offset.
    pub fn map_pos(&self, pos: usize, assoc: Assoc) -> usize {
        let mut delta: isize = 0;

        for change in &self.changes {
            if pos < change.from {
                break;
            }

            let inserted = change.insert.len() as isize;
            let removed = (change.to - change.from) as isize;

            if change.is_insertion() {
                if pos == change.from && assoc == Assoc::Before {
                    return shift(pos, delta);
                }
                delta += inserted;
                continue;
            }

            if pos >= change.to {
                delta += inserted - removed;
                continue;
            }

            let new_from = shift(change.from, delta);
            return match assoc {
                Assoc::Before => new_from,
                Assoc::After => new_from + change.insert.len(),
            };
        }

        shift(pos, delta)
    }
}

fn shift(pos: usize, delta: isize) -> usize {
    (pos as isize + delta).max(0) as usize
}
