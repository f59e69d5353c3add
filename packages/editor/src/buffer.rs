//! Local text buffer and selection.

use crate::change::{Assoc, ChangeError, ChangeSet, EditIntent};
use serde::{Deserialize, Serialize};

/// A single selection. `anchor == head` is a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn cursor(pos: usize) -> Self {
        Self {
            anchor: pos,
            head: pos,
        }
    }

    pub fn range(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    pub fn from(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn to(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }

    /// Carry the selection across a change.
    pub fn map(&self, changes: &ChangeSet) -> Self {
        if self.is_empty() {
            return Self::cursor(changes.map_pos(self.head, Assoc::After));
        }
        Self {
            anchor: changes.map_pos(self.anchor, Assoc::Before),
            head: changes.map_pos(self.head, Assoc::Before),
        }
    }
}

/// A change set plus the selection to install afterwards.
///
/// `selection` is in post-change coordinates. When absent, the current
/// selection is mapped through the changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub changes: ChangeSet,
    pub selection: Option<Selection>,
}

impl Transaction {
    pub fn new(changes: ChangeSet) -> Self {
        Self {
            changes,
            selection: None,
        }
    }

    pub fn single(intent: EditIntent) -> Self {
        Self::new(ChangeSet::single(intent))
    }

    pub fn selection_only(selection: Selection) -> Self {
        Self {
            changes: ChangeSet::empty(),
            selection: Some(selection),
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }
}

/// Owned document text with one selection.
#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    text: String,
    selection: Selection,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            selection: Selection::cursor(0),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Install a selection, clamped to the text and snapped to char boundaries.
    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = Selection {
            anchor: self.clamp(selection.anchor),
            head: self.clamp(selection.head),
        };
    }

    /// Apply a transaction. On error nothing changes.
    pub fn apply(&mut self, tr: &Transaction) -> Result<(), ChangeError> {
        tr.changes.apply(&mut self.text)?;
        let next = tr.selection.unwrap_or_else(|| self.selection.map(&tr.changes));
        self.set_selection(next);
        Ok(())
    }

    /// Byte offset of the character boundary before `pos`.
    pub fn prev_char_boundary(&self, pos: usize) -> usize {
        self.text[..pos.min(self.text.len())]
            .char_indices()
            .next_back()
            .map_or(0, |(idx, _)| idx)
    }

    /// Byte offset of the character boundary after `pos`.
    pub fn next_char_boundary(&self, pos: usize) -> usize {
        let pos = pos.min(self.text.len());
        self.text[pos..]
            .chars()
            .next()
            .map_or(pos, |c| pos + c.len_utf8())
    }

    fn clamp(&self, pos: usize) -> usize {
        let mut pos = pos.min(self.text.len());
        while !self.text.is_char_boundary(pos) {
            pos -= 1;
        }
        pos
    }
}
