//! # Edit Interceptor
//!
//! Sits between user input and the buffer. Every batch of edit intents is
//! checked against the protected ranges before it is applied; a batch that
//! touches a delimiter is replaced by a rewritten plan that leaves every
//! delimiter byte untouched.
//!
//! ## Rules
//!
//! - Intents that touch no delimiter pass through unmodified.
//! - A touched region is cut into sub-intervals around the delimiter spans.
//!   Pieces inside a delimiter are dropped, straddling pieces are clipped at
//!   the delimiter edge, and the inserted text goes into the first surviving
//!   piece only.
//! - A single backspace/delete of a delimiter character moves the cursor
//!   across the delimiter instead of deleting anything.
//! - Typing over a selection that touches a delimiter becomes two steps: the
//!   clipped deletion, then an insertion at wherever the cursor settled.
//! - A pure insertion strictly inside a delimiter is moved to the nearest
//!   legal edge.
//!
//! The interceptor is stateless: each call reads the tracker as it is now.
//! If the rewrite itself fails, the original batch is allowed through.

use crate::buffer::{Selection, TextBuffer, Transaction};
use crate::change::{Assoc, ChangeError, ChangeSet, EditIntent};
use crate::ranges::RangeTracker;
use std::ops::Range;
use thiserror::Error;

/// What produced an edit batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Typing,
    /// IME composition commit.
    Composition,
    Paste,
    DeleteBackward,
    DeleteForward,
    DeleteSelection,
    /// Multi-character replace not tied to a keystroke.
    Replace,
}

/// One step of a rewritten edit. Steps are applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedStep {
    Apply(Transaction),
    /// Insert at the cursor as it stands once the earlier steps are applied.
    InsertAtCursor(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Apply the batch as requested.
    Allow,
    /// Suppress the batch and run these steps instead.
    Rewrite(Vec<PlannedStep>),
}

impl Interception {
    fn relocate(cursor: usize) -> Self {
        Interception::Rewrite(vec![PlannedStep::Apply(Transaction::selection_only(
            Selection::cursor(cursor),
        ))])
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterceptError {
    #[error("edit {from}..{to} is outside the buffer (length {len})")]
    OutOfBounds { from: usize, to: usize, len: usize },

    #[error("edit offset {0} is not on a character boundary")]
    NotCharBoundary(usize),

    #[error("rewritten edit is inconsistent: {0}")]
    Compose(#[from] ChangeError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EditInterceptor;

impl EditInterceptor {
    pub fn new() -> Self {
        Self
    }

    /// Decide what to do with `intents`. Never blocks input: a failed
    /// rewrite degrades to [`Interception::Allow`].
    pub fn intercept(
        &self,
        tracker: &RangeTracker,
        buffer: &TextBuffer,
        kind: InputKind,
        intents: &[EditIntent],
    ) -> Interception {
        match self.adjust(tracker, buffer, kind, intents) {
            Ok(interception) => interception,
            Err(e) => {
                tracing::warn!("Edit adjustment failed, allowing original edit: {}", e);
                Interception::Allow
            }
        }
    }

    fn adjust(
        &self,
        tracker: &RangeTracker,
        buffer: &TextBuffer,
        kind: InputKind,
        intents: &[EditIntent],
    ) -> Result<Interception, InterceptError> {
        for intent in intents {
            check_intent(buffer, intent)?;
        }

        let touched = intents
            .iter()
            .any(|i| !tracker.delimiters_intersecting(i.from, i.to).is_empty());
        if !touched || tracker.is_empty() {
            return Ok(Interception::Allow);
        }

        if let [intent] = intents {
            let single_char = intent.insert.is_empty()
                && !intent.is_insertion()
                && buffer.next_char_boundary(intent.from) == intent.to;

            match kind {
                InputKind::DeleteBackward if single_char => {
                    let cursor = skip_delimiters_backward(tracker, buffer, intent.to);
                    tracing::debug!("Backspace into delimiter, cursor {} -> {}", intent.to, cursor);
                    return Ok(Interception::relocate(cursor));
                }
                InputKind::DeleteForward if single_char => {
                    let cursor = skip_delimiters_forward(tracker, buffer, intent.from);
                    tracing::debug!("Delete into delimiter, cursor {} -> {}", intent.from, cursor);
                    return Ok(Interception::relocate(cursor));
                }
                InputKind::Typing | InputKind::Composition
                    if !intent.is_insertion() && !intent.insert.is_empty() =>
                {
                    return self.delete_then_type(tracker, intent);
                }
                _ => {}
            }
        }

        self.rewrite_batch(tracker, intents)
    }

    /// Clipped deletion first, then the typed text at the settled cursor.
    fn delete_then_type(
        &self,
        tracker: &RangeTracker,
        intent: &EditIntent,
    ) -> Result<Interception, InterceptError> {
        let pieces = clip_around_delimiters(tracker, intent.from, intent.to);
        let anchor = pieces
            .first()
            .map_or_else(|| tracker.legal_position(intent.from), |p| p.start);

        let changes = ChangeSet::new(pieces.into_iter().map(|p| EditIntent::delete(p.start, p.end)))?;
        let cursor = changes.map_pos(anchor, Assoc::Before);

        Ok(Interception::Rewrite(vec![
            PlannedStep::Apply(Transaction::new(changes).with_selection(Selection::cursor(cursor))),
            PlannedStep::InsertAtCursor(intent.insert.clone()),
        ]))
    }

    fn rewrite_batch(
        &self,
        tracker: &RangeTracker,
        intents: &[EditIntent],
    ) -> Result<Interception, InterceptError> {
        let mut rewritten = Vec::new();
        let mut anchor = None;

        for intent in intents {
            if tracker.delimiters_intersecting(intent.from, intent.to).is_empty() {
                anchor = Some(intent.from);
                rewritten.push(intent.clone());
                continue;
            }

            if intent.is_insertion() {
                let at = tracker.legal_position(intent.from);
                anchor = Some(at);
                rewritten.push(EditIntent::insert(at, intent.insert.clone()));
                continue;
            }

            let pieces = clip_around_delimiters(tracker, intent.from, intent.to);
            match pieces.split_first() {
                Some((first, rest)) => {
                    anchor = Some(first.start);
                    rewritten.push(EditIntent::new(first.start, first.end, intent.insert.clone()));
                    rewritten.extend(rest.iter().map(|p| EditIntent::delete(p.start, p.end)));
                }
                None => {
                    // nothing deletable; keep any typed text at a legal edge
                    let at = tracker.legal_position(intent.from);
                    anchor = Some(at);
                    if !intent.insert.is_empty() {
                        rewritten.push(EditIntent::insert(at, intent.insert.clone()));
                    }
                }
            }
        }

        let changes = ChangeSet::new(rewritten)?;
        let cursor = anchor.map_or(0, |a| changes.map_pos(a, Assoc::After));

        if changes.is_empty() {
            return Ok(Interception::relocate(cursor));
        }
        Ok(Interception::Rewrite(vec![PlannedStep::Apply(
            Transaction::new(changes).with_selection(Selection::cursor(cursor)),
        )]))
    }
}

/// Cut `[from, to)` around every delimiter span it touches.
pub fn clip_around_delimiters(tracker: &RangeTracker, from: usize, to: usize) -> Vec<Range<usize>> {
    let mut pieces = Vec::new();
    let mut cursor = from;

    for delimiter in tracker.delimiters_intersecting(from, to) {
        if delimiter.start > cursor {
            pieces.push(cursor..delimiter.start.min(to));
        }
        cursor = cursor.max(delimiter.end);
    }
    if cursor < to {
        pieces.push(cursor..to);
    }
    pieces
}

fn skip_delimiters_backward(tracker: &RangeTracker, buffer: &TextBuffer, mut pos: usize) -> usize {
    while pos > 0 {
        let prev = buffer.prev_char_boundary(pos);
        match tracker.delimiter_at_byte(prev) {
            Some(delimiter) => pos = delimiter.start,
            None => break,
        }
    }
    pos
}

fn skip_delimiters_forward(tracker: &RangeTracker, buffer: &TextBuffer, mut pos: usize) -> usize {
    while pos < buffer.len() {
        match tracker.delimiter_at_byte(pos) {
            Some(delimiter) => pos = delimiter.end,
            None => break,
        }
    }
    pos
}

fn check_intent(buffer: &TextBuffer, intent: &EditIntent) -> Result<(), InterceptError> {
    let text = buffer.text();
    if intent.from > intent.to || intent.to > text.len() {
        return Err(InterceptError::OutOfBounds {
            from: intent.from,
            to: intent.to,
            len: text.len(),
        });
    }
    for pos in [intent.from, intent.to] {
        if !text.is_char_boundary(pos) {
            return Err(InterceptError::NotCharBoundary(pos));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranges::ProtectedRange;

    /// `<tag>hello</tag>` with the tags protected.
    fn fixture() -> (RangeTracker, TextBuffer) {
        let buffer = TextBuffer::new("<tag>hello</tag>");
        let mut tracker = RangeTracker::new();
        tracker.register(vec![ProtectedRange::new("c1", 0..5, 10..16)], buffer.text());
        (tracker, buffer)
    }

    fn run(buffer: &mut TextBuffer, interception: Interception, intents: &[EditIntent]) {
        match interception {
            Interception::Allow => {
                let changes = ChangeSet::new(intents.to_vec()).unwrap();
                buffer.apply(&Transaction::new(changes)).unwrap();
            }
            Interception::Rewrite(steps) => {
                for step in steps {
                    match step {
                        PlannedStep::Apply(tr) => buffer.apply(&tr).unwrap(),
                        PlannedStep::InsertAtCursor(text) => {
                            let at = buffer.selection().head;
                            buffer
                                .apply(&Transaction::single(EditIntent::insert(at, text)))
                                .unwrap();
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_unprotected_edit_is_allowed() {
        let (tracker, buffer) = fixture();
        let intents = [EditIntent::new(6, 8, "EE")];
        let result = EditInterceptor::new().intercept(&tracker, &buffer, InputKind::Replace, &intents);
        assert_eq!(result, Interception::Allow);
    }

    #[test]
    fn test_delete_spanning_both_delimiters_keeps_them() {
        let (tracker, mut buffer) = fixture();
        let intents = [EditIntent::delete(3, 12)];

        let result = EditInterceptor::new().intercept(&tracker, &buffer, InputKind::DeleteSelection, &intents);
        run(&mut buffer, result, &intents);

        assert_eq!(buffer.text(), "<tag></tag>");
        assert_eq!(buffer.selection(), Selection::cursor(5));
    }

    #[test]
    fn test_paste_over_straddling_selection_lands_in_first_piece() {
        let buffer = TextBuffer::new("ab<c>xy</c>cd");
        let mut tracker = RangeTracker::new();
        tracker.register(vec![ProtectedRange::new("c1", 2..5, 7..11)], buffer.text());
        let mut buffer = buffer;

        // select "b<c>x" and paste
        let intents = [EditIntent::new(1, 6, "PASTE")];
        let result = EditInterceptor::new().intercept(&tracker, &buffer, InputKind::Paste, &intents);
        run(&mut buffer, result, &intents);

        assert_eq!(buffer.text(), "aPASTE<c>y</c>cd");
        assert_eq!(buffer.selection(), Selection::cursor(6));
    }

    #[test]
    fn test_typing_over_protected_selection_is_two_steps() {
        let (tracker, mut buffer) = fixture();
        let intents = [EditIntent::new(7, 13, "Z")];

        let result = EditInterceptor::new().intercept(&tracker, &buffer, InputKind::Typing, &intents);
        let Interception::Rewrite(steps) = &result else {
            panic!("expected rewrite, got {result:?}");
        };
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1], PlannedStep::InsertAtCursor("Z".to_string()));

        run(&mut buffer, result, &intents);
        assert_eq!(buffer.text(), "<tag>heZ</tag>");
    }

    #[test]
    fn test_backspace_after_delimiter_moves_cursor() {
        let (tracker, mut buffer) = fixture();
        buffer.set_selection(Selection::cursor(5));

        let intents = [EditIntent::delete(4, 5)];
        let result = EditInterceptor::new().intercept(&tracker, &buffer, InputKind::DeleteBackward, &intents);
        run(&mut buffer, result, &intents);

        assert_eq!(buffer.text(), "<tag>hello</tag>");
        assert_eq!(buffer.selection(), Selection::cursor(0));
    }

    #[test]
    fn test_delete_before_delimiter_moves_cursor() {
        let (tracker, mut buffer) = fixture();
        buffer.set_selection(Selection::cursor(10));

        let intents = [EditIntent::delete(10, 11)];
        let result = EditInterceptor::new().intercept(&tracker, &buffer, InputKind::DeleteForward, &intents);
        run(&mut buffer, result, &intents);

        assert_eq!(buffer.text(), "<tag>hello</tag>");
        assert_eq!(buffer.selection(), Selection::cursor(16));
    }

    #[test]
    fn test_backspace_skips_adjacent_delimiters() {
        let buffer = TextBuffer::new("x<a></a><b>y</b>");
        let mut tracker = RangeTracker::new();
        tracker.register(
            vec![
                ProtectedRange::new("a", 1..4, 4..8),
                ProtectedRange::new("b", 8..11, 12..16),
            ],
            buffer.text(),
        );

        let intents = [EditIntent::delete(10, 11)];
        let result = EditInterceptor::new().intercept(&tracker, &buffer, InputKind::DeleteBackward, &intents);
        assert_eq!(result, Interception::relocate(1));
    }

    #[test]
    fn test_insertion_inside_delimiter_is_relocated() {
        let (tracker, mut buffer) = fixture();
        let intents = [EditIntent::insert(4, "!")];

        let result = EditInterceptor::new().intercept(&tracker, &buffer, InputKind::Typing, &intents);
        run(&mut buffer, result, &intents);

        assert_eq!(buffer.text(), "<tag>!hello</tag>");
        assert_eq!(buffer.selection(), Selection::cursor(6));
    }

    #[test]
    fn test_selection_inside_delimiter_only_relocates() {
        let (tracker, buffer) = fixture();
        let intents = [EditIntent::delete(11, 14)];

        let result = EditInterceptor::new().intercept(&tracker, &buffer, InputKind::DeleteSelection, &intents);
        // 11 is nearer the close tag's start
        assert_eq!(result, Interception::relocate(10));
    }

    #[test]
    fn test_invalid_intent_falls_back_to_allow() {
        let (tracker, buffer) = fixture();
        let intents = [EditIntent::delete(3, 99)];

        let result = EditInterceptor::new().intercept(&tracker, &buffer, InputKind::DeleteSelection, &intents);
        assert_eq!(result, Interception::Allow);
    }

    #[test]
    fn test_clip_around_delimiters() {
        let (tracker, _) = fixture();
        assert_eq!(clip_around_delimiters(&tracker, 3, 12), vec![5..10]);
        assert_eq!(clip_around_delimiters(&tracker, 0, 16), vec![5..10]);
        assert_eq!(clip_around_delimiters(&tracker, 6, 8), vec![6..8]);
        assert!(clip_around_delimiters(&tracker, 1, 4).is_empty());
    }
}
