//! # Decoration Projector
//!
//! Derives the visual overlay for a buffer from its protected ranges:
//!
//! - every delimiter gets a `Replace` decoration (rendered with zero width,
//!   but its offsets stay addressable for cursor motion and mapping);
//! - the content of an *unresolved* range gets a `Mark` highlight.
//!
//! Resolved ranges keep their delimiters hidden but get no highlight: the
//! annotation exists, it just no longer needs attention.

use crate::ranges::RangeTracker;
use serde::{Deserialize, Serialize};

pub const DELIMITER_CLASS: &str = "comment-delimiter";
pub const HIGHLIGHT_CLASS: &str = "comment-highlight";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecorationKind {
    /// Hidden delimiter span.
    Replace,
    /// Highlighted content span.
    Mark,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Decoration {
    pub from: usize,
    pub to: usize,
    pub kind: DecorationKind,
    pub range_id: String,
    pub class: &'static str,
}

/// Decorations ordered by start offset, delimiters first on ties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecorationSet {
    decorations: Vec<Decoration>,
}

impl DecorationSet {
    pub fn project(tracker: &RangeTracker) -> Self {
        let mut decorations = Vec::with_capacity(tracker.len() * 3);

        for range in tracker.iter() {
            for delimiter in range.delimiters() {
                decorations.push(Decoration {
                    from: delimiter.start,
                    to: delimiter.end,
                    kind: DecorationKind::Replace,
                    range_id: range.id.clone(),
                    class: DELIMITER_CLASS,
                });
            }

            let content = range.content();
            if !range.resolved && !content.is_empty() {
                decorations.push(Decoration {
                    from: content.start,
                    to: content.end,
                    kind: DecorationKind::Mark,
                    range_id: range.id.clone(),
                    class: HIGHLIGHT_CLASS,
                });
            }
        }

        // stable: equal keys keep tracker order
        decorations.sort_by_key(|d| (d.from, d.kind, d.to));
        Self { decorations }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Decoration> {
        self.decorations.iter()
    }

    pub fn len(&self) -> usize {
        self.decorations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decorations.is_empty()
    }

    /// Decorations overlapping the viewport `[from, to)`.
    pub fn in_viewport(&self, from: usize, to: usize) -> impl Iterator<Item = &Decoration> {
        self.decorations
            .iter()
            .filter(move |d| d.from < to && from < d.to)
    }

    /// Whether `pos` is hidden inside a replaced span.
    pub fn is_hidden(&self, pos: usize) -> bool {
        self.decorations
            .iter()
            .any(|d| d.kind == DecorationKind::Replace && d.from < pos && pos < d.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranges::ProtectedRange;

    fn tracker_with(ranges: Vec<ProtectedRange>) -> RangeTracker {
        let mut tracker = RangeTracker::new();
        tracker.register(ranges, &" ".repeat(100));
        tracker
    }

    #[test]
    fn test_unresolved_range_gets_highlight() {
        let tracker = tracker_with(vec![ProtectedRange::new("c1", 0..5, 10..16)]);
        let set = DecorationSet::project(&tracker);

        let kinds: Vec<_> = set.iter().map(|d| (d.from, d.to, d.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (0, 5, DecorationKind::Replace),
                (5, 10, DecorationKind::Mark),
                (10, 16, DecorationKind::Replace),
            ]
        );
    }

    #[test]
    fn test_resolved_range_only_hides_delimiters() {
        let tracker = tracker_with(vec![ProtectedRange::new("c1", 0..5, 10..16).resolved(true)]);
        let set = DecorationSet::project(&tracker);

        assert_eq!(set.len(), 2);
        assert!(set.iter().all(|d| d.kind == DecorationKind::Replace));
    }

    #[test]
    fn test_empty_content_has_no_mark() {
        let tracker = tracker_with(vec![ProtectedRange::new("c1", 0..5, 5..10)]);
        let set = DecorationSet::project(&tracker);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_adjacent_ranges_keep_offset_order() {
        // a's close ends where b's open starts; b has empty content
        let tracker = tracker_with(vec![
            ProtectedRange::new("a", 0..2, 4..6),
            ProtectedRange::new("b", 6..8, 8..10),
        ]);
        let set = DecorationSet::project(&tracker);
        let order: Vec<_> = set.iter().map(|d| (d.range_id.as_str(), d.from, d.kind)).collect();
        assert_eq!(
            order,
            vec![
                ("a", 0, DecorationKind::Replace),
                ("a", 2, DecorationKind::Mark),
                ("a", 4, DecorationKind::Replace),
                ("b", 6, DecorationKind::Replace),
                ("b", 8, DecorationKind::Replace),
            ]
        );
    }

    #[test]
    fn test_projection_is_idempotent() {
        let ranges = vec![
            ProtectedRange::new("a", 0..5, 10..15),
            ProtectedRange::new("b", 20..25, 30..35).resolved(true),
        ];
        let mut tracker = RangeTracker::new();

        let text = " ".repeat(40);
        tracker.register(ranges.clone(), &text);
        let first = DecorationSet::project(&tracker);
        tracker.register(ranges, &text);
        let second = DecorationSet::project(&tracker);

        assert_eq!(first, second);
    }

    #[test]
    fn test_is_hidden() {
        let tracker = tracker_with(vec![ProtectedRange::new("c1", 0..5, 10..16)]);
        let set = DecorationSet::project(&tracker);

        assert!(set.is_hidden(3));
        assert!(!set.is_hidden(5));
        assert!(!set.is_hidden(7));
        assert!(set.is_hidden(12));
        assert_eq!(set.in_viewport(6, 8).count(), 1);
    }
}
