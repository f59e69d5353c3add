//! # Protected-Range Tracker
//!
//! Keeps the protected spans of one buffer: an open delimiter, a content
//! region and a close delimiter per range.
//!
//! Ranges live in a flat arena; a separate index keeps arena slots sorted by
//! `open_start`. Because registered ranges never overlap, the same order also
//! sorts them by `close_end`, which is what makes binary search over the index
//! valid for interval queries.
//!
//! The set is replaced wholesale by [`RangeTracker::register`] whenever the
//! host's comment list changes and carried through every buffer edit by
//! [`RangeTracker::remap`].

use crate::change::{Assoc, ChangeSet};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// One protected span: `[open_start, open_end)` and `[close_start, close_end)`
/// are immutable delimiters, `[open_end, close_start)` is editable content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtectedRange {
    pub id: String,
    pub open_start: usize,
    pub open_end: usize,
    pub close_start: usize,
    pub close_end: usize,
    #[serde(default)]
    pub resolved: bool,
}

impl ProtectedRange {
    pub fn new(id: impl Into<String>, open: Range<usize>, close: Range<usize>) -> Self {
        Self {
            id: id.into(),
            open_start: open.start,
            open_end: open.end,
            close_start: close.start,
            close_end: close.end,
            resolved: false,
        }
    }

    pub fn resolved(mut self, resolved: bool) -> Self {
        self.resolved = resolved;
        self
    }

    /// `open_start < open_end <= close_start < close_end`
    pub fn is_well_formed(&self) -> bool {
        self.open_start < self.open_end
            && self.open_end <= self.close_start
            && self.close_start < self.close_end
    }

    pub fn open(&self) -> Range<usize> {
        self.open_start..self.open_end
    }

    pub fn close(&self) -> Range<usize> {
        self.close_start..self.close_end
    }

    pub fn content(&self) -> Range<usize> {
        self.open_end..self.close_start
    }

    pub fn span(&self) -> Range<usize> {
        self.open_start..self.close_end
    }

    pub fn offsets(&self) -> [usize; 4] {
        [self.open_start, self.open_end, self.close_start, self.close_end]
    }

    pub fn delimiters(&self) -> [Range<usize>; 2] {
        [self.open(), self.close()]
    }

    /// The delimiter strictly containing `pos`, if any.
    pub fn delimiter_containing(&self, pos: usize) -> Option<Range<usize>> {
        self.delimiters()
            .into_iter()
            .find(|d| d.start < pos && pos < d.end)
    }

    fn overlaps(&self, other: &ProtectedRange) -> bool {
        self.open_start < other.close_end && other.open_start < self.close_end
    }
}

/// Why a candidate range was not registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Inverted,
    OutOfBounds,
    NotCharBoundary(usize),
    DuplicateId,
    Overlaps(String),
}

/// Outcome of one [`RangeTracker::register`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterReport {
    pub accepted: Vec<String>,
    pub rejected: Vec<(String, Rejection)>,
}

/// Sorted, non-overlapping set of protected ranges for one buffer.
#[derive(Debug, Clone, Default)]
pub struct RangeTracker {
    arena: Vec<ProtectedRange>,
    order: Vec<usize>,
}

impl RangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set with `snapshot`.
    ///
    /// Candidates are validated in input order against `text`. A candidate
    /// that is inverted, out of bounds, splits a character, repeats an
    /// accepted id or overlaps an accepted range is skipped without affecting
    /// the others.
    pub fn register(&mut self, snapshot: Vec<ProtectedRange>, text: &str) -> RegisterReport {
        let mut report = RegisterReport::default();
        let mut accepted: Vec<ProtectedRange> = Vec::with_capacity(snapshot.len());

        for candidate in snapshot {
            let rejection = if !candidate.is_well_formed() {
                Some(Rejection::Inverted)
            } else if candidate.close_end > text.len() {
                Some(Rejection::OutOfBounds)
            } else if let Some(offset) = candidate
                .offsets()
                .into_iter()
                .find(|&offset| !text.is_char_boundary(offset))
            {
                Some(Rejection::NotCharBoundary(offset))
            } else if accepted.iter().any(|existing| existing.id == candidate.id) {
                Some(Rejection::DuplicateId)
            } else {
                accepted
                    .iter()
                    .find(|existing| existing.overlaps(&candidate))
                    .map(|existing| Rejection::Overlaps(existing.id.clone()))
            };

            match rejection {
                Some(reason) => {
                    tracing::warn!(
                        "Rejecting protected range {}: {:?} ({}..{} / {}..{})",
                        candidate.id,
                        reason,
                        candidate.open_start,
                        candidate.open_end,
                        candidate.close_start,
                        candidate.close_end
                    );
                    report.rejected.push((candidate.id, reason));
                }
                None => {
                    report.accepted.push(candidate.id.clone());
                    accepted.push(candidate);
                }
            }
        }

        self.arena = accepted;
        self.reindex();
        tracing::debug!("Registered {} protected ranges", self.arena.len());
        report
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Ranges in ascending `open_start` order.
    pub fn iter(&self) -> impl Iterator<Item = &ProtectedRange> + '_ {
        self.order.iter().map(move |&slot| &self.arena[slot])
    }

    pub fn get(&self, id: &str) -> Option<&ProtectedRange> {
        self.arena.iter().find(|r| r.id == id)
    }

    /// Carry every range through `changes` in one pass.
    ///
    /// Delimiter edges stick outward, content edges stick inward. A range
    /// whose delimiters were damaged (length changed) or whose invariant no
    /// longer holds is dropped.
    pub fn remap(&mut self, changes: &ChangeSet) {
        if changes.is_empty() || self.arena.is_empty() {
            return;
        }

        let before = self.arena.len();
        self.arena.retain_mut(|range| {
            let open_len = range.open_end - range.open_start;
            let close_len = range.close_end - range.close_start;

            range.open_start = changes.map_pos(range.open_start, Assoc::After);
            range.open_end = changes.map_pos(range.open_end, Assoc::Before);
            range.close_start = changes.map_pos(range.close_start, Assoc::After);
            range.close_end = changes.map_pos(range.close_end, Assoc::Before);

            let intact = range.is_well_formed()
                && range.open_end - range.open_start == open_len
                && range.close_end - range.close_start == close_len;
            if !intact {
                tracing::warn!("Dropping protected range {} after edit damaged it", range.id);
            }
            intact
        });

        if self.arena.len() != before {
            self.reindex();
        }
    }

    /// Ranges whose full span touches `[from, to]`.
    pub fn ranges_intersecting(&self, from: usize, to: usize) -> Vec<&ProtectedRange> {
        let start = self.order.partition_point(|&slot| self.arena[slot].close_end < from);
        self.order[start..]
            .iter()
            .map(|&slot| &self.arena[slot])
            .take_while(|r| r.open_start <= to)
            .collect()
    }

    /// Delimiter spans touched by the edit region `[from, to)`, ascending.
    ///
    /// A non-empty region touches a delimiter when they share at least one
    /// byte. An empty region (pure insertion point) touches a delimiter only
    /// when strictly inside it; delimiter edges are legal insertion points.
    pub fn delimiters_intersecting(&self, from: usize, to: usize) -> Vec<Range<usize>> {
        self.ranges_intersecting(from, to)
            .into_iter()
            .flat_map(|r| r.delimiters())
            .filter(|d| {
                if from == to {
                    d.start < from && from < d.end
                } else {
                    from < d.end && d.start < to
                }
            })
            .collect()
    }

    /// The delimiter span containing the byte at `pos`, if any.
    pub fn delimiter_at_byte(&self, pos: usize) -> Option<Range<usize>> {
        self.ranges_intersecting(pos, pos)
            .into_iter()
            .flat_map(|r| r.delimiters())
            .find(|d| d.start <= pos && pos < d.end)
    }

    /// Snap `pos` out of any delimiter it sits strictly inside.
    ///
    /// Goes to the nearer edge; on a tie, to the edge facing the content.
    pub fn legal_position(&self, pos: usize) -> usize {
        for range in self.ranges_intersecting(pos, pos) {
            if let Some(d) = range.delimiter_containing(pos) {
                let to_start = pos - d.start;
                let to_end = d.end - pos;
                let toward_content = if d.start == range.open_start { d.end } else { d.start };
                return match to_start.cmp(&to_end) {
                    std::cmp::Ordering::Less => d.start,
                    std::cmp::Ordering::Greater => d.end,
                    std::cmp::Ordering::Equal => toward_content,
                };
            }
        }
        pos
    }

    fn reindex(&mut self) {
        self.order = (0..self.arena.len()).collect();
        let arena = &self.arena;
        self.order.sort_by_key(|&slot| arena[slot].open_start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::EditIntent;

    fn tag(id: &str, open: Range<usize>, close: Range<usize>) -> ProtectedRange {
        ProtectedRange::new(id, open, close)
    }

    fn blank(len: usize) -> String {
        " ".repeat(len)
    }

    #[test]
    fn test_register_sorts_ranges() {
        let mut tracker = RangeTracker::new();
        let report = tracker.register(vec![tag("b", 20..25, 30..35), tag("a", 0..5, 10..15)], &blank(40));

        assert_eq!(report.accepted, vec!["b", "a"]);
        let ids: Vec<_> = tracker.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_register_rejects_invalid_ranges() {
        let mut tracker = RangeTracker::new();
        let report = tracker.register(
            vec![
                tag("ok", 0..5, 10..15),
                tag("inverted", 30..25, 40..45),
                tag("overlap", 12..14, 16..18),
                tag("too-long", 50..55, 60..70),
                tag("ok2", 20..22, 22..24),
            ],
            &blank(64),
        );

        assert_eq!(report.accepted, vec!["ok", "ok2"]);
        assert_eq!(
            report.rejected,
            vec![
                ("inverted".to_string(), Rejection::Inverted),
                ("overlap".to_string(), Rejection::Overlaps("ok".to_string())),
                ("too-long".to_string(), Rejection::OutOfBounds),
            ]
        );
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_register_rejects_offsets_inside_characters() {
        let text = "é<t>x</t>";
        let mut tracker = RangeTracker::new();
        let report = tracker.register(vec![tag("split", 1..5, 6..10)], text);

        assert!(report.accepted.is_empty());
        assert_eq!(
            report.rejected,
            vec![("split".to_string(), Rejection::NotCharBoundary(1))]
        );

        let report = tracker.register(vec![tag("whole", 2..5, 6..10)], text);
        assert_eq!(report.accepted, vec!["whole"]);
    }

    #[test]
    fn test_register_rejects_duplicate_ids() {
        let mut tracker = RangeTracker::new();
        let report = tracker.register(vec![tag("a", 0..5, 10..15), tag("a", 20..25, 30..35)], &blank(40));

        assert_eq!(report.accepted, vec!["a"]);
        assert_eq!(report.rejected, vec![("a".to_string(), Rejection::DuplicateId)]);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.get("a").unwrap().open(), 0..5);
    }

    #[test]
    fn test_register_replaces_previous_set() {
        let mut tracker = RangeTracker::new();
        tracker.register(vec![tag("a", 0..5, 10..15)], &blank(20));
        tracker.register(vec![tag("b", 1..2, 3..4)], &blank(20));

        assert!(tracker.get("a").is_none());
        assert!(tracker.get("b").is_some());
    }

    #[test]
    fn test_remap_typing_in_content() {
        let mut tracker = RangeTracker::new();
        tracker.register(vec![tag("a", 0..5, 10..16)], &blank(16));

        // typing at the very start of the content stays inside the range
        tracker.remap(&ChangeSet::single(EditIntent::insert(5, "xx")));
        let range = tracker.get("a").unwrap();
        assert_eq!((range.open_start, range.open_end), (0, 5));
        assert_eq!((range.close_start, range.close_end), (12, 18));

        // typing at the very end of the content too
        tracker.remap(&ChangeSet::single(EditIntent::insert(12, "y")));
        let range = tracker.get("a").unwrap();
        assert_eq!(range.content(), 5..13);
    }

    #[test]
    fn test_remap_typing_outside_edges() {
        let mut tracker = RangeTracker::new();
        tracker.register(vec![tag("a", 2..4, 6..8)], &blank(10));

        tracker.remap(&ChangeSet::new([EditIntent::insert(2, "<"), EditIntent::insert(8, ">")]).unwrap());
        let range = tracker.get("a").unwrap();
        assert_eq!(range.open(), 3..5);
        assert_eq!(range.close(), 7..9);
    }

    #[test]
    fn test_remap_drops_damaged_range() {
        let mut tracker = RangeTracker::new();
        tracker.register(vec![tag("a", 0..5, 10..15), tag("b", 20..25, 30..35)], &blank(40));

        // programmatic edit eating half of a's close delimiter
        tracker.remap(&ChangeSet::single(EditIntent::delete(8, 12)));

        assert!(tracker.get("a").is_none());
        let b = tracker.get("b").unwrap();
        assert_eq!(b.open(), 16..21);
    }

    #[test]
    fn test_remap_empties_content() {
        let mut tracker = RangeTracker::new();
        tracker.register(vec![tag("a", 0..5, 10..15)], &blank(15));

        tracker.remap(&ChangeSet::single(EditIntent::delete(5, 10)));
        let range = tracker.get("a").unwrap();
        assert_eq!(range.content(), 5..5);
        assert!(range.is_well_formed());
    }

    #[test]
    fn test_delimiters_intersecting() {
        let mut tracker = RangeTracker::new();
        tracker.register(vec![tag("a", 0..5, 10..15), tag("b", 20..25, 30..35)], &blank(40));

        assert_eq!(tracker.delimiters_intersecting(3, 12), vec![0..5, 10..15]);
        assert!(tracker.delimiters_intersecting(5, 10).is_empty());
        assert!(tracker.delimiters_intersecting(15, 20).is_empty());
        assert_eq!(tracker.delimiters_intersecting(14, 21), vec![10..15, 20..25]);

        // insertion points
        assert!(tracker.delimiters_intersecting(5, 5).is_empty());
        assert!(tracker.delimiters_intersecting(0, 0).is_empty());
        assert_eq!(tracker.delimiters_intersecting(2, 2), vec![0..5]);
    }

    #[test]
    fn test_ranges_intersecting_uses_full_span() {
        let mut tracker = RangeTracker::new();
        tracker.register(vec![tag("a", 0..5, 10..15), tag("b", 20..25, 30..35)], &blank(40));

        let hit: Vec<_> = tracker.ranges_intersecting(7, 8).iter().map(|r| r.id.clone()).collect();
        assert_eq!(hit, vec!["a"]);
        let hit: Vec<_> = tracker.ranges_intersecting(15, 20).iter().map(|r| r.id.clone()).collect();
        assert_eq!(hit, vec!["a", "b"]);
        assert!(tracker.ranges_intersecting(36, 40).is_empty());
    }

    #[test]
    fn test_legal_position() {
        let mut tracker = RangeTracker::new();
        tracker.register(vec![tag("a", 0..4, 10..14)], &blank(20));

        assert_eq!(tracker.legal_position(1), 0);
        assert_eq!(tracker.legal_position(3), 4);
        assert_eq!(tracker.legal_position(2), 4); // tie goes to the content
        assert_eq!(tracker.legal_position(12), 10); // tie goes to the content
        assert_eq!(tracker.legal_position(13), 14);
        assert_eq!(tracker.legal_position(7), 7);
    }
}
