//! Inline completion.
//!
//! Sources never reach for "the active editor": every query gets a
//! [`CompletionContext`] borrowed from the document being edited.

use crate::ranges::RangeTracker;
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::Range;

/// Read-only view of one document at the cursor.
#[derive(Debug, Clone, Copy)]
pub struct CompletionContext<'a> {
    pub text: &'a str,
    pub cursor: usize,
    pub ranges: &'a RangeTracker,
}

impl<'a> CompletionContext<'a> {
    pub fn new(text: &'a str, cursor: usize, ranges: &'a RangeTracker) -> Self {
        Self { text, cursor, ranges }
    }

    /// Span of the word immediately before the cursor.
    pub fn word_range(&self) -> Range<usize> {
        let cursor = self.cursor.min(self.text.len());
        let start = self.text[..cursor]
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_word_char(*c))
            .last()
            .map_or(cursor, |(idx, _)| idx);
        start..cursor
    }

    pub fn prefix(&self) -> &'a str {
        &self.text[self.word_range()]
    }

    /// Completing inside a delimiter would write into protected text.
    pub fn is_protected(&self) -> bool {
        self.ranges.legal_position(self.cursor) != self.cursor
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub label: String,
    /// Bytes to replace when the completion is accepted.
    pub replace: Range<usize>,
}

pub trait CompletionSource: Send + Sync {
    fn complete(&self, ctx: &CompletionContext<'_>) -> Vec<Completion>;
}

/// Offers words already present in the buffer outside any delimiter.
#[derive(Debug, Clone)]
pub struct BufferWords {
    pub min_prefix: usize,
    pub limit: usize,
}

impl Default for BufferWords {
    fn default() -> Self {
        Self {
            min_prefix: 2,
            limit: 20,
        }
    }
}

impl CompletionSource for BufferWords {
    fn complete(&self, ctx: &CompletionContext<'_>) -> Vec<Completion> {
        if ctx.is_protected() {
            return Vec::new();
        }
        let replace = ctx.word_range();
        let prefix = ctx.prefix();
        if prefix.chars().count() < self.min_prefix {
            return Vec::new();
        }

        let mut words = BTreeSet::new();
        let mut start = None;
        for (idx, c) in ctx.text.char_indices().chain([(ctx.text.len(), ' ')]) {
            match (start, is_word_char(c)) {
                (None, true) => start = Some(idx),
                (Some(s), false) => {
                    start = None;
                    let word = &ctx.text[s..idx];
                    if s == replace.start
                        || word.len() <= prefix.len()
                        || !word.starts_with(prefix)
                        || !ctx.ranges.delimiters_intersecting(s, idx).is_empty()
                    {
                        continue;
                    }
                    words.insert(word);
                }
                _ => {}
            }
        }

        words
            .into_iter()
            .take(self.limit)
            .map(|word| Completion {
                label: word.to_string(),
                replace: replace.clone(),
            })
            .collect()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranges::ProtectedRange;

    #[test]
    fn test_prefix_before_cursor() {
        let tracker = RangeTracker::new();
        let ctx = CompletionContext::new("hello wor", 9, &tracker);
        assert_eq!(ctx.word_range(), 6..9);
        assert_eq!(ctx.prefix(), "wor");

        let ctx = CompletionContext::new("hello ", 6, &tracker);
        assert_eq!(ctx.prefix(), "");
    }

    #[test]
    fn test_buffer_words() {
        let tracker = RangeTracker::new();
        let text = "protect protocol prototype pro";
        let ctx = CompletionContext::new(text, text.len(), &tracker);

        let labels: Vec<_> = BufferWords::default()
            .complete(&ctx)
            .into_iter()
            .map(|c| c.label)
            .collect();
        assert_eq!(labels, vec!["protect", "protocol", "prototype"]);
    }

    #[test]
    fn test_tag_words_are_not_offered() {
        let text = "<!--c:abc-->ab<!--/c:abc--> ab";
        let mut tracker = RangeTracker::new();
        tracker.register(vec![ProtectedRange::new("abc", 0..12, 14..27)], text);

        let ctx = CompletionContext::new(text, text.len(), &tracker);
        assert!(BufferWords::default().complete(&ctx).is_empty());
    }

    #[test]
    fn test_no_completion_inside_delimiter() {
        let text = "<tag>text</tag> te";
        let mut tracker = RangeTracker::new();
        tracker.register(vec![ProtectedRange::new("t", 0..5, 9..15)], text);

        let ctx = CompletionContext::new(text, 3, &tracker);
        assert!(ctx.is_protected());
        assert!(BufferWords::default().complete(&ctx).is_empty());
    }
}
