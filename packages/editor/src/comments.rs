//! # Comment Tags
//!
//! Inline comments are stored in the document text as a pair of tags around
//! the commented span:
//!
//! ```text
//! before <!--c:42-->commented text<!--/c:42--> after
//! ```
//!
//! The host owns the comment list (ids, resolution state, bodies); the text
//! owns the positions. A protected-range snapshot is built by scanning the
//! text for tag pairs and joining them with the host's records.

use crate::change::{ChangeError, ChangeSet, EditIntent};
use crate::ranges::ProtectedRange;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One entry of the host's comment list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: String,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl CommentRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resolved: false,
            author: None,
            body: None,
        }
    }

    pub fn resolved(mut self) -> Self {
        self.resolved = true;
        self
    }
}

/// A tag pair found in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPair {
    pub id: String,
    pub open: std::ops::Range<usize>,
    pub close: std::ops::Range<usize>,
}

/// Tag spelling: `{open_prefix}{id}{suffix}` ... `{close_prefix}{id}{suffix}`.
#[derive(Debug, Clone)]
pub struct TagSyntax {
    open_prefix: String,
    close_prefix: String,
    suffix: String,
    pattern: Regex,
}

impl TagSyntax {
    pub fn new(
        open_prefix: impl Into<String>,
        close_prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let open_prefix = open_prefix.into();
        let close_prefix = close_prefix.into();
        let suffix = suffix.into();

        let pattern = Regex::new(&format!(
            "(?:(?P<close>{})|{})(?P<id>[A-Za-z0-9_-]+){}",
            regex::escape(&close_prefix),
            regex::escape(&open_prefix),
            regex::escape(&suffix),
        ))?;

        Ok(Self {
            open_prefix,
            close_prefix,
            suffix,
            pattern,
        })
    }

    pub fn open_tag(&self, id: &str) -> String {
        format!("{}{}{}", self.open_prefix, id, self.suffix)
    }

    pub fn close_tag(&self, id: &str) -> String {
        format!("{}{}{}", self.close_prefix, id, self.suffix)
    }

    pub fn is_valid_id(id: &str) -> bool {
        !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    /// Every well-formed tag pair in `text`, ordered by open tag.
    ///
    /// An open tag pairs with the first later close tag carrying the same id.
    /// Unpaired tags are skipped.
    pub fn scan(&self, text: &str) -> Vec<TagPair> {
        let mut pending: Vec<(String, std::ops::Range<usize>)> = Vec::new();
        let mut pairs = Vec::new();

        for caps in self.pattern.captures_iter(text) {
            let (Some(whole), Some(id)) = (caps.get(0), caps.name("id")) else {
                continue;
            };
            let id = id.as_str();

            if caps.name("close").is_none() {
                pending.push((id.to_string(), whole.range()));
                continue;
            }

            match pending.iter().position(|(open_id, _)| open_id == id) {
                Some(idx) => {
                    let (id, open) = pending.remove(idx);
                    pairs.push(TagPair {
                        id,
                        open,
                        close: whole.range(),
                    });
                }
                None => tracing::debug!("Close tag for comment {} has no open tag", id),
            }
        }

        for (id, _) in &pending {
            tracing::debug!("Open tag for comment {} is never closed", id);
        }

        pairs.sort_by_key(|p| p.open.start);
        pairs
    }

    /// Protected ranges for the comments in `records` that are tagged in `text`.
    pub fn snapshot(&self, text: &str, records: &[CommentRecord]) -> Vec<ProtectedRange> {
        self.scan(text)
            .into_iter()
            .filter_map(|pair| {
                let record = records.iter().find(|r| r.id == pair.id);
                if record.is_none() {
                    tracing::debug!("Tagged comment {} is not in the comment list", pair.id);
                }
                record.map(|r| ProtectedRange::new(pair.id, pair.open, pair.close).resolved(r.resolved))
            })
            .collect()
    }

    /// Changes that wrap `from..to` in a new comment's tags.
    pub fn wrap(&self, id: &str, from: usize, to: usize) -> Result<ChangeSet, ChangeError> {
        let open = self.open_tag(id);
        let close = self.close_tag(id);
        if from == to {
            return Ok(ChangeSet::single(EditIntent::insert(from, open + &close)));
        }
        ChangeSet::new([EditIntent::insert(from, open), EditIntent::insert(to, close)])
    }

    /// Changes that remove a comment's tags and keep its content.
    pub fn strip(&self, range: &ProtectedRange) -> Result<ChangeSet, ChangeError> {
        ChangeSet::new([
            EditIntent::delete(range.open_start, range.open_end),
            EditIntent::delete(range.close_start, range.close_end),
        ])
    }
}

impl Default for TagSyntax {
    fn default() -> Self {
        Self::new("<!--c:", "<!--/c:", "-->").expect("built-in comment tag pattern is valid")
    }
}
