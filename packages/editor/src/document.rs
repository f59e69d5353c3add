//! # Document Handle
//!
//! A Document is one open buffer and everything scoped to it: the text and
//! selection, the protected comment ranges, the decorations derived from
//! them, and the listeners interested in content changes.
//!
//! ## Mutation paths
//!
//! ```text
//! dispatch(UserAction)      → interceptor → commit(User)
//! apply_programmatic(tr)    →               commit(Programmatic)
//! apply_remote_text(text)   → single hunk → commit(Remote)
//! ```
//!
//! Every commit remaps the protected ranges, regenerates decorations and
//! notifies listeners, whichever path it came from.

use crate::buffer::{Selection, TextBuffer, Transaction};
use crate::change::{Assoc, ChangeSet, EditIntent};
use crate::comments::{CommentRecord, TagSyntax};
use crate::completion::{Completion, CompletionContext};
use crate::decorations::DecorationSet;
use crate::diff::compute_patch;
use crate::errors::EditorError;
use crate::interceptor::{EditInterceptor, InputKind, Interception, PlannedStep};
use crate::ranges::{ProtectedRange, RangeTracker, RegisterReport};

/// Where a committed change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Keyboard, IME, clipboard; went through the interceptor.
    User,
    /// Editor commands such as adding or removing a comment.
    Programmatic,
    /// Merged text arriving from the shared document.
    Remote,
}

/// Passed to listeners after every content change.
#[derive(Debug)]
pub struct DocumentEvent<'a> {
    pub text: &'a str,
    pub changes: &'a ChangeSet,
    pub origin: ChangeOrigin,
    pub version: u64,
}

pub type ListenerId = u64;

type Listener = Box<dyn FnMut(&DocumentEvent<'_>) + Send>;

/// An edit request from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    Type(String),
    /// IME composition commit.
    Compose(String),
    Paste(String),
    DeleteBackward,
    DeleteForward,
    DeleteSelection,
    Replace { from: usize, to: usize, text: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// The interceptor replaced the requested edit.
    pub rewritten: bool,
    /// The text changed.
    pub changed: bool,
}

pub struct Document {
    /// Increments on every content change
    pub version: u64,

    buffer: TextBuffer,
    ranges: RangeTracker,
    decorations: DecorationSet,
    interceptor: EditInterceptor,
    syntax: TagSyntax,
    comments: Vec<CommentRecord>,
    dirty: bool,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: ListenerId,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version)
            .field("len", &self.buffer.len())
            .field("ranges", &self.ranges.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_syntax(text, TagSyntax::default())
    }

    pub fn with_syntax(text: impl Into<String>, syntax: TagSyntax) -> Self {
        Self {
            version: 0,
            buffer: TextBuffer::new(text),
            ranges: RangeTracker::new(),
            decorations: DecorationSet::default(),
            interceptor: EditInterceptor::new(),
            syntax,
            comments: Vec::new(),
            dirty: false,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn text(&self) -> &str {
        self.buffer.text()
    }

    pub fn selection(&self) -> Selection {
        self.buffer.selection()
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.buffer.set_selection(selection);
    }

    pub fn ranges(&self) -> &RangeTracker {
        &self.ranges
    }

    pub fn decorations(&self) -> &DecorationSet {
        &self.decorations
    }

    pub fn comments(&self) -> &[CommentRecord] {
        &self.comments
    }

    pub fn syntax(&self) -> &TagSyntax {
        &self.syntax
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark document as clean (content has been persisted).
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Register a content-change listener.
    pub fn subscribe(&mut self, listener: impl FnMut(&DocumentEvent<'_>) + Send + 'static) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Run a user edit through the interceptor and apply the result.
    pub fn dispatch(&mut self, action: UserAction) -> Result<DispatchOutcome, EditorError> {
        let (kind, intents) = self.intents_for(action);
        let Some(primary) = intents.last().cloned() else {
            return Ok(DispatchOutcome::default());
        };

        let version = self.version;
        let interception = self
            .interceptor
            .intercept(&self.ranges, &self.buffer, kind, &intents);

        let rewritten = match interception {
            Interception::Allow => {
                let changes = ChangeSet::new(intents)?;
                let cursor = changes.map_pos(primary.from, Assoc::After);
                self.commit(
                    Transaction::new(changes).with_selection(Selection::cursor(cursor)),
                    ChangeOrigin::User,
                )?;
                false
            }
            Interception::Rewrite(steps) => {
                for step in steps {
                    match step {
                        PlannedStep::Apply(tr) => self.commit(tr, ChangeOrigin::User)?,
                        PlannedStep::InsertAtCursor(text) => {
                            let at = self.buffer.selection().head;
                            let cursor = at + text.len();
                            self.commit(
                                Transaction::single(EditIntent::insert(at, text))
                                    .with_selection(Selection::cursor(cursor)),
                                ChangeOrigin::User,
                            )?;
                        }
                    }
                }
                true
            }
        };

        Ok(DispatchOutcome {
            rewritten,
            changed: self.version != version,
        })
    }

    /// Apply a transaction without interception.
    pub fn apply_programmatic(&mut self, tr: Transaction) -> Result<(), EditorError> {
        self.commit(tr, ChangeOrigin::Programmatic)
    }

    /// Bring the buffer to `text` with a direct single-hunk replace.
    ///
    /// Only the differing region is touched, so ranges and the selection
    /// outside of it survive. Returns whether anything changed.
    pub fn apply_remote_text(&mut self, text: &str) -> Result<bool, EditorError> {
        match compute_patch(self.buffer.text(), text) {
            Some(patch) => {
                self.commit(Transaction::single(patch.to_intent()), ChangeOrigin::Remote)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace the protected range set with `snapshot`.
    pub fn register_ranges(&mut self, snapshot: Vec<ProtectedRange>) -> RegisterReport {
        let report = self.ranges.register(snapshot, self.buffer.text());
        self.decorations = DecorationSet::project(&self.ranges);
        report
    }

    pub fn clear_ranges(&mut self) {
        self.ranges.clear();
        self.decorations = DecorationSet::project(&self.ranges);
    }

    /// Rebuild the protected ranges from the host's comment list.
    pub fn refresh_comments(&mut self, records: Vec<CommentRecord>) -> RegisterReport {
        let snapshot = self.syntax.snapshot(self.buffer.text(), &records);
        self.comments = records;
        self.register_ranges(snapshot)
    }

    /// Wrap `from..to` in a new comment and protect it.
    pub fn add_comment(&mut self, id: &str, from: usize, to: usize) -> Result<(), EditorError> {
        if !TagSyntax::is_valid_id(id) {
            return Err(EditorError::InvalidCommentId(id.to_string()));
        }
        if self.comments.iter().any(|c| c.id == id) || self.ranges.get(id).is_some() {
            return Err(EditorError::DuplicateComment(id.to_string()));
        }
        let (from, to) = (from.min(to), from.max(to));
        for pos in [from, to] {
            if self.ranges.legal_position(pos) != pos {
                return Err(EditorError::InsideDelimiter(pos));
            }
        }
        if let Some(other) = self
            .ranges
            .iter()
            .find(|r| r.open_start < to && from < r.close_end)
        {
            return Err(EditorError::OverlappingComment {
                id: id.to_string(),
                other: other.id.clone(),
            });
        }

        let changes = self.syntax.wrap(id, from, to)?;
        let cursor = changes.map_pos(to, Assoc::After);
        self.commit(
            Transaction::new(changes).with_selection(Selection::cursor(cursor)),
            ChangeOrigin::Programmatic,
        )?;

        let mut records = std::mem::take(&mut self.comments);
        records.push(CommentRecord::new(id));
        self.refresh_comments(records);
        tracing::debug!("Added comment {} at {}..{}", id, from, to);
        Ok(())
    }

    /// Strip a comment's tags, keeping its content.
    pub fn remove_comment(&mut self, id: &str) -> Result<(), EditorError> {
        let range = self
            .ranges
            .get(id)
            .cloned()
            .ok_or_else(|| EditorError::CommentNotFound(id.to_string()))?;
        let changes = self.syntax.strip(&range)?;

        let remaining: Vec<ProtectedRange> = self.ranges.iter().filter(|r| r.id != id).cloned().collect();
        self.ranges.register(remaining, self.buffer.text());
        self.commit(Transaction::new(changes), ChangeOrigin::Programmatic)?;

        self.comments.retain(|c| c.id != id);
        Ok(())
    }

    /// Flip a comment's resolution state; changes only its decorations.
    pub fn set_comment_resolved(&mut self, id: &str, resolved: bool) -> Result<(), EditorError> {
        let record = self
            .comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| EditorError::CommentNotFound(id.to_string()))?;
        record.resolved = resolved;

        let records = self.comments.clone();
        self.refresh_comments(records);
        Ok(())
    }

    pub fn completion_context(&self) -> CompletionContext<'_> {
        CompletionContext::new(self.buffer.text(), self.buffer.selection().head, &self.ranges)
    }

    /// Accepting a completion is a user edit and goes through the interceptor.
    pub fn accept_completion(&mut self, completion: &Completion) -> Result<DispatchOutcome, EditorError> {
        self.dispatch(UserAction::Replace {
            from: completion.replace.start,
            to: completion.replace.end,
            text: completion.label.clone(),
        })
    }

    fn intents_for(&self, action: UserAction) -> (InputKind, Vec<EditIntent>) {
        let selection = self.buffer.selection();
        let whole_selection = || {
            if selection.is_empty() {
                vec![]
            } else {
                vec![EditIntent::delete(selection.from(), selection.to())]
            }
        };

        match action {
            UserAction::Type(text) => (
                InputKind::Typing,
                vec![EditIntent::new(selection.from(), selection.to(), text)],
            ),
            UserAction::Compose(text) => (
                InputKind::Composition,
                vec![EditIntent::new(selection.from(), selection.to(), text)],
            ),
            UserAction::Paste(text) => (
                InputKind::Paste,
                vec![EditIntent::new(selection.from(), selection.to(), text)],
            ),
            UserAction::DeleteSelection => (InputKind::DeleteSelection, whole_selection()),
            UserAction::DeleteBackward if !selection.is_empty() => {
                (InputKind::DeleteSelection, whole_selection())
            }
            UserAction::DeleteForward if !selection.is_empty() => {
                (InputKind::DeleteSelection, whole_selection())
            }
            UserAction::DeleteBackward => {
                let head = selection.head;
                if head == 0 {
                    return (InputKind::DeleteBackward, vec![]);
                }
                let prev = self.buffer.prev_char_boundary(head);
                (InputKind::DeleteBackward, vec![EditIntent::delete(prev, head)])
            }
            UserAction::DeleteForward => {
                let head = selection.head;
                if head >= self.buffer.len() {
                    return (InputKind::DeleteForward, vec![]);
                }
                let next = self.buffer.next_char_boundary(head);
                (InputKind::DeleteForward, vec![EditIntent::delete(head, next)])
            }
            UserAction::Replace { from, to, text } => {
                (InputKind::Replace, vec![EditIntent::new(from, to, text)])
            }
        }
    }

    fn commit(&mut self, tr: Transaction, origin: ChangeOrigin) -> Result<(), EditorError> {
        self.buffer.apply(&tr)?;
        if tr.changes.is_empty() {
            return Ok(());
        }

        self.ranges.remap(&tr.changes);
        self.decorations = DecorationSet::project(&self.ranges);
        self.version += 1;
        self.dirty = true;

        let event = DocumentEvent {
            text: self.buffer.text(),
            changes: &tr.changes,
            origin,
            version: self.version,
        };
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
        Ok(())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(String::new())
    }
}
