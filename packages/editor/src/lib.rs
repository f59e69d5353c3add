//! # Marginalia Editor
//!
//! Local text editing core: a buffer whose inline comment tags are protected
//! from direct user edits.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ UserAction                                  │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ EditInterceptor: allow or rewrite           │
//! │  - never splits or deletes a delimiter      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ TextBuffer: apply ChangeSet + selection     │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ RangeTracker.remap → DecorationSet::project │
//! │ → document listeners                        │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Byte offsets**: every position is a UTF-8 byte offset on a char boundary
//! 2. **Text owns positions**: comment records carry ids, tags in the text carry positions
//! 3. **Decorations are derived**: rebuilt from the tracker after every change
//! 4. **Never block input**: a failed rewrite lets the original edit through
//!
//! ## Usage
//!
//! ```rust,ignore
//! use marginalia_editor::{CommentRecord, Document, Selection, UserAction};
//!
//! let mut doc = Document::new("say <!--c:1-->hello<!--/c:1-->");
//! doc.refresh_comments(vec![CommentRecord::new("1")]);
//!
//! doc.set_selection(Selection::range(0, doc.text().len()));
//! doc.dispatch(UserAction::DeleteSelection)?;
//! assert_eq!(doc.text(), "<!--c:1--><!--/c:1-->");
//! ```

mod buffer;
mod change;
mod comments;
mod completion;
mod decorations;
mod diff;
mod document;
mod errors;
mod interceptor;
mod ranges;

pub use buffer::{Selection, TextBuffer, Transaction};
pub use change::{Assoc, ChangeError, ChangeSet, EditIntent};
pub use comments::{CommentRecord, TagPair, TagSyntax};
pub use completion::{BufferWords, Completion, CompletionContext, CompletionSource};
pub use decorations::{Decoration, DecorationKind, DecorationSet, DELIMITER_CLASS, HIGHLIGHT_CLASS};
pub use diff::{compute_patch, TextPatch};
pub use document::{ChangeOrigin, DispatchOutcome, Document, DocumentEvent, ListenerId, UserAction};
pub use errors::EditorError;
pub use interceptor::{clip_around_delimiters, EditInterceptor, InputKind, InterceptError, Interception, PlannedStep};
pub use ranges::{ProtectedRange, RangeTracker, RegisterReport, Rejection};
