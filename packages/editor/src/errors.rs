//! Error types for the editor

use crate::change::ChangeError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditorError {
    #[error("Invalid edit: {0}")]
    Change(#[from] ChangeError),

    #[error("Invalid comment id: {0:?}")]
    InvalidCommentId(String),

    #[error("Comment already exists: {0}")]
    DuplicateComment(String),

    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    #[error("Comment {id} would overlap comment {other}")]
    OverlappingComment { id: String, other: String },

    #[error("Offset {0} falls inside a protected delimiter")]
    InsideDelimiter(usize),
}
