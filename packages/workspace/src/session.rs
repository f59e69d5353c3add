//! One open document: local buffer, shared text, the binding between them,
//! and the host that owns the content.

use crate::binding::TextBinding;
use crate::crdt::{CrdtError, SharedText};
use marginalia_editor::{CommentRecord, Document, EditorError, ListenerId, RegisterReport};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Document already open: {0:?}")]
    AlreadyOpen(PathBuf),

    #[error("Document not open: {0:?}")]
    NotOpen(PathBuf),

    #[error("Shared text error: {0}")]
    Crdt(#[from] CrdtError),

    #[error("Editor error: {0}")]
    Editor(#[from] EditorError),
}

/// The application that owns a document's content and comment list.
///
/// `on_content_change` runs while the document is locked; it must not lock
/// the session's document again.
pub trait ContentHost: Send + Sync {
    fn content(&self) -> String;
    fn on_content_change(&self, text: &str);
    fn comments(&self) -> Vec<CommentRecord>;
}

pub struct DocumentSession {
    path: PathBuf,
    document: Arc<Mutex<Document>>,
    binding: TextBinding,
    host: Arc<dyn ContentHost>,
    listener: Option<ListenerId>,
}

impl std::fmt::Debug for DocumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSession")
            .field("path", &self.path)
            .field("binding", &self.binding)
            .finish()
    }
}

impl DocumentSession {
    /// Load the host's content, bind it to `shared` and protect the host's
    /// comments.
    pub fn open(
        path: impl Into<PathBuf>,
        host: Arc<dyn ContentHost>,
        shared: SharedText,
    ) -> Result<Self, SessionError> {
        let path = path.into();
        let document = Arc::new(Mutex::new(Document::new(host.content())));
        let binding = TextBinding::bind(shared, document.clone())?;

        let listener = {
            let mut doc = document.lock();
            let report = doc.refresh_comments(host.comments());
            if !report.rejected.is_empty() {
                tracing::warn!("{:?}: {} comments not protected", path, report.rejected.len());
            }

            let host = host.clone();
            doc.subscribe(move |event| host.on_content_change(event.text))
        };

        tracing::info!("Opened {:?}", path);
        Ok(Self {
            path,
            document,
            binding,
            host,
            listener: Some(listener),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Arc<Mutex<Document>> {
        &self.document
    }

    pub fn shared(&self) -> &SharedText {
        self.binding.shared()
    }

    pub fn binding(&self) -> &TextBinding {
        &self.binding
    }

    /// Re-read the host's comment list and rebuild the protected ranges.
    pub fn refresh_comments(&self) -> RegisterReport {
        let comments = self.host.comments();
        self.document.lock().refresh_comments(comments)
    }

    /// Stop syncing and release the host listener.
    pub fn close(mut self) {
        self.release();
        tracing::info!("Closed {:?}", self.path);
    }

    fn release(&mut self) {
        if let Some(id) = self.listener.take() {
            self.document.lock().unsubscribe(id);
        }
        self.binding.unbind();
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use marginalia_editor::UserAction;

    /// Host backed by an in-memory string.
    #[derive(Default)]
    pub(crate) struct MemoryHost {
        pub content: Mutex<String>,
        pub comments: Mutex<Vec<CommentRecord>>,
        pub changes: Mutex<usize>,
    }

    impl MemoryHost {
        pub(crate) fn new(content: &str, comments: Vec<CommentRecord>) -> Arc<Self> {
            Arc::new(Self {
                content: Mutex::new(content.to_string()),
                comments: Mutex::new(comments),
                changes: Mutex::new(0),
            })
        }
    }

    impl ContentHost for MemoryHost {
        fn content(&self) -> String {
            self.content.lock().clone()
        }

        fn on_content_change(&self, text: &str) {
            *self.content.lock() = text.to_string();
            *self.changes.lock() += 1;
        }

        fn comments(&self) -> Vec<CommentRecord> {
            self.comments.lock().clone()
        }
    }

    #[test]
    fn test_open_protects_host_comments() {
        let host = MemoryHost::new("a <!--c:1-->b<!--/c:1-->", vec![CommentRecord::new("1")]);
        let session = DocumentSession::open("notes.md", host.clone(), SharedText::new("content")).unwrap();

        assert_eq!(session.document().lock().ranges().len(), 1);
        assert_eq!(session.shared().get_text(), "a <!--c:1-->b<!--/c:1-->");
    }

    #[test]
    fn test_host_sees_local_and_remote_changes() {
        let host = MemoryHost::new("abc", vec![]);
        let session = DocumentSession::open("notes.md", host.clone(), SharedText::new("content")).unwrap();

        session.document().lock().dispatch(UserAction::Type("x".into())).unwrap();
        session.shared().edit_range("peer", 0, 0, ">").unwrap();

        assert_eq!(*host.content.lock(), ">xabc");
        assert_eq!(*host.changes.lock(), 2);
    }

    #[test]
    fn test_refresh_comments_follows_host() {
        let host = MemoryHost::new("<!--c:1-->b<!--/c:1-->", vec![]);
        let session = DocumentSession::open("notes.md", host.clone(), SharedText::new("content")).unwrap();
        assert!(session.document().lock().ranges().is_empty());

        host.comments.lock().push(CommentRecord::new("1"));
        let report = session.refresh_comments();
        assert_eq!(report.accepted, vec!["1".to_string()]);
    }

    #[test]
    fn test_close_unbinds() {
        let host = MemoryHost::new("abc", vec![]);
        let session = DocumentSession::open("notes.md", host.clone(), SharedText::new("content")).unwrap();
        let shared = session.shared().clone();
        session.close();

        shared.edit_range("peer", 0, 0, "z").unwrap();
        assert_eq!(*host.content.lock(), "abc");
    }
}
