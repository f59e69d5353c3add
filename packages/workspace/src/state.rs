use crate::config::SyncConfig;
use crate::crdt::SharedText;
use crate::session::{ContentHost, DocumentSession, SessionError};
use marginalia_editor::RegisterReport;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Open documents, keyed by path
pub struct WorkspaceState {
    config: SyncConfig,
    sessions: HashMap<PathBuf, DocumentSession>,
}

impl WorkspaceState {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Open `path` on a fresh shared text.
    pub fn open_document(
        &mut self,
        path: impl Into<PathBuf>,
        host: Arc<dyn ContentHost>,
    ) -> Result<&DocumentSession, SessionError> {
        let shared = SharedText::with_client_id(&self.config.text_name, self.config.client_id);
        self.open_shared(path, host, shared)
    }

    /// Open `path` on an existing shared text (joining a session).
    pub fn open_shared(
        &mut self,
        path: impl Into<PathBuf>,
        host: Arc<dyn ContentHost>,
        shared: SharedText,
    ) -> Result<&DocumentSession, SessionError> {
        let path = path.into();
        if self.sessions.contains_key(&path) {
            return Err(SessionError::AlreadyOpen(path));
        }

        let session = DocumentSession::open(path.clone(), host, shared)?;
        Ok(&*self.sessions.entry(path).or_insert(session))
    }

    pub fn close_document(&mut self, path: &Path) -> Result<(), SessionError> {
        let session = self
            .sessions
            .remove(path)
            .ok_or_else(|| SessionError::NotOpen(path.to_path_buf()))?;
        session.close();
        Ok(())
    }

    pub fn refresh_comments(&self, path: &Path) -> Result<RegisterReport, SessionError> {
        self.get(path)
            .map(DocumentSession::refresh_comments)
            .ok_or_else(|| SessionError::NotOpen(path.to_path_buf()))
    }

    // Get current session (for queries)
    pub fn get(&self, path: &Path) -> Option<&DocumentSession> {
        self.sessions.get(path)
    }

    pub fn open_paths(&self) -> impl Iterator<Item = &Path> {
        self.sessions.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
