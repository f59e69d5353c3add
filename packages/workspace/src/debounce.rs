//! Debounced persistence of document content.
//!
//! Content-change notifications arrive on every edit; the sink is only
//! called once the content has been quiet for the configured period, with
//! the latest content. Sink failures are logged and never reach the edit path.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub trait ContentSink: Send + Sync + 'static {
    fn persist(&self, content: &str) -> anyhow::Result<()>;
}

/// Writes content to a file, replacing it.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ContentSink for FileSink {
    fn persist(&self, content: &str) -> anyhow::Result<()> {
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        tracing::debug!("Persisted {} bytes to {:?}", content.len(), self.path);
        Ok(())
    }
}

/// Cheap handle for queueing content from synchronous callbacks.
#[derive(Debug, Clone)]
pub struct SaveHandle {
    sender: mpsc::UnboundedSender<String>,
}

impl SaveHandle {
    pub fn notify(&self, content: impl Into<String>) {
        if self.sender.send(content.into()).is_err() {
            tracing::debug!("Save debouncer already stopped");
        }
    }
}

pub struct SaveDebouncer {
    handle: SaveHandle,
    task: JoinHandle<()>,
}

impl SaveDebouncer {
    /// Start the debouncing task. Must be called inside a tokio runtime.
    pub fn spawn(sink: Arc<dyn ContentSink>, quiet: Duration) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();

        let task = tokio::spawn(async move {
            while let Some(mut latest) = receiver.recv().await {
                let mut closed = false;
                loop {
                    match tokio::time::timeout(quiet, receiver.recv()).await {
                        Ok(Some(next)) => latest = next,
                        Ok(None) => {
                            closed = true;
                            break;
                        }
                        Err(_) => break,
                    }
                }

                if let Err(e) = sink.persist(&latest) {
                    tracing::error!("Failed to persist content: {:#}", e);
                }
                if closed {
                    break;
                }
            }
        });

        Self {
            handle: SaveHandle { sender },
            task,
        }
    }

    pub fn handle(&self) -> SaveHandle {
        self.handle.clone()
    }

    pub fn notify(&self, content: impl Into<String>) {
        self.handle.notify(content);
    }

    /// Flush pending content and stop. Outstanding [`SaveHandle`]s must be
    /// dropped first, or this waits for them.
    pub async fn shutdown(self) {
        drop(self.handle);
        if let Err(e) = self.task.await {
            tracing::error!("Save debouncer task failed: {}", e);
        }
    }
}
