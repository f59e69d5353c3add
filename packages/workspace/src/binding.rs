//! # Replicated-Text Binding
//!
//! Keeps one local [`Document`] and one [`SharedText`] equal.
//!
//! ```text
//! Document commit ──listener──► diff vs last text ──► SharedText (own origin)
//! SharedText commit ──observer──► (not own origin) ──► Document::apply_remote_text
//! ```
//!
//! Each direction flips the binding's [`BindingState`] while it runs, and the
//! other direction does nothing unless the state is `Idle`. Writes carry the
//! binding's own transaction origin, so the observer also recognises them.

use crate::crdt::{CrdtError, SharedText};
use marginalia_editor::{compute_patch, Document, ListenerId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use yrs::Subscription;

static NEXT_BINDING: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Idle,
    /// Forwarding a document change to the shared text.
    ApplyingLocal,
    /// Writing a shared-text change into the document.
    ApplyingRemote,
}

#[derive(Debug)]
struct BindingInner {
    state: BindingState,
    /// Text both sides agreed on after the last sync.
    last_text: String,
}

pub struct TextBinding {
    origin: String,
    shared: SharedText,
    document: Arc<Mutex<Document>>,
    inner: Arc<Mutex<BindingInner>>,
    listener: Option<ListenerId>,
    subscription: Option<Subscription>,
}

impl std::fmt::Debug for TextBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextBinding")
            .field("origin", &self.origin)
            .field("state", &self.state())
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl TextBinding {
    /// Bind `document` to `shared` and bring them to the same text.
    ///
    /// An empty shared text is seeded from the document; otherwise the
    /// document adopts the shared text.
    pub fn bind(shared: SharedText, document: Arc<Mutex<Document>>) -> Result<Self, CrdtError> {
        let origin = format!(
            "binding-{}-{}",
            shared.client_id(),
            NEXT_BINDING.fetch_add(1, Ordering::Relaxed)
        );

        let shared_text = shared.get_text();
        let local_text = document.lock().text().to_string();
        let last_text = if shared_text.is_empty() && !local_text.is_empty() {
            tracing::debug!("Seeding shared text from document ({} bytes)", local_text.len());
            shared.edit_range(&origin, 0, 0, &local_text)?;
            local_text
        } else {
            document.lock().apply_remote_text(&shared_text)?;
            shared_text
        };

        let inner = Arc::new(Mutex::new(BindingInner {
            state: BindingState::Idle,
            last_text,
        }));

        let subscription = shared.observe({
            let origin = origin.clone();
            let inner = inner.clone();
            let document = document.clone();
            move |change| {
                if change.is_from(&origin) {
                    return;
                }
                {
                    let mut inner = inner.lock();
                    if inner.state != BindingState::Idle {
                        tracing::warn!("Shared text changed during {:?}, skipping", inner.state);
                        return;
                    }
                    inner.state = BindingState::ApplyingRemote;
                    inner.last_text = change.text.clone();
                }

                if let Err(e) = document.lock().apply_remote_text(&change.text) {
                    tracing::error!("Failed to apply shared text to document: {}", e);
                }
                inner.lock().state = BindingState::Idle;
            }
        });

        let listener = document.lock().subscribe({
            let origin = origin.clone();
            let inner = inner.clone();
            let shared = shared.clone();
            move |event| {
                let (patch, previous) = {
                    let mut inner = inner.lock();
                    if inner.state != BindingState::Idle {
                        return;
                    }
                    let Some(patch) = compute_patch(&inner.last_text, event.text) else {
                        return;
                    };
                    inner.state = BindingState::ApplyingLocal;
                    let previous = std::mem::replace(&mut inner.last_text, event.text.to_string());
                    (patch, previous)
                };

                let result = shared.apply_patch(&origin, &patch);

                let mut inner = inner.lock();
                if let Err(e) = result {
                    tracing::error!("Failed to forward document change to shared text: {}", e);
                    // retry the whole difference on the next change
                    inner.last_text = previous;
                }
                inner.state = BindingState::Idle;
            }
        });

        tracing::info!("Bound document to shared text {:?} as {}", shared.name(), origin);
        Ok(Self {
            origin,
            shared,
            document,
            inner,
            listener: Some(listener),
            subscription: Some(subscription),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn state(&self) -> BindingState {
        self.inner.lock().state
    }

    pub fn is_bound(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn shared(&self) -> &SharedText {
        &self.shared
    }

    /// Stop syncing in both directions. Safe to call twice.
    pub fn unbind(&mut self) {
        if let Some(id) = self.listener.take() {
            self.document.lock().unsubscribe(id);
        }
        if self.subscription.take().is_some() {
            tracing::info!("Unbound {}", self.origin);
        }
    }
}

impl Drop for TextBinding {
    fn drop(&mut self) {
        self.unbind();
    }
}
