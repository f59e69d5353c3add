//! # Foreign-Surface Adapter
//!
//! Connects an editing surface that only speaks full snapshots (an embedded
//! diagram editor) to a [`SharedText`].
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──init──► Synced ──destroy()──► Destroyed
//!                          │  ▲
//!                          └──┘ save / autosave / export / cursorPosition
//! ```
//!
//! Snapshots coming from the surface are never written as a full replace:
//! the adapter diffs them against the shared text and applies one patch, so
//! concurrent edits elsewhere in the document survive. Changes made by
//! anyone else are pushed back to the surface as `merge` messages.

use crate::channel::MessageChannel;
use crate::config::SyncConfig;
use crate::crdt::{CrdtError, SharedText};
use crate::presence::{CursorInfo, PresenceStore, RemoteCursor};
use crate::protocol::{InboundMessage, OutboundMessage};
use marginalia_editor::compute_patch;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use yrs::Subscription;

static NEXT_ADAPTER: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Message channel closed: {0}")]
    ChannelClosed(String),

    #[error("Surface has not sent init yet")]
    NotSynced,

    #[error("Adapter was destroyed")]
    Destroyed,

    #[error("Export timed out after {0:?}")]
    ExportTimeout(Duration),

    #[error("Export request was cancelled")]
    ExportCancelled,

    #[error("Shared text error: {0}")]
    Crdt(#[from] CrdtError),
}

/// Decides whether a snapshot from the surface is safe to merge.
pub trait SnapshotValidator: Send + Sync {
    fn is_valid(&self, snapshot: &str) -> bool;
}

/// Accepts a diagram file whose root element is `mxfile` or `mxGraphModel`
/// and is properly closed, or an empty diagram.
#[derive(Debug, Clone)]
pub struct DiagramXmlValidator {
    root: Regex,
}

impl Default for DiagramXmlValidator {
    fn default() -> Self {
        Self {
            root: Regex::new(r"^(?:<\?xml[^>]*\?>\s*)?<(mxfile|mxGraphModel)(?:\s[^>]*?)?(/?)>")
                .expect("diagram root pattern is valid"),
        }
    }
}

impl SnapshotValidator for DiagramXmlValidator {
    fn is_valid(&self, snapshot: &str) -> bool {
        let snapshot = snapshot.trim();
        if snapshot.is_empty() {
            return true;
        }
        let Some(caps) = self.root.captures(snapshot) else {
            return false;
        };
        let (Some(open), Some(name)) = (caps.get(0), caps.get(1)) else {
            return false;
        };
        let self_closing = caps.get(2).is_some_and(|m| !m.as_str().is_empty());

        if self_closing {
            open.end() == snapshot.len()
        } else {
            snapshot.ends_with(&format!("</{}>", name.as_str()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    Synced,
    Destroyed,
}

#[derive(Debug)]
struct AdapterInner {
    state: AdapterState,
    /// Last snapshot the surface and the shared text agreed on.
    last_snapshot: Option<String>,
    /// Seeds the shared text on first `init` if nobody else has.
    pending_initial: Option<String>,
    pending_export: Option<oneshot::Sender<String>>,
    /// Bumped on every `init`; the relay resends cursors when it changes.
    loads: u64,
}

pub struct ForeignSurfaceAdapter<V: SnapshotValidator = DiagramXmlValidator> {
    origin: String,
    allowed_origin: String,
    export_timeout: Duration,
    presence_interval: Duration,
    presence_max_age: Duration,
    shared: SharedText,
    channel: Arc<dyn MessageChannel>,
    validator: V,
    presence: Arc<Mutex<PresenceStore>>,
    inner: Arc<Mutex<AdapterInner>>,
    subscription: Option<Subscription>,
    relay: Option<JoinHandle<()>>,
}

impl ForeignSurfaceAdapter<DiagramXmlValidator> {
    pub fn new(
        shared: SharedText,
        channel: Arc<dyn MessageChannel>,
        presence: Arc<Mutex<PresenceStore>>,
        config: &SyncConfig,
    ) -> Self {
        Self::with_validator(shared, channel, presence, config, DiagramXmlValidator::default())
    }
}

impl<V: SnapshotValidator> ForeignSurfaceAdapter<V> {
    pub fn with_validator(
        shared: SharedText,
        channel: Arc<dyn MessageChannel>,
        presence: Arc<Mutex<PresenceStore>>,
        config: &SyncConfig,
        validator: V,
    ) -> Self {
        let origin = format!(
            "surface-{}-{}",
            shared.client_id(),
            NEXT_ADAPTER.fetch_add(1, Ordering::Relaxed)
        );
        presence.lock().set_local_user(config.user.clone());

        let inner = Arc::new(Mutex::new(AdapterInner {
            state: AdapterState::Uninitialized,
            last_snapshot: None,
            pending_initial: None,
            pending_export: None,
            loads: 0,
        }));

        let subscription = shared.observe({
            let origin = origin.clone();
            let inner = inner.clone();
            let channel = channel.clone();
            move |change| {
                if change.is_from(&origin) {
                    return;
                }
                {
                    let mut inner = inner.lock();
                    if inner.state != AdapterState::Synced {
                        return;
                    }
                    inner.last_snapshot = Some(change.text.clone());
                }
                if let Err(e) = channel.post(OutboundMessage::Merge {
                    xml: change.text.clone(),
                }) {
                    tracing::warn!("Failed to push merged content to surface: {}", e);
                }
            }
        });

        Self {
            origin,
            allowed_origin: config.allowed_origin.clone(),
            export_timeout: config.export_timeout(),
            presence_interval: config.presence_interval(),
            presence_max_age: config.presence_max_age(),
            shared,
            channel,
            validator,
            presence,
            inner,
            subscription: Some(subscription),
            relay: None,
        }
    }

    pub fn state(&self) -> AdapterState {
        self.inner.lock().state
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn last_snapshot(&self) -> Option<String> {
        self.inner.lock().last_snapshot.clone()
    }

    pub fn presence(&self) -> &Arc<Mutex<PresenceStore>> {
        &self.presence
    }

    /// Snapshot to seed the shared text with if it is still empty at `init`.
    pub fn set_initial_snapshot(&self, snapshot: impl Into<String>) {
        self.inner.lock().pending_initial = Some(snapshot.into());
    }

    /// Handle one message from the surface.
    ///
    /// Messages from any origin other than the configured one are dropped.
    pub fn handle_message(&self, origin: &str, payload: &str) -> Result<(), AdapterError> {
        let state = self.state();
        if state == AdapterState::Destroyed {
            tracing::debug!("Ignoring message after destroy");
            return Ok(());
        }
        if origin != self.allowed_origin {
            tracing::warn!("Dropping message from untrusted origin {}", origin);
            return Ok(());
        }

        let message = InboundMessage::parse(payload).map_err(|e| {
            tracing::warn!("Ignoring malformed surface message: {}", e);
            AdapterError::Malformed(e)
        })?;

        match message {
            InboundMessage::Init => self.on_init(),
            InboundMessage::Save { xml } => self.on_save(&xml, false),
            InboundMessage::Autosave { xml } => self.on_save(&xml, true),
            InboundMessage::Export { data, format } => {
                let pending = self.inner.lock().pending_export.take();
                match pending {
                    Some(sender) => {
                        if sender.send(data).is_err() {
                            tracing::debug!("Export requester went away");
                        }
                    }
                    None => tracing::debug!("Unsolicited export ({:?}) ignored", format),
                }
                Ok(())
            }
            InboundMessage::CursorPosition { x, y, cell_id } => {
                self.presence.lock().set_local_cursor(CursorInfo::at(x, y, cell_id));
                Ok(())
            }
        }
    }

    fn on_init(&self) -> Result<(), AdapterError> {
        let pending = self.inner.lock().pending_initial.take();
        if let Some(initial) = pending {
            if !self.shared.is_empty() {
                tracing::debug!("Shared text already seeded, discarding initial snapshot");
            } else if !self.validator.is_valid(&initial) {
                tracing::warn!("Initial snapshot is not a valid diagram, not seeding");
            } else {
                self.shared.edit_range(&self.origin, 0, 0, &initial)?;
                tracing::info!("Seeded shared text from initial snapshot ({} bytes)", initial.len());
            }
        }

        let text = self.shared.get_text();
        {
            let mut inner = self.inner.lock();
            if inner.state == AdapterState::Synced {
                tracing::debug!("Surface reloaded, pushing content again");
            }
            inner.state = AdapterState::Synced;
            inner.last_snapshot = Some(text.clone());
            inner.loads += 1;
        }
        self.channel.post(OutboundMessage::load(text))
    }

    fn on_save(&self, snapshot: &str, autosave: bool) -> Result<(), AdapterError> {
        let last = {
            let inner = self.inner.lock();
            if inner.state != AdapterState::Synced {
                tracing::warn!("Save before init ignored");
                return Err(AdapterError::NotSynced);
            }
            inner.last_snapshot.clone()
        };

        if !self.validator.is_valid(snapshot) {
            tracing::warn!("Surface sent an invalid snapshot, restoring last good state");
            let xml = last.unwrap_or_else(|| self.shared.get_text());
            return self.channel.post(OutboundMessage::Merge { xml });
        }

        if last.as_deref() == Some(snapshot) {
            tracing::debug!("Snapshot unchanged, nothing to merge");
            return Ok(());
        }

        let current = self.shared.get_text();
        if let Some(patch) = compute_patch(&current, snapshot) {
            tracing::debug!(
                "Merging surface snapshot: replace {}..{} with {} bytes",
                patch.offset,
                patch.offset + patch.delete_len,
                patch.insert.len()
            );
            self.shared.apply_patch(&self.origin, &patch)?;
        }
        self.inner.lock().last_snapshot = Some(snapshot.to_string());

        self.channel.post(OutboundMessage::Status {
            message: if autosave { "Autosaved" } else { "Saved" }.to_string(),
            modified: false,
        })
    }

    /// Ask the surface to export the current diagram as `format`.
    ///
    /// A newer request cancels an older one still waiting.
    pub async fn request_export(&self, format: &str) -> Result<String, AdapterError> {
        let receiver = {
            let mut inner = self.inner.lock();
            match inner.state {
                AdapterState::Destroyed => return Err(AdapterError::Destroyed),
                AdapterState::Uninitialized => return Err(AdapterError::NotSynced),
                AdapterState::Synced => {}
            }
            let (sender, receiver) = oneshot::channel();
            inner.pending_export = Some(sender);
            receiver
        };

        self.channel.post(OutboundMessage::Export {
            format: format.to_string(),
        })?;

        match tokio::time::timeout(self.export_timeout, receiver).await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(_)) => Err(AdapterError::ExportCancelled),
            Err(_) => {
                tracing::warn!("Export ({}) timed out after {:?}", format, self.export_timeout);
                self.inner.lock().pending_export = None;
                Err(AdapterError::ExportTimeout(self.export_timeout))
            }
        }
    }

    /// Push other participants' cursors to the surface once.
    pub fn relay_presence(&self) -> Result<usize, AdapterError> {
        relay_once(&self.presence, self.channel.as_ref(), &mut None)
    }

    /// Push cursors on every presence interval until destroyed.
    ///
    /// Each tick first drops remote cursors older than the configured maximum
    /// age. Unchanged cursor lists are skipped, except after the surface
    /// reloads. Must be called from inside a tokio runtime.
    pub fn start_presence_relay(&mut self) {
        if self.relay.is_some() || self.state() == AdapterState::Destroyed {
            return;
        }
        let presence = self.presence.clone();
        let channel = self.channel.clone();
        let inner = self.inner.clone();
        let period = self.presence_interval;
        let max_age_ms = i64::try_from(self.presence_max_age.as_millis()).unwrap_or(i64::MAX);

        self.relay = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut last_sent = None;
            let mut seen_loads = 0;
            loop {
                ticker.tick().await;

                let loads = inner.lock().loads;
                if loads != seen_loads {
                    seen_loads = loads;
                    last_sent = None;
                }

                let now = chrono::Utc::now().timestamp_millis();
                let pruned = presence.lock().prune_stale(now, max_age_ms);
                if pruned > 0 {
                    tracing::debug!("Dropped {} stale remote cursors", pruned);
                }

                if let Err(e) = relay_once(&presence, channel.as_ref(), &mut last_sent) {
                    tracing::warn!("Presence relay failed: {}", e);
                }
            }
        }));
    }

    /// Release the observer, the relay task and any pending export, and
    /// clear local presence. Later messages are ignored.
    pub fn destroy(&mut self) {
        let pending = {
            let mut inner = self.inner.lock();
            if inner.state == AdapterState::Destroyed {
                return;
            }
            inner.state = AdapterState::Destroyed;
            inner.pending_initial = None;
            inner.pending_export.take()
        };
        drop(pending);

        self.subscription = None;
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }
        self.presence.lock().clear_local();
        tracing::info!("Destroyed surface adapter {}", self.origin);
    }
}

impl<V: SnapshotValidator> Drop for ForeignSurfaceAdapter<V> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Post the current remote cursors unless they equal `last_sent`.
fn relay_once(
    presence: &Mutex<PresenceStore>,
    channel: &dyn MessageChannel,
    last_sent: &mut Option<Vec<RemoteCursor>>,
) -> Result<usize, AdapterError> {
    let cursors = presence.lock().remote_cursors();
    if last_sent.as_ref() == Some(&cursors) {
        return Ok(0);
    }
    let count = cursors.len();
    *last_sent = Some(cursors.clone());
    channel.post(OutboundMessage::UpdateRemoteCursors { cursors })?;
    Ok(count)
}
