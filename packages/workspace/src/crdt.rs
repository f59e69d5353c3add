//! Shared text object for collaborative editing.
//!
//! Wraps a Yjs-compatible `yrs` document holding one named text. Every
//! participant surface (local buffer binding, foreign-surface adapter) writes
//! through its own transaction origin so observers can tell their own writes
//! from everyone else's.
//!
//! The document is created with byte offsets, so offsets produced by the
//! editor buffer are valid here unchanged.

use marginalia_editor::{EditorError, TextPatch};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Doc, GetString, Observable, OffsetKind, Options, Origin, ReadTxn, StateVector, Subscription,
    Text, TextRef, Transact, Update,
};

/// One committed change to the shared text, as seen by an observer.
#[derive(Debug)]
pub struct SharedChange<'a> {
    /// Full text after the transaction.
    pub text: String,
    origin: Option<&'a Origin>,
}

impl SharedChange<'_> {
    /// Whether the transaction was tagged with `origin`.
    pub fn is_from(&self, origin: &str) -> bool {
        self.origin.is_some_and(|o| *o == Origin::from(origin))
    }

    /// Changes without an origin come from decoded remote updates.
    pub fn is_remote_update(&self) -> bool {
        self.origin.is_none()
    }
}

/// A replicated text. Cloning yields another handle to the same document.
#[derive(Clone)]
pub struct SharedText {
    doc: Doc,
    text: TextRef,
    name: String,
}

impl std::fmt::Debug for SharedText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedText")
            .field("name", &self.name)
            .field("client_id", &self.client_id())
            .finish()
    }
}

impl SharedText {
    /// Create an empty shared text with a random client id.
    pub fn new(name: &str) -> Self {
        Self::with_client_id(name, None)
    }

    pub fn with_client_id(name: &str, client_id: Option<u64>) -> Self {
        let mut options = Options {
            offset_kind: OffsetKind::Bytes,
            ..Options::default()
        };
        if let Some(id) = client_id {
            options.client_id = id;
        }

        let doc = Doc::with_options(options);
        let text = doc.get_or_insert_text(name);
        Self {
            doc,
            text,
            name: name.to_string(),
        }
    }

    /// Create a shared text with initial content.
    pub fn with_content(name: &str, content: &str) -> Self {
        let shared = Self::new(name);
        {
            let mut txn = shared.doc.transact_mut();
            shared.text.insert(&mut txn, 0, content);
        }
        shared
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client_id(&self) -> u64 {
        self.doc.client_id()
    }

    /// Get the current text content.
    ///
    /// Must not be called from inside an observer; observers get the text
    /// in [`SharedChange`].
    pub fn get_text(&self) -> String {
        let txn = self.doc.transact();
        self.text.get_string(&txn)
    }

    pub fn len(&self) -> usize {
        let txn = self.doc.transact();
        self.text.len(&txn) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the current state vector (for delta sync).
    pub fn get_state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Encode the full document state.
    pub fn encode_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Encode delta since a given state vector.
    pub fn encode_delta(&self, state_vector: &[u8]) -> Result<Vec<u8>, CrdtError> {
        let sv = StateVector::decode_v1(state_vector)
            .map_err(|e| CrdtError::DecodeError(e.to_string()))?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Apply an update from another participant. Observers see it as remote.
    pub fn apply_update(&self, update: &[u8]) -> Result<(), CrdtError> {
        let update = Update::decode_v1(update)
            .map_err(|e| CrdtError::DecodeError(e.to_string()))?;

        let mut txn = self
            .doc
            .try_transact_mut()
            .map_err(|e| CrdtError::TransactionBusy(e.to_string()))?;
        txn.apply_update(update)
            .map_err(|e| CrdtError::ApplyError(e.to_string()))?;

        Ok(())
    }

    /// Replace `start..end` with `replacement` in one transaction tagged
    /// with `origin`.
    pub fn edit_range(
        &self,
        origin: &str,
        start: usize,
        end: usize,
        replacement: &str,
    ) -> Result<(), CrdtError> {
        if start == end && replacement.is_empty() {
            return Ok(());
        }

        let mut txn = self
            .doc
            .try_transact_mut_with(origin)
            .map_err(|e| CrdtError::TransactionBusy(e.to_string()))?;

        let len = self.text.len(&txn) as usize;
        if start > end || end > len {
            return Err(CrdtError::OutOfBounds { start, end, len });
        }
        let (start, end) = (to_index(start)?, to_index(end)?);

        if start < end {
            self.text.remove_range(&mut txn, start, end - start);
        }
        if !replacement.is_empty() {
            self.text.insert(&mut txn, start, replacement);
        }
        Ok(())
    }

    pub fn apply_patch(&self, origin: &str, patch: &TextPatch) -> Result<(), CrdtError> {
        self.edit_range(origin, patch.offset, patch.offset + patch.delete_len, &patch.insert)
    }

    /// Observe every committed change to the text.
    ///
    /// The callback runs inside the committing transaction: it must not
    /// write to this shared text. Dropping the returned subscription stops
    /// the callback.
    pub fn observe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SharedChange<'_>) + Send + Sync + 'static,
    {
        self.text.observe(move |txn, event| {
            let change = SharedChange {
                text: event.target().get_string(txn),
                origin: txn.origin(),
            };
            callback(&change);
        })
    }
}

fn to_index(offset: usize) -> Result<u32, CrdtError> {
    u32::try_from(offset).map_err(|_| CrdtError::OffsetOverflow(offset))
}

/// Errors that can occur during CRDT operations.
#[derive(Debug, thiserror::Error)]
pub enum CrdtError {
    #[error("Failed to decode: {0}")]
    DecodeError(String),

    #[error("Failed to apply update: {0}")]
    ApplyError(String),

    #[error("Shared text is inside another transaction: {0}")]
    TransactionBusy(String),

    #[error("Edit {start}..{end} is outside the shared text (length {len})")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("Offset {0} does not fit the shared text index")]
    OffsetOverflow(usize),

    #[error("Document rejected shared text: {0}")]
    Document(#[from] EditorError),
}
