pub mod binding;
pub mod channel;
pub mod config;
pub mod crdt;
pub mod debounce;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod state;
pub mod surface;

pub use binding::{BindingState, TextBinding};
pub use channel::{JsonLinesChannel, MemoryChannel, MessageChannel};
pub use config::{ConfigError, SyncConfig, DEFAULT_CONFIG_NAME};
pub use crdt::{CrdtError, SharedChange, SharedText};
pub use debounce::{ContentSink, FileSink, SaveDebouncer, SaveHandle};
pub use presence::{ClientId, CursorInfo, PresenceState, PresenceStore, RemoteCursor, UserInfo};
pub use protocol::{InboundMessage, OutboundMessage};
pub use session::{ContentHost, DocumentSession, SessionError};
pub use state::WorkspaceState;
pub use surface::{
    AdapterError, AdapterState, DiagramXmlValidator, ForeignSurfaceAdapter, SnapshotValidator,
};

// Re-export editor types hosts need alongside a session
pub use marginalia_editor::{CommentRecord, Document, DocumentEvent};
