//! Outbound message transport to a foreign surface.

use crate::protocol::OutboundMessage;
use crate::surface::AdapterError;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

pub trait MessageChannel: Send + Sync {
    fn post(&self, message: OutboundMessage) -> Result<(), AdapterError>;
}

/// Keeps every posted message in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    messages: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().clone()
    }

    pub fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl MessageChannel for MemoryChannel {
    fn post(&self, message: OutboundMessage) -> Result<(), AdapterError> {
        self.messages.lock().push(message);
        Ok(())
    }
}

/// Writes each message as one line of JSON.
pub struct JsonLinesChannel<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesChannel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> MessageChannel for JsonLinesChannel<W> {
    fn post(&self, message: OutboundMessage) -> Result<(), AdapterError> {
        let line = message.to_json()?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line).map_err(|e| AdapterError::ChannelClosed(e.to_string()))?;
        writer.flush().map_err(|e| AdapterError::ChannelClosed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_channel_clones_share_log() {
        let channel = MemoryChannel::new();
        let other = channel.clone();
        other.post(OutboundMessage::Merge { xml: "a".into() }).unwrap();

        assert_eq!(channel.messages().len(), 1);
        assert_eq!(channel.take().len(), 1);
        assert!(other.messages().is_empty());
    }

    #[test]
    fn test_json_lines() {
        let channel = JsonLinesChannel::new(Vec::new());
        channel
            .post(OutboundMessage::Status {
                message: "Saved".into(),
                modified: false,
            })
            .unwrap();
        channel.post(OutboundMessage::Export { format: "png".into() }).unwrap();

        let output = String::from_utf8(channel.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], r#"{"action":"export","format":"png"}"#);
    }
}
