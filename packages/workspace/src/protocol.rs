//! JSON messages exchanged with an embedded diagram surface.
//!
//! Inbound messages carry an `event` tag, outbound messages an `action` tag:
//!
//! ```text
//! surface → host   {"event":"save","xml":"<mxfile>…</mxfile>"}
//! host → surface   {"action":"merge","xml":"<mxfile>…</mxfile>"}
//! ```

use crate::presence::RemoteCursor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum InboundMessage {
    /// The surface finished loading and waits for content.
    Init,
    Save {
        xml: String,
    },
    Autosave {
        xml: String,
    },
    /// Answer to an export request.
    Export {
        data: String,
        #[serde(default)]
        format: Option<String>,
    },
    CursorPosition {
        x: f64,
        y: f64,
        #[serde(default, rename = "cellId")]
        cell_id: Option<String>,
    },
}

impl InboundMessage {
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Replace the surface's content; sent once per `init`.
    Load { xml: String, autosave: u8 },
    /// Content merged from other participants.
    Merge { xml: String },
    Status { message: String, modified: bool },
    UpdateRemoteCursors { cursors: Vec<RemoteCursor> },
    Export { format: String },
}

impl OutboundMessage {
    pub fn load(xml: impl Into<String>) -> Self {
        OutboundMessage::Load {
            xml: xml.into(),
            autosave: 1,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inbound_events() {
        assert_eq!(InboundMessage::parse(r#"{"event":"init"}"#).unwrap(), InboundMessage::Init);
        assert_eq!(
            InboundMessage::parse(r#"{"event":"autosave","xml":"<mxfile/>"}"#).unwrap(),
            InboundMessage::Autosave {
                xml: "<mxfile/>".to_string()
            }
        );
        assert_eq!(
            InboundMessage::parse(r#"{"event":"cursorPosition","x":1.5,"y":2,"cellId":"c4"}"#).unwrap(),
            InboundMessage::CursorPosition {
                x: 1.5,
                y: 2.0,
                cell_id: Some("c4".to_string())
            }
        );
        assert_eq!(
            InboundMessage::parse(r#"{"event":"export","data":"data:image/png;base64,AA=="}"#).unwrap(),
            InboundMessage::Export {
                data: "data:image/png;base64,AA==".to_string(),
                format: None
            }
        );
    }

    #[test]
    fn test_malformed_inbound() {
        assert!(InboundMessage::parse("not json").is_err());
        assert!(InboundMessage::parse(r#"{"event":"save"}"#).is_err());
        assert!(InboundMessage::parse(r#"{"event":"unknown"}"#).is_err());
    }

    #[test]
    fn test_outbound_wire_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&OutboundMessage::load("<mxfile></mxfile>").to_json().unwrap()).unwrap();
        assert_eq!(json["action"], "load");
        assert_eq!(json["autosave"], 1);

        let json: serde_json::Value = serde_json::from_str(
            &OutboundMessage::UpdateRemoteCursors {
                cursors: vec![RemoteCursor {
                    client_id: 7,
                    name: "bob".to_string(),
                    color: "#123456".to_string(),
                    x: 1.0,
                    y: 2.0,
                    cell_id: Some("c1".to_string()),
                }],
            }
            .to_json()
            .unwrap(),
        )
        .unwrap();
        assert_eq!(json["action"], "updateRemoteCursors");
        assert_eq!(json["cursors"][0]["clientId"], 7);
        assert_eq!(json["cursors"][0]["cellId"], "c1");
    }
}
