//! Message catalog shared by the editor host and the sandboxed surface agent.
//!
//! Kept in a dedicated crate so both sides (and any non-Rust client) agree on
//! one wire shape without pulling in runtime code. Every message travels as a
//! JSON envelope `{"type": "...", "payload": {...}}`; there is no correlation
//! id, replies are matched by type and payload fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Topic the host window listens on. Anyone able to post into the host window
/// can publish here, so the host checks origins.
pub const TOPIC_HOST_WINDOW: &str = "host.window";
/// Topic the sandboxed surface listens on.
pub const TOPIC_SURFACE_WINDOW: &str = "surface.window";

pub type AnimationParams = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("invalid message envelope: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),
    #[error("unknown message type {0}")]
    UnknownType(String),
    #[error("malformed {kind} payload: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerPayload {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorPayload {
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyPayload {
    pub selector: String,
    #[serde(default)]
    pub animation: AnimationParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TweakPayload {
    pub selector: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Element bounds in the sandboxed document's own pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighlightBox {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationStatus {
    pub selector: String,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitAckPayload {
    pub ready: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

/// One element of the surface's body tree, as shown in the editor layer panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedNode {
    pub tag_name: String,
    pub id: String,
    pub classes: String,
    pub stable_selector: String,
    #[serde(default)]
    pub children: Vec<SerializedNode>,
}

impl SerializedNode {
    /// Depth-first search for the node addressed by `selector`.
    pub fn find(&self, selector: &str) -> Option<&SerializedNode> {
        if self.stable_selector == selector {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(selector))
    }
}

/// Element-addressed animation operations that report a status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimationOp {
    Apply,
    Remove,
    Pause,
    Resume,
    Restart,
}

impl AnimationOp {
    pub fn as_str(self) -> &'static str {
        match self {
            AnimationOp::Apply => "apply",
            AnimationOp::Remove => "remove",
            AnimationOp::Pause => "pause",
            AnimationOp::Resume => "resume",
            AnimationOp::Restart => "restart",
        }
    }
}

/// Host → sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    HandshakePing,
    Init,
    InspectAt(PointerPayload),
    SelectAt(PointerPayload),
    SetInspectorMode { enabled: bool },
    GetDomTree,
    Apply(ApplyPayload),
    Remove(SelectorPayload),
    Pause(SelectorPayload),
    Resume(SelectorPayload),
    Restart(SelectorPayload),
    Tweak(TweakPayload),
}

impl Command {
    pub const KINDS: &'static [&'static str] = &[
        "HANDSHAKE_PING",
        "INIT",
        "INSPECT_AT",
        "SELECT_AT",
        "SET_INSPECTOR_MODE",
        "GET_DOM_TREE",
        "APPLY",
        "REMOVE",
        "PAUSE",
        "RESUME",
        "RESTART",
        "TWEAK",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Command::HandshakePing => "HANDSHAKE_PING",
            Command::Init => "INIT",
            Command::InspectAt(_) => "INSPECT_AT",
            Command::SelectAt(_) => "SELECT_AT",
            Command::SetInspectorMode { .. } => "SET_INSPECTOR_MODE",
            Command::GetDomTree => "GET_DOM_TREE",
            Command::Apply(_) => "APPLY",
            Command::Remove(_) => "REMOVE",
            Command::Pause(_) => "PAUSE",
            Command::Resume(_) => "RESUME",
            Command::Restart(_) => "RESTART",
            Command::Tweak(_) => "TWEAK",
        }
    }

    /// Builds the status-reporting command for `op`. `animation` is only sent
    /// with [`AnimationOp::Apply`].
    pub fn animation(op: AnimationOp, selector: impl Into<String>, animation: AnimationParams) -> Self {
        let selector = selector.into();
        match op {
            AnimationOp::Apply => Command::Apply(ApplyPayload {
                selector,
                animation,
            }),
            AnimationOp::Remove => Command::Remove(SelectorPayload { selector }),
            AnimationOp::Pause => Command::Pause(SelectorPayload { selector }),
            AnimationOp::Resume => Command::Resume(SelectorPayload { selector }),
            AnimationOp::Restart => Command::Restart(SelectorPayload { selector }),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        serde_json::to_vec(self).map_err(ProtoError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        decode_known(bytes, Self::KINDS)
    }
}

/// Sandbox → host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    HandshakeAck,
    InitAck(InitAckPayload),
    Highlight(HighlightBox),
    Selected(SelectorPayload),
    DomTree(SerializedNode),
    Applied(AnimationStatus),
    Removed(AnimationStatus),
    Paused(AnimationStatus),
    Resumed(AnimationStatus),
    Restarted(AnimationStatus),
    Error(ErrorPayload),
}

impl Event {
    pub const KINDS: &'static [&'static str] = &[
        "HANDSHAKE_ACK",
        "INIT_ACK",
        "HIGHLIGHT",
        "SELECTED",
        "DOM_TREE",
        "APPLIED",
        "REMOVED",
        "PAUSED",
        "RESUMED",
        "RESTARTED",
        "ERROR",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Event::HandshakeAck => "HANDSHAKE_ACK",
            Event::InitAck(_) => "INIT_ACK",
            Event::Highlight(_) => "HIGHLIGHT",
            Event::Selected(_) => "SELECTED",
            Event::DomTree(_) => "DOM_TREE",
            Event::Applied(_) => "APPLIED",
            Event::Removed(_) => "REMOVED",
            Event::Paused(_) => "PAUSED",
            Event::Resumed(_) => "RESUMED",
            Event::Restarted(_) => "RESTARTED",
            Event::Error(_) => "ERROR",
        }
    }

    pub fn animation_status(op: AnimationOp, status: AnimationStatus) -> Self {
        match op {
            AnimationOp::Apply => Event::Applied(status),
            AnimationOp::Remove => Event::Removed(status),
            AnimationOp::Pause => Event::Paused(status),
            AnimationOp::Resume => Event::Resumed(status),
            AnimationOp::Restart => Event::Restarted(status),
        }
    }

    /// Splits a status event back into its operation, if it is one.
    pub fn as_animation_status(&self) -> Option<(AnimationOp, &AnimationStatus)> {
        match self {
            Event::Applied(status) => Some((AnimationOp::Apply, status)),
            Event::Removed(status) => Some((AnimationOp::Remove, status)),
            Event::Paused(status) => Some((AnimationOp::Pause, status)),
            Event::Resumed(status) => Some((AnimationOp::Resume, status)),
            Event::Restarted(status) => Some((AnimationOp::Restart, status)),
            _ => None,
        }
    }

    pub fn error(message: impl Into<String>, selector: Option<String>) -> Self {
        Event::Error(ErrorPayload {
            message: message.into(),
            selector,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        serde_json::to_vec(self).map_err(ProtoError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        decode_known(bytes, Self::KINDS)
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

fn decode_known<T>(bytes: &[u8], kinds: &[&str]) -> Result<T, ProtoError>
where
    T: serde::de::DeserializeOwned,
{
    let raw: RawEnvelope = serde_json::from_slice(bytes).map_err(ProtoError::InvalidEnvelope)?;
    if !kinds.contains(&raw.kind.as_str()) {
        return Err(ProtoError::UnknownType(raw.kind));
    }
    let mut envelope = Map::new();
    envelope.insert("type".into(), Value::String(raw.kind.clone()));
    if let Some(payload) = raw.payload.filter(|payload| !payload.is_null()) {
        envelope.insert("payload".into(), payload);
    }
    serde_json::from_value(Value::Object(envelope)).map_err(|source| ProtoError::Malformed {
        kind: raw.kind,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_commands_omit_payload() {
        let bytes = Command::HandshakePing.encode().expect("encode");
        let value: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value, json!({"type": "HANDSHAKE_PING"}));
    }

    #[test]
    fn pointer_commands_use_catalog_names() {
        let bytes = Command::SelectAt(PointerPayload { x: 150.0, y: 250.0 })
            .encode()
            .expect("encode");
        let value: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value["type"], "SELECT_AT");
        assert_eq!(value["payload"]["x"], 150.0);
        assert_eq!(value["payload"]["y"], 250.0);

        let bytes = Command::SetInspectorMode { enabled: true }
            .encode()
            .expect("encode");
        let value: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value, json!({"type": "SET_INSPECTOR_MODE", "payload": {"enabled": true}}));
    }

    #[test]
    fn decodes_apply_from_editor_json() {
        let raw = br##"{"type":"APPLY","payload":{"selector":"#box","animation":{"x":100,"duration":1}}}"##;
        let command = Command::decode(raw).expect("decode");
        match command {
            Command::Apply(payload) => {
                assert_eq!(payload.selector, "#box");
                assert_eq!(payload.animation["x"], json!(100));
                assert_eq!(payload.animation["duration"], json!(1));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_types_are_reported_not_guessed() {
        let err = Command::decode(br#"{"type":"TELEPORT","payload":{}}"#).unwrap_err();
        assert!(matches!(err, ProtoError::UnknownType(kind) if kind == "TELEPORT"));

        let err = Event::decode(br#"{"type":"HANDSHAKE_PONG"}"#).unwrap_err();
        assert!(matches!(err, ProtoError::UnknownType(kind) if kind == "HANDSHAKE_PONG"));
    }

    #[test]
    fn known_type_with_bad_payload_is_malformed() {
        let err = Command::decode(br#"{"type":"INSPECT_AT","payload":{"x":"left"}}"#).unwrap_err();
        assert!(matches!(err, ProtoError::Malformed { ref kind, .. } if kind == "INSPECT_AT"));

        let err = Command::decode(b"not json").unwrap_err();
        assert!(matches!(err, ProtoError::InvalidEnvelope(_)));
    }

    #[test]
    fn null_payload_on_unit_event_is_tolerated() {
        let event = Event::decode(br#"{"type":"HANDSHAKE_ACK","payload":null}"#).expect("decode");
        assert_eq!(event, Event::HandshakeAck);
    }

    #[test]
    fn error_event_carries_selector_when_known() {
        let event = Event::error("Element not found: #gone", Some("#gone".into()));
        let value: Value = serde_json::from_slice(&event.encode().expect("encode")).expect("json");
        assert_eq!(value["type"], "ERROR");
        assert_eq!(value["payload"]["selector"], "#gone");

        let bare = Event::error("library missing", None);
        let value: Value = serde_json::from_slice(&bare.encode().expect("encode")).expect("json");
        assert!(value["payload"].get("selector").is_none());
    }

    #[test]
    fn dom_tree_uses_camel_case_fields() {
        let tree = SerializedNode {
            tag_name: "body".into(),
            id: String::new(),
            classes: String::new(),
            stable_selector: "body".into(),
            children: vec![SerializedNode {
                tag_name: "div".into(),
                id: "box".into(),
                classes: "box".into(),
                stable_selector: "#box".into(),
                children: Vec::new(),
            }],
        };
        let value = serde_json::to_value(Event::DomTree(tree.clone())).expect("json");
        assert_eq!(value["payload"]["children"][0]["stableSelector"], "#box");
        assert_eq!(value["payload"]["tagName"], "body");
        assert_eq!(tree.find("#box").map(|node| node.id.as_str()), Some("box"));
        assert!(tree.find("#missing").is_none());
    }

    #[test]
    fn status_events_split_back_into_operations() {
        let status = AnimationStatus {
            selector: "#box".into(),
            success: true,
        };
        let event = Event::animation_status(AnimationOp::Restart, status.clone());
        assert_eq!(event.kind(), "RESTARTED");
        assert_eq!(event.as_animation_status(), Some((AnimationOp::Restart, &status)));
        assert!(Event::HandshakeAck.as_animation_status().is_none());
    }

    #[test]
    fn kinds_tables_match_variant_names() {
        let samples = [
            Command::HandshakePing,
            Command::Init,
            Command::GetDomTree,
            Command::animation(AnimationOp::Pause, "#a", AnimationParams::new()),
            Command::Tweak(TweakPayload {
                selector: "#a".into(),
                properties: Map::new(),
            }),
        ];
        for command in samples {
            assert!(Command::KINDS.contains(&command.kind()));
            let value: Value = serde_json::from_slice(&command.encode().expect("encode")).expect("json");
            assert_eq!(value["type"], command.kind());
        }
    }
}
