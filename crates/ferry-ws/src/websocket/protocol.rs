//! Wire envelopes exchanged with the ferry backend.
//!
//! Outbound requests look like
//! `{"_command": "...", "_meta": {"id": "...", "type": "...", ...}, ...}` and
//! inbound frames like `{"_command": "...", "id": "...", "error": ..., "reason": "..."}`.
//! Everything beyond those reserved keys is opaque payload.

use serde::Serialize;
use serde_json::{Map, Value};

use super::types::RequestId;
use crate::error::{TransportError, TransportResult};

/// Command name of the keep-alive frame.
pub const HEARTBEAT_COMMAND: &str = "heartbeat";
/// Command name used by [`OutboundEnvelope::save`].
pub const SAVE_COMMAND: &str = "saveChanges";
/// Command name used by [`OutboundEnvelope::delete`].
pub const DELETE_COMMAND: &str = "delete";
/// Command name used by [`OutboundEnvelope::rename`].
pub const RENAME_COMMAND: &str = "rename";

const COMMAND_KEY: &str = "_command";
const META_KEY: &str = "_meta";

/// The `_meta` block of a correlated request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestMeta {
    /// Correlation id, echoed back as `id` in the reply.
    pub id: RequestId,
    /// Kind of object the request is about (`spider`, `project`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

impl RequestMeta {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            kind: kind.into(),
            spider: None,
            project: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, project: Option<String>, spider: Option<String>) -> Self {
        self.project = project;
        self.spider = spider;
        self
    }
}

/// An outbound message: command, optional metadata, flattened payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "_command")]
    pub command: String,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl OutboundEnvelope {
    /// A bare command with no metadata.
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            meta: None,
            payload: Map::new(),
        }
    }

    /// The keep-alive frame.
    pub fn heartbeat() -> Self {
        Self::command(HEARTBEAT_COMMAND)
    }

    /// `{_command: "saveChanges", _meta, <kind>: obj}`.
    ///
    /// `kind` becomes a top-level key, so it may not collide with
    /// `_command` or `_meta`.
    pub fn save<T: Serialize + ?Sized>(meta: RequestMeta, obj: &T) -> TransportResult<Self> {
        if meta.kind == COMMAND_KEY || meta.kind == META_KEY {
            return Err(TransportError::config(format!(
                "Object kind {:?} is a reserved envelope key",
                meta.kind
            )));
        }
        let value = serde_json::to_value(obj)?;
        let mut payload = Map::new();
        payload.insert(meta.kind.clone(), value);
        Ok(Self {
            command: SAVE_COMMAND.to_string(),
            meta: Some(meta),
            payload,
        })
    }

    /// `{_command: "delete", _meta, name}`.
    pub fn delete(meta: RequestMeta, name: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("name".to_string(), Value::String(name.into()));
        Self {
            command: DELETE_COMMAND.to_string(),
            meta: Some(meta),
            payload,
        }
    }

    /// `{_command: "rename", _meta, old, new}`.
    pub fn rename(meta: RequestMeta, from: impl Into<String>, to: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("old".to_string(), Value::String(from.into()));
        payload.insert("new".to_string(), Value::String(to.into()));
        Self {
            command: RENAME_COMMAND.to_string(),
            meta: Some(meta),
            payload,
        }
    }

    /// Correlation id, if this envelope expects a reply.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.meta.as_ref().map(|meta| &meta.id)
    }

    pub fn to_text(&self) -> TransportResult<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}

/// A decoded inbound frame.
///
/// Keeps the whole JSON value so a correlated reply can hand the caller
/// exactly what the server sent.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundFrame {
    value: Value,
}

impl InboundFrame {
    /// Parse a text frame. Anything that is not JSON is a decode error.
    pub fn decode(text: &str) -> TransportResult<Self> {
        let value = serde_json::from_str(text).map_err(|e| TransportError::decode(e.to_string()))?;
        Ok(Self { value })
    }

    /// The `_command` field, when it is a string.
    pub fn command(&self) -> Option<&str> {
        self.value.get(COMMAND_KEY).and_then(Value::as_str)
    }

    /// The correlation `id`, when present.
    pub fn request_id(&self) -> Option<RequestId> {
        match self.value.get("id")? {
            Value::String(s) => Some(RequestId::from(s.as_str())),
            Value::Number(n) => Some(RequestId::from(n.to_string())),
            _ => None,
        }
    }

    /// Whether the frame reports a failure (a truthy `error` field).
    pub fn has_error(&self) -> bool {
        self.value.get("error").is_some_and(is_truthy)
    }

    /// Failure text: `reason` when set, otherwise the `error` field.
    pub fn error_detail(&self) -> Option<String> {
        if !self.has_error() {
            return None;
        }
        if let Some(reason) = self.value.get("reason").filter(|v| is_truthy(v)) {
            return Some(value_text(reason));
        }
        self.value.get("error").map(value_text)
    }

    /// Look up any payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value.get(key)
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn meta(kind: &str, id: &str) -> RequestMeta {
        RequestMeta {
            id: RequestId::from(id),
            kind: kind.to_string(),
            spider: None,
            project: None,
        }
    }

    #[test]
    fn test_heartbeat_is_bare_command() {
        let text = OutboundEnvelope::heartbeat().to_text().unwrap();
        assert_eq!(text, r#"{"_command":"heartbeat"}"#);
    }

    #[test]
    fn test_save_envelope_nests_payload_under_kind() {
        let envelope =
            OutboundEnvelope::save(meta("spider", "X"), &json!({"name": "books"})).unwrap();
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value,
            json!({
                "_command": "saveChanges",
                "_meta": {"id": "X", "type": "spider"},
                "spider": {"name": "books"}
            })
        );
        assert_eq!(envelope.request_id(), Some(&RequestId::from("X")));
    }

    #[test]
    fn test_save_rejects_reserved_kinds() {
        for kind in ["_command", "_meta"] {
            let result = OutboundEnvelope::save(meta(kind, "X"), &json!({"name": "books"}));
            assert!(matches!(result, Err(TransportError::Config { .. })), "{kind}");
        }
    }

    #[test]
    fn test_meta_carries_context_when_set() {
        let meta = meta("spider", "Y").with_context(Some("p1".into()), Some("s1".into()));
        let value = serde_json::to_value(OutboundEnvelope::delete(meta, "old-spider")).unwrap();

        assert_eq!(
            value,
            json!({
                "_command": "delete",
                "_meta": {"id": "Y", "type": "spider", "spider": "s1", "project": "p1"},
                "name": "old-spider"
            })
        );
    }

    #[test]
    fn test_rename_envelope_has_old_and_new() {
        let value = serde_json::to_value(OutboundEnvelope::rename(meta("project", "Z"), "a", "b"))
            .unwrap();
        assert_eq!(value["_command"], "rename");
        assert_eq!(value["old"], "a");
        assert_eq!(value["new"], "b");
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let err = InboundFrame::decode("<html>").unwrap_err();
        assert!(matches!(err, TransportError::Decode { .. }));
    }

    #[test]
    fn test_error_detail_prefers_reason() {
        let frame = InboundFrame::decode(
            r#"{"_command":"saveChanges","id":"X","error":"conflict","reason":"stale version"}"#,
        )
        .unwrap();
        assert_eq!(frame.command(), Some("saveChanges"));
        assert_eq!(frame.request_id(), Some(RequestId::from("X")));
        assert!(frame.has_error());
        assert_eq!(frame.error_detail().as_deref(), Some("stale version"));
    }

    #[test]
    fn test_error_detail_falls_back_to_error() {
        let frame = InboundFrame::decode(r#"{"_command":"x","error":"boom","reason":""}"#).unwrap();
        assert_eq!(frame.error_detail().as_deref(), Some("boom"));

        let frame = InboundFrame::decode(r#"{"_command":"x","error":true}"#).unwrap();
        assert_eq!(frame.error_detail().as_deref(), Some("true"));
    }

    #[test]
    fn test_falsy_error_is_not_an_error() {
        for text in [
            r#"{"_command":"x","error":null}"#,
            r#"{"_command":"x","error":false}"#,
            r#"{"_command":"x","error":""}"#,
            r#"{"_command":"x","error":0}"#,
        ] {
            let frame = InboundFrame::decode(text).unwrap();
            assert!(!frame.has_error(), "{text}");
            assert!(frame.error_detail().is_none());
        }
    }

    #[test]
    fn test_frame_without_command() {
        let frame = InboundFrame::decode("[1, 2]").unwrap();
        assert!(frame.command().is_none());
        assert!(frame.request_id().is_none());
    }
}
