//! Session-layer message envelope.
//!
//! Messages exchanged over a live editing connection are JSON objects with a
//! `type` discriminator. Only a handful of fields matter to the gateway; the
//! rest is carried through untouched.
//!
//! Decoding only requires a string `type`, the way the editor reads it: a
//! duplicate key resolves to its last value and a non-string `token` is
//! kept as an ordinary field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Message `type` values the gateway reacts to.
pub mod message_types {
    /// First message of a live connection, carrying the one-time token.
    pub const CLIENT_READY: &str = "CLIENT_READY";

    /// Room-wide broadcast wrapper; the actual kind lives in `data.type`.
    pub const COLLABROOM: &str = "COLLABROOM";

    /// Client-originated profile edit (name, colour) nested in a broadcast.
    pub const USERINFO_UPDATE: &str = "USERINFO_UPDATE";
}

/// Why a JSON object is not a session message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("session message needs a string `type`")]
pub struct MessageTypeError;

/// A message on the live editing connection.
///
/// Unknown fields are kept in `extra` so that a decoded message serializes
/// back to an equivalent JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct SessionMessage {
    /// Message discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// One-time author token (present on `CLIENT_READY`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Nested payload (present on `COLLABROOM`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Every other field, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionMessage {
    /// Create a message with only a `type`.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            token: None,
            data: None,
            extra: Map::new(),
        }
    }

    /// Attach a one-time token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach a nested payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Whether this message has the given `type`.
    #[must_use]
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// The `type` of the nested payload, if any.
    #[must_use]
    pub fn data_kind(&self) -> Option<&str> {
        self.data.as_ref()?.get("type")?.as_str()
    }

    /// The token, treating an empty string as absent.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

impl TryFrom<Map<String, Value>> for SessionMessage {
    type Error = MessageTypeError;

    fn try_from(mut object: Map<String, Value>) -> Result<Self, Self::Error> {
        let Some(Value::String(kind)) = object.remove("type") else {
            return Err(MessageTypeError);
        };
        let token = match object.remove("token") {
            Some(Value::String(token)) => Some(token),
            Some(other) => {
                object.insert("token".to_string(), other);
                None
            }
            None => None,
        };
        let data = object.remove("data");

        Ok(Self {
            kind,
            token,
            data,
            extra: object,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_client_ready_parses_token() {
        let msg: SessionMessage = serde_json::from_value(json!({
            "type": "CLIENT_READY",
            "component": "pad",
            "padId": "welcome",
            "token": "t.abc",
            "protocolVersion": 2
        }))
        .unwrap();

        assert!(msg.is(message_types::CLIENT_READY));
        assert_eq!(msg.token(), Some("t.abc"));
        assert_eq!(msg.extra["padId"], "welcome");
    }

    #[test]
    fn test_unknown_fields_survive_reserialization() {
        let original = json!({
            "type": "CLIENT_READY",
            "token": "t.abc",
            "sessionID": "null",
            "protocolVersion": 2
        });
        let msg: SessionMessage = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(serde_json::to_value(&msg).unwrap(), original);
    }

    #[test]
    fn test_nested_data_kind() {
        let msg = SessionMessage::new(message_types::COLLABROOM).with_data(json!({
            "type": "USERINFO_UPDATE",
            "userInfo": {"name": "Mallory"}
        }));
        assert_eq!(msg.data_kind(), Some(message_types::USERINFO_UPDATE));

        let plain = SessionMessage::new(message_types::COLLABROOM);
        assert_eq!(plain.data_kind(), None);

        let odd = SessionMessage::new(message_types::COLLABROOM).with_data(json!("text"));
        assert_eq!(odd.data_kind(), None);
    }

    #[test]
    fn test_non_string_token_is_kept_as_field() {
        let original = json!({"type": "CLIENT_READY", "token": 1, "padId": "p"});
        let msg: SessionMessage = serde_json::from_value(original.clone()).unwrap();

        assert!(msg.is(message_types::CLIENT_READY));
        assert_eq!(msg.token(), None);
        assert_eq!(serde_json::to_value(&msg).unwrap(), original);
    }

    #[test]
    fn test_duplicate_keys_take_the_last_value() {
        let msg: SessionMessage = serde_json::from_str(
            r#"{"type":"CHAT_MESSAGE","type":"COLLABROOM","data":{"type":"USERINFO_UPDATE"}}"#,
        )
        .unwrap();

        assert!(msg.is(message_types::COLLABROOM));
        assert_eq!(msg.data_kind(), Some(message_types::USERINFO_UPDATE));
    }

    #[test]
    fn test_type_must_be_a_string() {
        assert!(serde_json::from_value::<SessionMessage>(json!({"type": 7})).is_err());
        assert!(serde_json::from_value::<SessionMessage>(json!({"token": "t"})).is_err());
        assert!(serde_json::from_value::<SessionMessage>(json!(["type"])).is_err());
    }

    #[test]
    fn test_empty_token_is_absent() {
        let msg = SessionMessage::new(message_types::CLIENT_READY).with_token("");
        assert_eq!(msg.token(), None);
    }
}
