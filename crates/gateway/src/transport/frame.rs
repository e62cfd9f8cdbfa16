//! Text frame codec for the live-session transport.
//!
//! The editor's client talks Socket.IO over Engine.IO. A session message
//! travels as the first argument of a `message` event:
//!
//! ```text
//! 42["message",{"type":"CLIENT_READY","token":"t.abc",...}]
//! 42/pads,17["message",{...}]
//! 451-["message",{...},{"_placeholder":true,"num":0}]
//! ```
//!
//! where `4` is the Engine.IO message packet and `2` (or `5` for a binary
//! event, followed by the attachment count) the Socket.IO event packet,
//! then an optional namespace and ack id. Arguments after the first are
//! carried along untouched. Plain JSON objects are accepted as well. Every
//! other frame (handshakes, pings, acks, binary attachments) is not a
//! session message and is never decoded.

use serde_json::Value;

use padgate_core::SessionMessage;

/// Socket.IO event name carrying session messages.
pub const MESSAGE_EVENT: &str = "message";

/// Engine.IO message + Socket.IO event packet prefix.
const EVENT_PREFIX: &str = "42";

/// Engine.IO message + Socket.IO binary event packet prefix.
const BINARY_EVENT_PREFIX: &str = "45";

/// How a session message was wrapped on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// A bare JSON object.
    Bare,
    /// A Socket.IO event frame.
    SocketIo {
        /// Everything before the JSON array (packet types, namespace, ack id).
        prefix: String,
        /// Event name.
        event: String,
        /// Event arguments after the message.
        trailing: Vec<Value>,
    },
}

/// A decoded session message and its envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// How the message was wrapped.
    pub envelope: Envelope,
    /// The message itself.
    pub message: SessionMessage,
}

impl Frame {
    /// Decode a text frame; `None` if it does not carry a session message.
    #[must_use]
    pub fn decode(text: &str) -> Option<Self> {
        if let Some(rest) = text.strip_prefix(EVENT_PREFIX) {
            return Self::decode_event(text, rest);
        }

        if let Some(rest) = text.strip_prefix(BINARY_EVENT_PREFIX) {
            // The attachment count is terminated by a dash
            let dash = rest.find('-')?;
            return Self::decode_event(text, rest.get(dash + 1..)?);
        }

        if text.trim_start().starts_with('{') {
            let message = serde_json::from_str(text).ok()?;
            return Some(Self {
                envelope: Envelope::Bare,
                message,
            });
        }

        None
    }

    /// Decode the part of an event frame after its packet header.
    fn decode_event(text: &str, rest: &str) -> Option<Self> {
        let mut rest = rest;

        if rest.starts_with('/') {
            let comma = rest.find(',')?;
            rest = rest.get(comma + 1..)?;
        }

        // Socket.IO reads whitespace as part of the ack id
        let ack_len = rest
            .bytes()
            .take_while(|b| b.is_ascii_digit() || b.is_ascii_whitespace())
            .count();
        rest = rest.get(ack_len..)?;
        let prefix = text.get(..text.len() - rest.len())?.to_string();

        let Value::Array(mut items) = serde_json::from_str::<Value>(rest).ok()? else {
            return None;
        };
        if items.len() < 2 {
            return None;
        }
        let trailing = items.split_off(2);
        let Some(Value::Object(payload)) = items.pop() else {
            return None;
        };
        let Some(Value::String(event)) = items.pop() else {
            return None;
        };
        if event != MESSAGE_EVENT {
            return None;
        }
        let message = SessionMessage::try_from(payload).ok()?;

        Some(Self {
            envelope: Envelope::SocketIo {
                prefix,
                event,
                trailing,
            },
            message,
        })
    }

    /// Encode `message` in this frame's envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be serialized.
    pub fn encode(&self, message: &SessionMessage) -> Result<String, serde_json::Error> {
        match &self.envelope {
            Envelope::Bare => serde_json::to_string(message),
            Envelope::SocketIo {
                prefix,
                event,
                trailing,
            } => {
                let mut items = Vec::with_capacity(trailing.len() + 2);
                items.push(Value::String(event.clone()));
                items.push(serde_json::to_value(message)?);
                items.extend(trailing.iter().cloned());
                let body = serde_json::to_string(&items)?;
                Ok(format!("{prefix}{body}"))
            }
        }
    }
}
