//! Live-session transport plumbing.
//!
//! The gateway sees the editor's Socket.IO traffic as text frames. Frames
//! carrying a session message are run through the message hook chain; all
//! other frames, and messages no hook changed, are forwarded byte-for-byte.

pub mod frame;
pub mod registry;

pub use frame::{Envelope, Frame};
pub use registry::{ConnectionRegistry, InMemoryConnectionRegistry};

use tracing::error;

use padgate_core::ConnectionId;

use crate::hooks::{HookChain, MessageHook};

/// Engine.IO polling payload packet separator.
pub const PACKET_SEPARATOR: char = '\u{1e}';

/// Run a text frame through the message hooks.
///
/// Returns the text to forward, or `None` if the message was suppressed.
pub async fn filter_text(
    hooks: &HookChain<dyn MessageHook>,
    connection: &ConnectionId,
    text: &str,
) -> Option<String> {
    let Some(frame) = Frame::decode(text) else {
        return Some(text.to_string());
    };

    let original = frame.message.clone();
    let replacement = hooks.handle_message(connection, original).await?;
    if replacement == frame.message {
        return Some(text.to_string());
    }

    match frame.encode(&replacement) {
        Ok(encoded) => Some(encoded),
        Err(e) => {
            error!(connection = %connection, error = %e, "failed to encode replaced message");
            Some(text.to_string())
        }
    }
}

/// Filter every packet of an Engine.IO polling payload.
///
/// Suppressed packets are removed; the rest keep their order and separator.
pub async fn filter_payload(
    hooks: &HookChain<dyn MessageHook>,
    connection: &ConnectionId,
    payload: &str,
) -> String {
    let mut kept = Vec::new();
    for packet in payload.split(PACKET_SEPARATOR) {
        if let Some(packet) = filter_text(hooks, connection, packet).await {
            kept.push(packet);
        }
    }
    kept.join(&PACKET_SEPARATOR.to_string())
}
