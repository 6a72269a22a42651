//! JSON frame codec
//!
//! One event per text frame. Frames above `MAX_FRAME_BYTES` are rejected
//! before parsing so an oversized payload cannot balloon the relay's memory.

use crate::command::ClientMessage;
use crate::error::{ProtocolError, ProtocolResult};
use crate::event::ServerMessage;
use tracing::debug;

/// Maximum accepted frame size (1 MiB).
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Decode a client frame received by the server.
pub fn decode_client(text: &str) -> ProtocolResult<ClientMessage> {
    decode(text)
}

/// Decode a server frame received by a client.
pub fn decode_server(text: &str) -> ProtocolResult<ServerMessage> {
    decode(text)
}

/// Encode a message for a client-to-server frame.
pub fn encode_client(msg: &ClientMessage) -> String {
    // Message types serialize infallibly: tagged enums over JSON values.
    serde_json::to_string(msg).unwrap_or_default()
}

/// Encode a message for a server-to-client frame.
pub fn encode_server(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).unwrap_or_default()
}

fn decode<T: serde::de::DeserializeOwned>(text: &str) -> ProtocolResult<T> {
    if text.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_BYTES,
        });
    }

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    // Pull the tag out first so an unrecognized event reports as such rather
    // than as a generic deserialization failure.
    let event = value
        .get("event")
        .and_then(|e| e.as_str())
        .ok_or_else(|| ProtocolError::InvalidJson("missing \"event\" tag".into()))?
        .to_string();

    serde_json::from_value(value).map_err(|e| {
        debug!(event = %event, error = %e, "Frame rejected");
        if e.to_string().contains("unknown variant") {
            ProtocolError::UnknownEvent(event)
        } else {
            ProtocolError::InvalidJson(e.to_string())
        }
    })
}
