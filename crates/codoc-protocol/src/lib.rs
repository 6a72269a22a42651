//! codoc sync protocol - wire messages and codec
//!
//! JSON text frames over a persistent bidirectional connection, one event
//! per frame, tagged by `event`:
//!
//! ```text
//! client -> server
//!   {"event":"get-document","documentId":"doc1"}
//!   {"event":"send-changes","delta":{"ops":[...]}}
//!   {"event":"save-document","delta":"full snapshot"}
//!
//! server -> client
//!   {"event":"load-document","delta":"full snapshot"}      (unicast reply)
//!   {"event":"changes-received","delta":{"ops":[...]}}     (room broadcast)
//!   {"event":"error","code":"INVALID_ID","message":"..."}
//! ```
//!
//! Deltas pass through the relay unmodified; only their structural shape is
//! checked, and only by the connection handler, never by the codec.

pub mod codec;
pub mod command;
pub mod error;
pub mod event;

pub use codec::{decode_client, decode_server, encode_client, encode_server, MAX_FRAME_BYTES};
pub use command::ClientMessage;
pub use error::{ProtocolError, ProtocolResult};
pub use event::ServerMessage;
