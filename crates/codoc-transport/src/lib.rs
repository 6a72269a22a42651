//! codoc Transport Layer
//!
//! WebSocket transport for the codoc relay: one task per connection, a
//! per-connection protocol handler, and room fan-out driven by the core
//! registry's event bus.

pub mod handler;
pub mod websocket;

pub use handler::ConnectionHandler;
pub use websocket::{ServerConfig, WebSocketServer};

/// Default time budget for a store lookup before the client gets an error
/// event instead of hanging on "loading".
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;
