//! codoc Core - documents, rooms, and sessions
//!
//! This crate provides the core building blocks for the codoc relay:
//! - Document identity and the opaque edit delta
//! - Room membership and ordered room fan-out
//! - Per-connection session state

pub mod delta;
pub mod document;
pub mod error;
pub mod room;
pub mod session;

pub use delta::Delta;
pub use document::{Document, DocumentId};
pub use error::{Error, Result};
pub use room::{ConnectionId, RoomEvent, RoomRegistry};
pub use session::SessionState;
