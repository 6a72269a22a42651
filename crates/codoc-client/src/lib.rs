//! codoc client - the sync adapter between an editor and the relay
//!
//! The editor itself is an external capability behind the [`Editor`] trait;
//! this crate wires it to the network: one `get-document` on connect, a
//! loading gate until `load-document` arrives, user-originated edits out as
//! `send-changes`, peer edits in via `changes-received`, and a periodic
//! full-snapshot `save-document` (default every 2000 ms).

pub mod adapter;
pub mod editor;

pub use adapter::{
    ClientError, SyncAdapter, SyncConfig, SyncTransport, WsTransport, DEFAULT_SAVE_INTERVAL_MS,
};
pub use codoc_core::Delta;
pub use editor::{EditOrigin, Editor, LineEditor, LocalEdit};
