//! The editor capability boundary
//!
//! The rich-text surface is external to this system; the adapter only needs
//! the operations below. Remote updates go through [`Editor::apply`], a path
//! distinguishable from user edits: only events tagged `EditOrigin::User`
//! are ever sent to the network, so applying a peer's change can never echo
//! it back out.

use codoc_core::Delta;

/// Where an edit event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    /// Typed by the local user; forwarded to the relay.
    User,
    /// Applied programmatically (e.g. from a remote delta); never forwarded.
    Remote,
}

/// A change notification from the editor capability.
#[derive(Debug, Clone)]
pub struct LocalEdit {
    pub delta: Delta,
    pub origin: EditOrigin,
}

impl LocalEdit {
    pub fn user(delta: Delta) -> Self {
        Self {
            delta,
            origin: EditOrigin::User,
        }
    }

    pub fn remote(delta: Delta) -> Self {
        Self {
            delta,
            origin: EditOrigin::Remote,
        }
    }
}

/// The opaque editor capability the adapter drives.
pub trait Editor: Send {
    /// Replace the full content with a snapshot and enable editing.
    fn load(&mut self, snapshot: Delta);

    /// Apply an incremental remote update (not a full replace).
    fn apply(&mut self, delta: Delta);

    /// The full current content, as a snapshot delta.
    fn contents(&self) -> Delta;

    /// Block or unblock local editing.
    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;
}

/// A plain-text line editor, the reference editor capability used by the
/// `codoc` binary and the adapter tests. Insert operations append to a text
/// buffer; string snapshots replace it.
pub struct LineEditor {
    buffer: String,
    enabled: bool,
    on_remote: Option<Box<dyn Fn(&str) + Send>>,
}

impl LineEditor {
    /// Starts disabled; editing unlocks when the initial snapshot loads.
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            enabled: false,
            on_remote: None,
        }
    }

    /// Register a hook invoked with the text of each applied remote change.
    pub fn with_remote_hook(mut self, hook: impl Fn(&str) + Send + 'static) -> Self {
        self.on_remote = Some(Box::new(hook));
        self
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Append text typed by the local user. Does not fire the remote hook;
    /// the caller is responsible for reporting the edit as a `LocalEdit`.
    pub fn apply_local(&mut self, text: &str) {
        self.buffer.push_str(text);
    }
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl Editor for LineEditor {
    fn load(&mut self, snapshot: Delta) {
        self.buffer = snapshot_text(&snapshot);
        self.enabled = true;
    }

    fn apply(&mut self, delta: Delta) {
        let inserted = inserted_text(&delta);
        if inserted.is_empty() {
            return;
        }
        self.buffer.push_str(&inserted);
        if let Some(hook) = &self.on_remote {
            hook(&inserted);
        }
    }

    fn contents(&self) -> Delta {
        Delta::new(serde_json::Value::String(self.buffer.clone()))
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Full text of a snapshot delta.
fn snapshot_text(delta: &Delta) -> String {
    match delta.as_value() {
        serde_json::Value::String(s) => s.clone(),
        _ => inserted_text(delta),
    }
}

/// Concatenated insert text of an incremental delta.
fn inserted_text(delta: &Delta) -> String {
    match delta.as_value() {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => match map.get("ops") {
            Some(serde_json::Value::Array(ops)) => ops
                .iter()
                .filter_map(|op| op.get("insert"))
                .filter_map(|v| v.as_str())
                .collect(),
            _ => String::new(),
        },
        _ => String::new(),
    }
}
