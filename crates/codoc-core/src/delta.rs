//! The opaque edit delta
//!
//! A `Delta` is either a full-content snapshot or an incremental change,
//! produced and consumed by the editor capability. The relay never merges or
//! transforms deltas; composability is the editor's contract, not ours. The
//! only thing the server checks is structural shape, so a garbage payload
//! cannot be relayed to peers or persisted.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Opaque, serializable edit or snapshot payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(serde_json::Value);

impl Delta {
    /// The default content of a freshly created document.
    pub fn empty() -> Self {
        Delta(serde_json::Value::String(String::new()))
    }

    pub fn new(value: serde_json::Value) -> Self {
        Delta(value)
    }

    /// Build an incremental insert delta in the editor's operation form.
    pub fn insert(text: impl Into<String>) -> Self {
        Delta(serde_json::json!({ "ops": [{ "insert": text.into() }] }))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// True for a fresh document's content (empty string or null).
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Structural validation performed before relay or persist.
    ///
    /// A well-formed delta is either a JSON string (plain snapshot) or an
    /// object carrying an `ops` array (the editor's operation form). The
    /// contents of the operations are not inspected.
    pub fn is_well_formed(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null | serde_json::Value::String(_) => true,
            serde_json::Value::Object(map) => {
                matches!(map.get("ops"), Some(serde_json::Value::Array(_)))
            }
            _ => false,
        }
    }

    /// Validate shape, mapping failure to a core error.
    pub fn ensure_well_formed(&self) -> Result<()> {
        if self.is_well_formed() {
            Ok(())
        } else {
            Err(Error::MalformedDelta(format!(
                "expected string or {{\"ops\": [...]}}, got {}",
                type_name(&self.0)
            )))
        }
    }
}

impl Default for Delta {
    fn default() -> Self {
        Self::empty()
    }
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
