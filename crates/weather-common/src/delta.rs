//! Path/value updates published to the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single path/value update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Dotted path, e.g. `environment.outside.temperature`.
    pub path: String,
    pub value: Value,
}

impl Delta {
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}
