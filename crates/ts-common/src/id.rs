//! Time source identity.
//!
//! §6.3: a source configuration carries an optional id (≤36 bytes); when
//! omitted one is generated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a time source id, per §6.3.
pub const ID_MAX_LENGTH: usize = 36;

/// Identifier for a time source, validated to fit the wire's fixed-width id field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    /// Generate a fresh id (UUIDv4), used when `add_source` omits one.
    pub fn generate() -> Self {
        SourceId(uuid::Uuid::new_v4().to_string())
    }

    /// Validate a caller-supplied id string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || s.len() > ID_MAX_LENGTH {
            return None;
        }
        Some(SourceId(s.to_string()))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
