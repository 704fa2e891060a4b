//! Principal and attachment identity types.
//!
//! These identifiers flow through subscriptions, decision records and audit
//! logs. The engine never interprets them beyond equality and hashing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable, human-readable identifier for an authority-bearing actor.
///
/// Example: PrincipalId("player:notch"), PrincipalId("console")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for one attachment.
///
/// Random v4 UUIDs are never reused, so a stale handle or a late expiry task
/// can never address an attachment created after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttachmentId(pub uuid::Uuid);

impl AttachmentId {
    /// Create a new, unique attachment ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for AttachmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
