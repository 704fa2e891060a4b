//! Canonical permission names.
//!
//! Permission names are case-insensitive. Every name entering the engine is
//! folded to lower case once, here, so that storage, lookup and subscription
//! all agree on a single spelling.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BastionError, BastionResult};

/// A validated, lower-cased permission name.
///
/// Surrounding whitespace is trimmed before folding, so `" World.Build "`,
/// `"world.build"` and `"WORLD.BUILD"` are one key. Inner whitespace is kept.
///
/// Names are namespaced by convention (`"world.build"`, `"chat.color"`) but the
/// engine attaches no meaning to the dots: the set of valid names is whatever
/// the registry defines, and it may grow at runtime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionKey(String);

impl PermissionKey {
    /// Normalize `name` into a key.
    ///
    /// Surrounding whitespace is trimmed. Returns `BastionError::InvalidArgument`
    /// when nothing is left.
    pub fn new(name: impl AsRef<str>) -> BastionResult<Self> {
        let trimmed = name.as_ref().trim();
        if trimmed.is_empty() {
            return Err(BastionError::InvalidArgument {
                reason: "permission name cannot be empty".to_string(),
            });
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    /// The canonical (lower-case) spelling.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PermissionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PermissionKey {
    type Error = BastionError;

    fn try_from(value: String) -> BastionResult<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for PermissionKey {
    type Error = BastionError;

    fn try_from(value: &str) -> BastionResult<Self> {
        Self::new(value)
    }
}

impl From<PermissionKey> for String {
    fn from(key: PermissionKey) -> Self {
        key.0
    }
}
