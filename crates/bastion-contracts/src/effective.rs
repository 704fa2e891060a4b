//! Resolved permission entries.
//!
//! An `EffectiveEntry` is one row of a principal's memoized permission table.
//! It records both the value and where the value came from, so tooling can
//! answer "why is this true?" without re-running resolution.

use serde::{Deserialize, Serialize};

use crate::{key::PermissionKey, principal::AttachmentId};

/// One resolved permission for one principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveEntry {
    /// The permission this entry resolves.
    pub key: PermissionKey,
    /// Whether the permission is held.
    pub value: bool,
    /// The attachment that set this value, or `None` when it was derived from
    /// the registry's default set.
    pub source: Option<AttachmentId>,
}

impl EffectiveEntry {
    /// True when the value comes from the registry's defaults rather than an attachment.
    pub fn is_default(&self) -> bool {
        self.source.is_none()
    }
}
