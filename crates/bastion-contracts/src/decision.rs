//! Decision records passed through the interceptor pipeline.
//!
//! Every permission check produces one `DecisionRecord`. Interceptors may read
//! it, log it, or flip `allowed` before the caller sees the answer.

use serde::{Deserialize, Serialize};

use crate::{
    key::PermissionKey,
    principal::{AttachmentId, PrincipalId},
};

/// Where the candidate value of a check came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionOrigin {
    /// The principal's effective map held the key.
    Effective {
        /// The attachment that set it, `None` for registry defaults.
        source: Option<AttachmentId>,
    },
    /// The key was not effective; the registry node's own default policy applied.
    NodeDefault,
    /// The registry does not know the key; the global fallback policy applied.
    Fallback,
}

/// The record built for one check and handed to each interceptor in turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// The principal being checked.
    pub principal: PrincipalId,
    /// Operator status used to resolve default policies for this check.
    pub operator: bool,
    /// The permission that was asked for.
    pub key: PermissionKey,
    /// The decision. Interceptors may overwrite this.
    pub allowed: bool,
    /// How the engine arrived at its candidate value.
    pub origin: DecisionOrigin,
}

impl DecisionRecord {
    /// Replace the decision, e.g. from an auditing or veto interceptor.
    pub fn set_allowed(&mut self, allowed: bool) {
        self.allowed = allowed;
    }
}
