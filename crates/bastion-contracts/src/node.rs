//! Registry-owned permission definitions.
//!
//! A `PermissionNode` is what the registry knows about one permission: how it
//! resolves when nothing overrides it (`DefaultPolicy`) and which other
//! permissions it implies (`children`). The engine only ever reads these.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    error::{BastionError, BastionResult},
    key::PermissionKey,
};

/// How a permission resolves for a principal that has no explicit value for it.
///
/// Written in configuration as a plain string. Several historical spellings
/// are accepted for the operator variants:
///
/// ```toml
/// default = "true"
/// default = "false"
/// default = "op"       # also "isop", "operator", "admin"
/// default = "not-op"   # also "notop", "!op", "not_operator", "!admin"
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DefaultPolicy {
    AlwaysTrue,
    AlwaysFalse,
    /// Also the fallback for permissions nobody declared.
    #[default]
    TrueIfOperator,
    TrueIfNotOperator,
}

impl DefaultPolicy {
    /// Resolve this policy for a principal with the given operator status.
    pub fn resolve(self, is_operator: bool) -> bool {
        match self {
            DefaultPolicy::AlwaysTrue => true,
            DefaultPolicy::AlwaysFalse => false,
            DefaultPolicy::TrueIfOperator => is_operator,
            DefaultPolicy::TrueIfNotOperator => !is_operator,
        }
    }

    /// Canonical configuration spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            DefaultPolicy::AlwaysTrue => "true",
            DefaultPolicy::AlwaysFalse => "false",
            DefaultPolicy::TrueIfOperator => "op",
            DefaultPolicy::TrueIfNotOperator => "not-op",
        }
    }
}

impl fmt::Display for DefaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefaultPolicy {
    type Err = BastionError;

    fn from_str(s: &str) -> BastionResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "true" => Ok(DefaultPolicy::AlwaysTrue),
            "false" => Ok(DefaultPolicy::AlwaysFalse),
            "op" | "isop" | "operator" | "isoperator" | "admin" | "isadmin" => {
                Ok(DefaultPolicy::TrueIfOperator)
            }
            "not-op" | "notop" | "!op" | "not_op" | "not_operator" | "notoperator" | "!operator"
            | "!admin" | "notadmin" | "not_admin" => Ok(DefaultPolicy::TrueIfNotOperator),
            other => Err(BastionError::InvalidArgument {
                reason: format!("unknown default policy '{}'", other),
            }),
        }
    }
}

impl TryFrom<String> for DefaultPolicy {
    type Error = BastionError;

    fn try_from(value: String) -> BastionResult<Self> {
        value.parse()
    }
}

impl From<DefaultPolicy> for String {
    fn from(policy: DefaultPolicy) -> Self {
        policy.as_str().to_string()
    }
}

/// A single permission definition, as owned by the registry.
///
/// `children` maps implied permissions to the value they take when this node
/// is granted. A negative grant of this node inverts every child value during
/// propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionNode {
    pub name: PermissionKey,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub default: DefaultPolicy,

    /// Ordered so that propagation visits children deterministically.
    #[serde(default)]
    pub children: BTreeMap<PermissionKey, bool>,
}

impl PermissionNode {
    /// Define a node with no children.
    pub fn new(name: impl AsRef<str>, default: DefaultPolicy) -> BastionResult<Self> {
        Ok(Self {
            name: PermissionKey::new(name)?,
            description: None,
            default,
            children: BTreeMap::new(),
        })
    }

    /// Add an implied child permission.
    pub fn child(mut self, name: impl AsRef<str>, value: bool) -> BastionResult<Self> {
        self.children.insert(PermissionKey::new(name)?, value);
        Ok(self)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
