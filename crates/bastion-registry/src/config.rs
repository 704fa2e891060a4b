//! Registry configuration schema.
//!
//! A `RegistryConfig` is deserialized from TOML and holds the global fallback
//! policy plus the list of permission definitions. Names are normalized on
//! load, so `World.Build` and `world.build` declare the same node.

use serde::{Deserialize, Serialize};

use bastion_contracts::node::{DefaultPolicy, PermissionNode};

/// The top-level structure deserialized from a TOML registry file.
///
/// Example:
/// ```toml
/// fallback = "op"
///
/// [[permissions]]
/// name = "world.build"
/// description = "Place blocks"
/// default = "true"
/// children = { "world.break" = false }
/// ```
///
/// `default` accepts `true`, `false`, `op` and `not-op` (plus the usual
/// spellings such as `isop` or `!op`). Omitted defaults are `op`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Policy applied to names with no registered node.
    #[serde(default)]
    pub fallback: DefaultPolicy,

    /// Permission definitions, in declaration order.
    #[serde(default)]
    pub permissions: Vec<PermissionNode>,
}
