//! In-memory, TOML-loadable permission registry.
//!
//! `InMemoryRegistry` implements `PermissionRegistry` from bastion-core. It
//! owns the node table, the per-class default sets and a `SubscriptionIndex`.
//!
//! The registry never recalculates principals itself. Mutations return the set
//! of principals whose effective maps may now be stale, and the host calls
//! `Permissible::recalculate` on each of them.
//!
//! Default sets:
//!
//! - A node belongs to the default set of an operator class when its policy
//!   resolves to `true` for that class.
//! - Both sets are recomputed whenever a node is added, removed or has its
//!   policy changed, and are kept sorted by name.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use bastion_contracts::{
    error::{BastionError, BastionResult},
    key::PermissionKey,
    node::{DefaultPolicy, PermissionNode},
    principal::PrincipalId,
};
use bastion_core::{subscription::SubscriptionIndex, traits::PermissionRegistry};

use crate::config::RegistryConfig;

#[derive(Debug, Default)]
struct RegistryState {
    nodes: BTreeMap<PermissionKey, Arc<PermissionNode>>,
    op_defaults: Vec<Arc<PermissionNode>>,
    non_op_defaults: Vec<Arc<PermissionNode>>,
    fallback: DefaultPolicy,
    generation: u64,
}

impl RegistryState {
    /// Called after every change to the node table.
    fn recompute_defaults(&mut self) {
        self.generation += 1;
        let select = |is_operator: bool| -> Vec<Arc<PermissionNode>> {
            self.nodes
                .values()
                .filter(|node| node.default.resolve(is_operator))
                .cloned()
                .collect()
        };
        let op = select(true);
        let non_op = select(false);
        self.op_defaults = op;
        self.non_op_defaults = non_op;
    }

    fn defaults(&self, is_operator: bool) -> &[Arc<PermissionNode>] {
        if is_operator {
            &self.op_defaults
        } else {
            &self.non_op_defaults
        }
    }
}

/// A `PermissionRegistry` backed by in-memory maps.
///
/// Construct empty with `new`, or from configuration with `from_toml_str` /
/// `from_file`, then share it as an `Arc` with every `Permissible`.
///
/// ```rust,ignore
/// use bastion_registry::InMemoryRegistry;
///
/// let registry = Arc::new(InMemoryRegistry::from_file(Path::new("registries/server.toml"))?);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
    subscriptions: SubscriptionIndex,
}

impl InMemoryRegistry {
    /// An empty registry with the default fallback policy (`op`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from an already-parsed configuration.
    ///
    /// Returns `BastionError::ConfigError` if two definitions normalize to the
    /// same name. Cycles in the child graph are allowed and only logged.
    pub fn from_config(config: RegistryConfig) -> BastionResult<Self> {
        let mut state = RegistryState {
            fallback: config.fallback,
            ..RegistryState::default()
        };
        for node in config.permissions {
            if state.nodes.contains_key(&node.name) {
                return Err(BastionError::ConfigError {
                    reason: format!("duplicate permission '{}'", node.name),
                });
            }
            state.nodes.insert(node.name.clone(), Arc::new(node));
        }
        state.recompute_defaults();

        let registry = Self {
            state: RwLock::new(state),
            subscriptions: SubscriptionIndex::new(),
        };
        for permission in registry.find_cycles() {
            warn!(
                permission = %permission,
                "registry child graph contains a cycle; resolution will truncate it"
            );
        }
        debug!(
            permissions = registry.len(),
            fallback = %registry.fallback_policy(),
            "permission registry loaded"
        );
        Ok(registry)
    }

    /// Parse `s` as TOML and build a registry.
    ///
    /// Returns `BastionError::ConfigError` if the TOML is malformed, does not
    /// match `RegistryConfig`, or declares a permission twice.
    pub fn from_toml_str(s: &str) -> BastionResult<Self> {
        let config: RegistryConfig = toml::from_str(s).map_err(|e| BastionError::ConfigError {
            reason: format!("failed to parse registry TOML: {}", e),
        })?;
        Self::from_config(config)
    }

    /// Read the file at `path` and parse it as registry configuration.
    pub fn from_file(path: &Path) -> BastionResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BastionError::ConfigError {
            reason: format!("failed to read registry file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    /// Register a new permission.
    ///
    /// Returns the principals to recalculate: everyone subscribed to the key
    /// (their attachments may now propagate children) and everyone in an
    /// operator class whose default set gained the node.
    ///
    /// Returns `BastionError::InvalidArgument` if the name is already taken.
    pub fn add_permission(&self, node: PermissionNode) -> BastionResult<BTreeSet<PrincipalId>> {
        let key = node.name.clone();
        let policy = node.default;
        {
            let mut state = self.write();
            if state.nodes.contains_key(&key) {
                return Err(BastionError::InvalidArgument {
                    reason: format!("permission '{}' is already registered", key),
                });
            }
            state.nodes.insert(key.clone(), Arc::new(node));
            state.recompute_defaults();
        }

        let affected = self.affected(&key, |is_operator| policy.resolve(is_operator));
        info!(permission = %key, default = %policy, affected = affected.len(), "permission added");
        Ok(affected)
    }

    /// Unregister a permission. Unknown names are a no-op with no affected
    /// principals.
    pub fn remove_permission(&self, name: &str) -> BastionResult<BTreeSet<PrincipalId>> {
        let key = PermissionKey::new(name)?;
        let removed = {
            let mut state = self.write();
            let removed = state.nodes.remove(&key);
            if removed.is_some() {
                state.recompute_defaults();
            }
            removed
        };

        let Some(node) = removed else {
            debug!(permission = %key, "remove_permission: not registered");
            return Ok(BTreeSet::new());
        };
        let affected = self.affected(&key, |is_operator| node.default.resolve(is_operator));
        info!(permission = %key, affected = affected.len(), "permission removed");
        Ok(affected)
    }

    /// Change the default policy of a registered permission.
    ///
    /// Returns `BastionError::InvalidArgument` for unknown names.
    pub fn set_default(
        &self,
        name: &str,
        policy: DefaultPolicy,
    ) -> BastionResult<BTreeSet<PrincipalId>> {
        let key = PermissionKey::new(name)?;
        let previous = {
            let mut state = self.write();
            let current = state
                .nodes
                .get(&key)
                .cloned()
                .ok_or_else(|| BastionError::InvalidArgument {
                    reason: format!("permission '{}' is not registered", key),
                })?;
            if current.default == policy {
                return Ok(BTreeSet::new());
            }
            let mut updated = PermissionNode::clone(&current);
            updated.default = policy;
            state.nodes.insert(key.clone(), Arc::new(updated));
            state.recompute_defaults();
            current.default
        };

        let affected = self.affected(&key, |is_operator| {
            previous.resolve(is_operator) != policy.resolve(is_operator)
        });
        info!(
            permission = %key,
            from = %previous,
            to = %policy,
            affected = affected.len(),
            "default policy changed"
        );
        Ok(affected)
    }

    /// Change the policy used for names with no registered node.
    ///
    /// Fallback answers are computed at check time, so no principal needs
    /// recalculating.
    pub fn set_fallback(&self, policy: DefaultPolicy) {
        self.write().fallback = policy;
        info!(fallback = %policy, "fallback policy changed");
    }

    // ── Introspection ────────────────────────────────────────────────────────

    /// Every registered node, sorted by name.
    pub fn permissions(&self) -> Vec<Arc<PermissionNode>> {
        self.read().nodes.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The subscription index principals register themselves in.
    pub fn subscriptions(&self) -> &SubscriptionIndex {
        &self.subscriptions
    }

    /// Nodes that close a cycle in the child graph, in discovery order.
    ///
    /// Children that are not registered nodes are leaves.
    pub fn find_cycles(&self) -> Vec<PermissionKey> {
        let state = self.read();
        let mut done: HashSet<PermissionKey> = HashSet::new();
        let mut cycles = Vec::new();
        for key in state.nodes.keys() {
            let mut path = Vec::new();
            visit(&state.nodes, key, &mut path, &mut done, &mut cycles);
        }
        cycles
    }

    /// Returns `BastionError::RegistryCycle` naming the first node that closes
    /// a cycle, for hosts that want to refuse cyclic registries up front.
    pub fn ensure_acyclic(&self) -> BastionResult<()> {
        match self.find_cycles().into_iter().next() {
            Some(permission) => Err(BastionError::RegistryCycle {
                permission: permission.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Principals subscribed to `key`, plus the operator classes for which
    /// `class_changed` holds.
    fn affected(
        &self,
        key: &PermissionKey,
        class_changed: impl Fn(bool) -> bool,
    ) -> BTreeSet<PrincipalId> {
        let mut affected = self.subscriptions.subscribers(key);
        for is_operator in [false, true] {
            if class_changed(is_operator) {
                affected.extend(self.subscriptions.operator_class_subscribers(is_operator));
            }
        }
        affected
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Depth-first walk recording back edges. `path` is the active stack.
fn visit(
    nodes: &BTreeMap<PermissionKey, Arc<PermissionNode>>,
    key: &PermissionKey,
    path: &mut Vec<PermissionKey>,
    done: &mut HashSet<PermissionKey>,
    cycles: &mut Vec<PermissionKey>,
) {
    if done.contains(key) {
        return;
    }
    if path.contains(key) {
        if !cycles.contains(key) {
            cycles.push(key.clone());
        }
        return;
    }
    let Some(node) = nodes.get(key) else {
        return;
    };
    path.push(key.clone());
    for child in node.children.keys() {
        visit(nodes, child, path, done, cycles);
    }
    path.pop();
    done.insert(key.clone());
}

impl PermissionRegistry for InMemoryRegistry {
    fn default_permissions(&self, is_operator: bool) -> Vec<Arc<PermissionNode>> {
        self.read().defaults(is_operator).to_vec()
    }

    fn node(&self, key: &PermissionKey) -> Option<Arc<PermissionNode>> {
        self.read().nodes.get(key).cloned()
    }

    fn fallback_policy(&self) -> DefaultPolicy {
        self.read().fallback
    }

    fn generation(&self) -> u64 {
        self.read().generation
    }

    fn subscribe_to_defaults(&self, is_operator: bool, principal: &PrincipalId) {
        self.subscriptions.subscribe_operator_class(principal, is_operator);
    }

    fn unsubscribe_from_defaults(&self, is_operator: bool, principal: &PrincipalId) {
        self.subscriptions.unsubscribe_operator_class(principal, is_operator);
    }

    fn subscribe_to_permission(&self, key: &PermissionKey, principal: &PrincipalId) {
        self.subscriptions.subscribe(principal, key);
    }

    fn unsubscribe_from_permission(&self, key: &PermissionKey, principal: &PrincipalId) {
        self.subscriptions.unsubscribe(principal, key);
    }
}
