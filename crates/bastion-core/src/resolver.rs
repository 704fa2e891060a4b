//! Effective-map resolution.
//!
//! `resolve` is a pure function of (registry, operator status, attachment
//! stack). It is the only producer of effective maps in the engine; the
//! `Permissible` publishes its output and mirrors the subscription set into
//! the registry.
//!
//! Algorithm:
//!
//! 1. Fetch the registry's default set for the operator class (one query),
//!    ordered by name.
//! 2. Every default node is granted with no source, then its children are
//!    propagated with `invert = false`.
//! 3. Every attachment, oldest first, writes each explicit value with itself
//!    as source, then propagates the node's children with `invert = !value`.
//! 4. Propagating a child writes `value ^ invert` and, if the child is itself
//!    a registered node, recurses into its children with `invert = !resolved`.
//!
//! Later writes overwrite earlier ones, which is what makes attachments beat
//! defaults and newer attachments beat older ones.
//!
//! The registry's child graph may be cyclic, and shared children may be
//! reachable along many paths. Within one top-level pass (one default node, or
//! one key of one attachment) each `(node, invert)` pair is expanded at most
//! once, so a pass costs at most two expansions per registered node. A pair
//! met again while it is still on the active path closes a cycle: the branch
//! is truncated and the node is reported once in `Resolution::cycles`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use bastion_contracts::{
    effective::EffectiveEntry,
    key::PermissionKey,
    node::PermissionNode,
    principal::AttachmentId,
};

use crate::{attachment::Attachment, traits::PermissionRegistry};

/// The output of one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// The operator status the defaults were resolved for.
    pub operator: bool,
    /// The memoized permission table.
    pub effective: HashMap<PermissionKey, EffectiveEntry>,
    /// Every key the pass touched; mirrors the keys of `effective`.
    pub subscriptions: BTreeSet<PermissionKey>,
    /// Nodes whose expansion was cut short because they closed a cycle, each
    /// listed once in discovery order.
    pub cycles: Vec<PermissionKey>,
}

impl Resolution {
    /// An empty table for the given operator status.
    pub fn empty(operator: bool) -> Self {
        Self {
            operator,
            ..Self::default()
        }
    }

    /// Entries sorted by key.
    pub fn sorted_entries(&self) -> Vec<EffectiveEntry> {
        let mut entries: Vec<EffectiveEntry> = self.effective.values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }
}

/// Resolve the effective permission table for one principal.
pub fn resolve(
    registry: &dyn PermissionRegistry,
    is_operator: bool,
    attachments: &[Attachment],
) -> Resolution {
    let mut walk = Walk {
        registry,
        resolution: Resolution::empty(is_operator),
        path: HashSet::new(),
        expanded: HashSet::new(),
    };

    let mut defaults = registry.default_permissions(is_operator);
    defaults.sort_by(|a, b| a.name.cmp(&b.name));

    for node in &defaults {
        walk.begin_pass();
        walk.write(&node.name, true, None);
        walk.expand(node, false, None);
    }

    for attachment in attachments {
        let source = Some(attachment.id());
        for (key, value) in attachment.permissions() {
            walk.begin_pass();
            walk.write(key, *value, source);
            if let Some(node) = registry.node(key) {
                walk.expand(&node, !*value, source);
            }
        }
    }

    let resolution = walk.resolution;
    debug!(
        operator = is_operator,
        defaults = defaults.len(),
        attachments = attachments.len(),
        entries = resolution.effective.len(),
        cycles = resolution.cycles.len(),
        "resolved effective permissions"
    );
    resolution
}

struct Walk<'a> {
    registry: &'a dyn PermissionRegistry,
    resolution: Resolution,
    /// Pairs on the active propagation path.
    path: HashSet<(PermissionKey, bool)>,
    /// Pairs already expanded in the current top-level pass.
    expanded: HashSet<(PermissionKey, bool)>,
}

impl Walk<'_> {
    fn begin_pass(&mut self) {
        self.expanded.clear();
    }

    fn write(&mut self, key: &PermissionKey, value: bool, source: Option<AttachmentId>) {
        self.resolution.effective.insert(
            key.clone(),
            EffectiveEntry {
                key: key.clone(),
                value,
                source,
            },
        );
        self.resolution.subscriptions.insert(key.clone());
    }

    /// Propagate `node`'s children unless `(node, invert)` was already expanded
    /// in this pass.
    fn expand(&mut self, node: &PermissionNode, invert: bool, source: Option<AttachmentId>) {
        if node.children.is_empty() {
            return;
        }
        let marker = (node.name.clone(), invert);
        if self.path.contains(&marker) {
            self.record_cycle(&node.name);
            return;
        }
        if !self.expanded.insert(marker.clone()) {
            return;
        }
        self.path.insert(marker.clone());
        self.propagate(&node.children, invert, source);
        self.path.remove(&marker);
    }

    fn record_cycle(&mut self, name: &PermissionKey) {
        if self.resolution.cycles.contains(name) {
            return;
        }
        warn!(
            permission = %name,
            "permission child graph contains a cycle; truncating branch"
        );
        self.resolution.cycles.push(name.clone());
    }

    fn propagate(
        &mut self,
        children: &BTreeMap<PermissionKey, bool>,
        invert: bool,
        source: Option<AttachmentId>,
    ) {
        for (child, value) in children {
            let resolved = *value ^ invert;
            self.write(child, resolved, source);
            if let Some(node) = self.registry.node(child) {
                self.expand(&node, !resolved, source);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use bastion_contracts::{node::DefaultPolicy, principal::PrincipalId};

    use super::*;
    use crate::testing::{key, MockRegistry, TestOwner};

    fn attachment(values: &[(&str, bool)]) -> Attachment {
        let mut attachment = Attachment::new(TestOwner::new("test-plugin")).unwrap();
        for (name, value) in values {
            attachment.set_permission(name, *value).unwrap();
        }
        attachment
    }

    fn value(resolution: &Resolution, name: &str) -> Option<bool> {
        resolution.effective.get(&key(name)).map(|e| e.value)
    }

    #[test]
    fn defaults_are_granted_with_no_source() {
        let registry = MockRegistry::new();
        registry.define(PermissionNode::new("chat.send", DefaultPolicy::AlwaysTrue).unwrap());
        registry.define(PermissionNode::new("kick", DefaultPolicy::TrueIfOperator).unwrap());

        let player = resolve(&registry, false, &[]);
        assert_eq!(value(&player, "chat.send"), Some(true));
        assert_eq!(value(&player, "kick"), None);
        assert!(player.effective[&key("chat.send")].is_default());

        let op = resolve(&registry, true, &[]);
        assert_eq!(value(&op, "kick"), Some(true));
        assert!(op.operator);
    }

    #[test]
    fn child_values_invert_on_negative_grant() {
        let registry = MockRegistry::new();
        registry.define(
            PermissionNode::new("build", DefaultPolicy::AlwaysTrue)
                .unwrap()
                .child("break", false)
                .unwrap(),
        );

        let granted = resolve(&registry, false, &[]);
        assert_eq!(value(&granted, "build"), Some(true));
        assert_eq!(value(&granted, "break"), Some(false));

        let denied = resolve(&registry, false, &[attachment(&[("build", false)])]);
        assert_eq!(value(&denied, "build"), Some(false));
        assert_eq!(value(&denied, "break"), Some(true));
    }

    #[test]
    fn nested_children_follow_the_inversion_chain() {
        let registry = MockRegistry::new();
        registry.define(
            PermissionNode::new("admin", DefaultPolicy::AlwaysFalse)
                .unwrap()
                .child("mod", true)
                .unwrap(),
        );
        registry.define(
            PermissionNode::new("mod", DefaultPolicy::AlwaysFalse)
                .unwrap()
                .child("kick", true)
                .unwrap(),
        );

        let resolution = resolve(&registry, false, &[attachment(&[("admin", true)])]);
        let source = resolution.effective[&key("admin")].source;

        // admin=true expands with invert=false, mod=true expands with invert=false.
        assert_eq!(value(&resolution, "mod"), Some(true));
        assert_eq!(value(&resolution, "kick"), Some(true));
        assert_eq!(resolution.effective[&key("kick")].source, source);

        let denied = resolve(&registry, false, &[attachment(&[("admin", false)])]);
        // admin=false denies mod, and the negative grant of mod denies kick.
        assert_eq!(value(&denied, "mod"), Some(false));
        assert_eq!(value(&denied, "kick"), Some(false));
    }

    #[test]
    fn later_attachments_overwrite_earlier_ones() {
        let registry = MockRegistry::new();
        registry.define(PermissionNode::new("a", DefaultPolicy::AlwaysTrue).unwrap());

        let first = attachment(&[("a", false)]);
        let second = attachment(&[("a", true)]);
        let second_id = second.id();

        let resolution = resolve(&registry, false, &[first, second]);
        assert_eq!(value(&resolution, "a"), Some(true));
        assert_eq!(resolution.effective[&key("a")].source, Some(second_id));
    }

    #[test]
    fn unknown_names_on_attachments_are_still_effective() {
        let registry = MockRegistry::new();
        let resolution = resolve(&registry, false, &[attachment(&[("custom.flag", true)])]);
        assert_eq!(value(&resolution, "custom.flag"), Some(true));
    }

    #[test]
    fn two_node_cycle_terminates() {
        let registry = MockRegistry::new();
        registry.define(
            PermissionNode::new("x", DefaultPolicy::AlwaysTrue)
                .unwrap()
                .child("y", true)
                .unwrap(),
        );
        registry.define(
            PermissionNode::new("y", DefaultPolicy::AlwaysFalse)
                .unwrap()
                .child("x", true)
                .unwrap(),
        );

        let resolution = resolve(&registry, false, &[]);
        assert_eq!(value(&resolution, "x"), Some(true));
        assert_eq!(value(&resolution, "y"), Some(true));
        assert!(resolution.cycles.contains(&key("x")));
    }

    #[test]
    fn self_loop_under_attachment_terminates() {
        let registry = MockRegistry::new();
        registry.define(
            PermissionNode::new("loop", DefaultPolicy::AlwaysFalse)
                .unwrap()
                .child("loop", false)
                .unwrap(),
        );

        let resolution = resolve(&registry, false, &[attachment(&[("loop", true)])]);
        assert!(value(&resolution, "loop").is_some());
        assert!(!resolution.cycles.is_empty());
    }

    #[test]
    fn shared_children_in_acyclic_graphs_are_not_truncated() {
        let registry = MockRegistry::new();
        registry.define(
            PermissionNode::new("root", DefaultPolicy::AlwaysTrue)
                .unwrap()
                .child("left", true)
                .unwrap()
                .child("right", true)
                .unwrap(),
        );
        for side in ["left", "right"] {
            registry.define(
                PermissionNode::new(side, DefaultPolicy::AlwaysFalse)
                    .unwrap()
                    .child("leaf", false)
                    .unwrap(),
            );
        }

        let resolution = resolve(&registry, false, &[]);
        assert!(resolution.cycles.is_empty());
        assert!(value(&resolution, "leaf").is_some());
    }

    /// Counts node lookups so a test can bound the work of one resolution.
    struct CountingRegistry {
        inner: MockRegistry,
        lookups: AtomicUsize,
    }

    impl PermissionRegistry for CountingRegistry {
        fn default_permissions(&self, is_operator: bool) -> Vec<Arc<PermissionNode>> {
            self.inner.default_permissions(is_operator)
        }

        fn node(&self, key: &PermissionKey) -> Option<Arc<PermissionNode>> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            self.inner.node(key)
        }

        fn fallback_policy(&self) -> DefaultPolicy {
            self.inner.fallback_policy()
        }

        fn subscribe_to_defaults(&self, _: bool, _: &PrincipalId) {}
        fn unsubscribe_from_defaults(&self, _: bool, _: &PrincipalId) {}
        fn subscribe_to_permission(&self, _: &PermissionKey, _: &PrincipalId) {}
        fn unsubscribe_from_permission(&self, _: &PermissionKey, _: &PrincipalId) {}
    }

    #[test]
    fn dense_cyclic_graph_resolves_in_bounded_work() {
        // Every node lists every node (itself included) as a `true` child.
        const N: usize = 12;
        let names: Vec<String> = (0..N).map(|i| format!("n{i:02}")).collect();
        let registry = CountingRegistry {
            inner: MockRegistry::new(),
            lookups: AtomicUsize::new(0),
        };
        for name in &names {
            let mut node = PermissionNode::new(name, DefaultPolicy::AlwaysTrue).unwrap();
            for child in &names {
                node = node.child(child, true).unwrap();
            }
            registry.inner.define(node);
        }

        let resolution = resolve(&registry, false, &[attachment(&[("n00", false)])]);

        assert_eq!(resolution.effective.len(), N);
        let distinct: BTreeSet<&PermissionKey> = resolution.cycles.iter().collect();
        assert_eq!(distinct.len(), resolution.cycles.len(), "cycles listed twice");
        assert!(!resolution.cycles.is_empty());
        assert!(resolution.cycles.len() <= N);

        // N + 1 passes, each expanding at most 2N pairs of N children.
        let bound = (N + 1) * 2 * N * N + N;
        let lookups = registry.lookups.load(Ordering::Relaxed);
        assert!(lookups <= bound, "{lookups} node lookups exceeds {bound}");
    }

    #[test]
    fn resolution_is_idempotent_and_subscriptions_mirror_entries() {
        let registry = MockRegistry::new();
        registry.define(
            PermissionNode::new("build", DefaultPolicy::AlwaysTrue)
                .unwrap()
                .child("break", false)
                .unwrap()
                .child("place", true)
                .unwrap(),
        );
        registry.define(PermissionNode::new("fly", DefaultPolicy::TrueIfOperator).unwrap());

        let stack = vec![attachment(&[("fly", true)]), attachment(&[("place", false)])];
        let first = resolve(&registry, false, &stack);
        let second = resolve(&registry, false, &stack);

        assert_eq!(first, second);
        let keys: BTreeSet<PermissionKey> = first.effective.keys().cloned().collect();
        assert_eq!(keys, first.subscriptions);
    }
}
