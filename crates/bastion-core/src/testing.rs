//! Hand-written collaborators shared by the unit tests in this crate.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bastion_contracts::{
    key::PermissionKey,
    node::{DefaultPolicy, PermissionNode},
    principal::PrincipalId,
};

use crate::{
    subscription::SubscriptionIndex,
    traits::{AttachmentOwner, OperatorStatus, PermissionRegistry},
};

pub(crate) fn key(name: &str) -> PermissionKey {
    PermissionKey::new(name).unwrap()
}

type RegistryHook = Box<dyn FnOnce(&MockRegistry) + Send>;

/// A registry backed by a plain map, with a real subscription index.
///
/// Every subscription call is also appended to `log` as `+key`, `-key`,
/// `+class:<bool>` or `-class:<bool>`.
#[derive(Default)]
pub(crate) struct MockRegistry {
    nodes: RwLock<BTreeMap<PermissionKey, Arc<PermissionNode>>>,
    pub(crate) index: SubscriptionIndex,
    pub(crate) fallback: RwLock<DefaultPolicy>,
    pub(crate) log: Mutex<Vec<String>>,
    generation: AtomicU64,
    after_defaults: Mutex<Option<RegistryHook>>,
}

impl MockRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn define(&self, node: PermissionNode) {
        self.nodes
            .write()
            .unwrap()
            .insert(node.name.clone(), Arc::new(node));
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Run `hook` once, right after the next default set has been read.
    pub(crate) fn after_next_defaults(&self, hook: impl FnOnce(&MockRegistry) + Send + 'static) {
        *self.after_defaults.lock().unwrap() = Some(Box::new(hook));
    }

    pub(crate) fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }

    fn record(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

impl PermissionRegistry for MockRegistry {
    fn default_permissions(&self, is_operator: bool) -> Vec<Arc<PermissionNode>> {
        let defaults = self
            .nodes
            .read()
            .unwrap()
            .values()
            .filter(|n| n.default.resolve(is_operator))
            .cloned()
            .collect();
        let hook = self.after_defaults.lock().unwrap().take();
        if let Some(hook) = hook {
            hook(self);
        }
        defaults
    }

    fn node(&self, key: &PermissionKey) -> Option<Arc<PermissionNode>> {
        self.nodes.read().unwrap().get(key).cloned()
    }

    fn fallback_policy(&self) -> DefaultPolicy {
        *self.fallback.read().unwrap()
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn subscribe_to_defaults(&self, is_operator: bool, principal: &PrincipalId) {
        self.record(format!("+class:{is_operator}"));
        self.index.subscribe_operator_class(principal, is_operator);
    }

    fn unsubscribe_from_defaults(&self, is_operator: bool, principal: &PrincipalId) {
        self.record(format!("-class:{is_operator}"));
        self.index.unsubscribe_operator_class(principal, is_operator);
    }

    fn subscribe_to_permission(&self, key: &PermissionKey, principal: &PrincipalId) {
        self.record(format!("+{key}"));
        self.index.subscribe(principal, key);
    }

    fn unsubscribe_from_permission(&self, key: &PermissionKey, principal: &PrincipalId) {
        self.record(format!("-{key}"));
        self.index.unsubscribe(principal, key);
    }
}

pub(crate) struct TestOwner {
    name: String,
    enabled: AtomicBool,
}

impl TestOwner {
    pub(crate) fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            enabled: AtomicBool::new(true),
        })
    }

    pub(crate) fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }
}

impl AttachmentOwner for TestOwner {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct TestOperator {
    flag: AtomicBool,
}

impl TestOperator {
    pub(crate) fn new(is_operator: bool) -> Arc<Self> {
        Arc::new(Self {
            flag: AtomicBool::new(is_operator),
        })
    }
}

impl OperatorStatus for TestOperator {
    fn is_operator(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn set_operator(&self, value: bool) {
        self.flag.store(value, Ordering::SeqCst);
    }
}
