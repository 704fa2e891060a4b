//! Reverse index from permissions (and operator classes) to principals.
//!
//! The registry uses this to answer "who has to be recalculated?" when a
//! definition or a default set changes, without scanning every principal.
//! A forward map per principal is kept alongside so that a principal's
//! entries can be dropped in one step.
//!
//! Subscriptions are counted. Several permission states may subscribe under
//! one principal id (a command sender backed by a player, for instance); each
//! subscribe must be paired with one unsubscribe, and the principal stays
//! listed until the last one is released.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use bastion_contracts::{key::PermissionKey, principal::PrincipalId};

type Counts = BTreeMap<PrincipalId, usize>;

#[derive(Debug, Default)]
struct IndexState {
    by_key: HashMap<PermissionKey, Counts>,
    by_principal: HashMap<PrincipalId, BTreeSet<PermissionKey>>,
    operators: Counts,
    non_operators: Counts,
}

impl IndexState {
    fn class_mut(&mut self, is_operator: bool) -> &mut Counts {
        if is_operator {
            &mut self.operators
        } else {
            &mut self.non_operators
        }
    }

    fn class(&self, is_operator: bool) -> &Counts {
        if is_operator {
            &self.operators
        } else {
            &self.non_operators
        }
    }
}

/// Increment `principal`'s count. Returns `true` for the first reference.
fn acquire(counts: &mut Counts, principal: &PrincipalId) -> bool {
    let count = counts.entry(principal.clone()).or_insert(0);
    *count += 1;
    *count == 1
}

/// Decrement `principal`'s count. Returns `true` when the last reference went.
fn release(counts: &mut Counts, principal: &PrincipalId) -> bool {
    match counts.get_mut(principal) {
        Some(count) if *count > 1 => {
            *count -= 1;
            false
        }
        Some(_) => {
            counts.remove(principal);
            true
        }
        None => false,
    }
}

/// What one principal is currently subscribed to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subscriptions {
    pub keys: BTreeSet<PermissionKey>,
    /// Operator classes (`true` = operators) whose default set this principal follows.
    pub operator_classes: BTreeSet<bool>,
}

/// Thread-safe subscription index.
///
/// All operations take `&self`; the index is meant to live inside a shared
/// registry. Lock poisoning is tolerated because every mutation leaves the
/// maps consistent before it can panic.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    state: RwLock<IndexState>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, principal: &PrincipalId, key: &PermissionKey) {
        let mut state = self.write();
        if acquire(state.by_key.entry(key.clone()).or_default(), principal) {
            state
                .by_principal
                .entry(principal.clone())
                .or_default()
                .insert(key.clone());
        }
    }

    /// Release one reference. Unbalanced calls are ignored.
    pub fn unsubscribe(&self, principal: &PrincipalId, key: &PermissionKey) {
        let mut state = self.write();
        let Some(counts) = state.by_key.get_mut(key) else {
            return;
        };
        if !release(counts, principal) {
            return;
        }
        if counts.is_empty() {
            state.by_key.remove(key);
        }
        if let Some(keys) = state.by_principal.get_mut(principal) {
            keys.remove(key);
            if keys.is_empty() {
                state.by_principal.remove(principal);
            }
        }
    }

    pub fn subscribe_operator_class(&self, principal: &PrincipalId, is_operator: bool) {
        acquire(self.write().class_mut(is_operator), principal);
    }

    pub fn unsubscribe_operator_class(&self, principal: &PrincipalId, is_operator: bool) {
        release(self.write().class_mut(is_operator), principal);
    }

    /// Principals whose effective state depends on `key`.
    pub fn subscribers(&self, key: &PermissionKey) -> BTreeSet<PrincipalId> {
        self.read()
            .by_key
            .get(key)
            .map(|counts| counts.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Principals following the default set of the given operator class.
    pub fn operator_class_subscribers(&self, is_operator: bool) -> BTreeSet<PrincipalId> {
        self.read().class(is_operator).keys().cloned().collect()
    }

    pub fn subscriptions_of(&self, principal: &PrincipalId) -> Subscriptions {
        let state = self.read();
        let keys = state
            .by_principal
            .get(principal)
            .cloned()
            .unwrap_or_default();
        let operator_classes = [false, true]
            .into_iter()
            .filter(|class| state.class(*class).contains_key(principal))
            .collect();
        Subscriptions {
            keys,
            operator_classes,
        }
    }

    /// Remove every entry for `principal`, whatever its counts. Returns how
    /// many permission subscriptions were dropped.
    pub fn clear_principal(&self, principal: &PrincipalId) -> usize {
        let mut state = self.write();
        let keys = state.by_principal.remove(principal).unwrap_or_default();
        for key in &keys {
            if let Some(counts) = state.by_key.get_mut(key) {
                counts.remove(principal);
                if counts.is_empty() {
                    state.by_key.remove(key);
                }
            }
        }
        state.operators.remove(principal);
        state.non_operators.remove(principal);
        keys.len()
    }

    /// Number of distinct permission keys with at least one subscriber.
    pub fn key_count(&self) -> usize {
        self.read().by_key.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> PermissionKey {
        PermissionKey::new(name).unwrap()
    }

    fn pid(name: &str) -> PrincipalId {
        PrincipalId::new(name)
    }

    #[test]
    fn subscribe_is_visible_in_both_directions() {
        let index = SubscriptionIndex::new();
        index.subscribe(&pid("alex"), &key("world.build"));
        index.subscribe(&pid("sam"), &key("world.build"));
        index.subscribe(&pid("alex"), &key("chat.send"));

        let builders: Vec<_> = index.subscribers(&key("world.build")).into_iter().collect();
        assert_eq!(builders, vec![pid("alex"), pid("sam")]);

        let alex = index.subscriptions_of(&pid("alex"));
        assert_eq!(alex.keys.len(), 2);
        assert!(alex.operator_classes.is_empty());
    }

    #[test]
    fn unsubscribe_prunes_empty_entries() {
        let index = SubscriptionIndex::new();
        index.subscribe(&pid("alex"), &key("a"));
        index.unsubscribe(&pid("alex"), &key("a"));

        assert!(index.subscribers(&key("a")).is_empty());
        assert_eq!(index.key_count(), 0);
        assert_eq!(index.subscriptions_of(&pid("alex")), Subscriptions::default());
    }

    #[test]
    fn operator_classes_are_independent() {
        let index = SubscriptionIndex::new();
        index.subscribe_operator_class(&pid("console"), true);
        index.subscribe_operator_class(&pid("alex"), false);

        assert!(index.operator_class_subscribers(true).contains(&pid("console")));
        assert!(!index.operator_class_subscribers(true).contains(&pid("alex")));

        index.unsubscribe_operator_class(&pid("console"), true);
        assert!(index.operator_class_subscribers(true).is_empty());
        assert_eq!(index.operator_class_subscribers(false).len(), 1);
    }

    #[test]
    fn shared_principal_stays_subscribed_until_last_release() {
        let index = SubscriptionIndex::new();
        index.subscribe(&pid("alex"), &key("build"));
        index.subscribe(&pid("alex"), &key("build"));
        index.subscribe_operator_class(&pid("alex"), false);
        index.subscribe_operator_class(&pid("alex"), false);

        index.unsubscribe(&pid("alex"), &key("build"));
        index.unsubscribe_operator_class(&pid("alex"), false);
        let alex = index.subscriptions_of(&pid("alex"));
        assert_eq!(alex.keys.into_iter().collect::<Vec<_>>(), vec![key("build")]);
        assert_eq!(alex.operator_classes.into_iter().collect::<Vec<_>>(), vec![false]);

        index.unsubscribe(&pid("alex"), &key("build"));
        index.unsubscribe_operator_class(&pid("alex"), false);
        assert_eq!(index.subscriptions_of(&pid("alex")), Subscriptions::default());
        assert_eq!(index.key_count(), 0);
    }

    #[test]
    fn unbalanced_unsubscribe_is_ignored() {
        let index = SubscriptionIndex::new();
        index.unsubscribe(&pid("alex"), &key("a"));
        index.unsubscribe_operator_class(&pid("alex"), true);

        index.subscribe(&pid("alex"), &key("a"));
        index.unsubscribe(&pid("sam"), &key("a"));
        assert_eq!(index.subscribers(&key("a")).len(), 1);
    }

    #[test]
    fn clear_principal_leaves_other_principals_alone() {
        let index = SubscriptionIndex::new();
        index.subscribe(&pid("alex"), &key("a"));
        index.subscribe(&pid("alex"), &key("a"));
        index.subscribe(&pid("alex"), &key("b"));
        index.subscribe(&pid("sam"), &key("b"));
        index.subscribe_operator_class(&pid("alex"), false);

        assert_eq!(index.clear_principal(&pid("alex")), 2);

        assert!(index.subscribers(&key("a")).is_empty());
        assert_eq!(index.subscribers(&key("b")).len(), 1);
        assert!(index.operator_class_subscribers(false).is_empty());
        assert_eq!(index.subscriptions_of(&pid("alex")), Subscriptions::default());
    }
}
