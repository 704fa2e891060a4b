//! Per-principal permission state.
//!
//! A `Permissible` holds the attachment stack of one principal and the
//! effective map resolved from it. The invariant it maintains is simple: when
//! any mutating call returns, the published effective map is exactly what
//! `resolver::resolve` produces for the current attachments, registry defaults
//! and operator status.
//!
//! Concurrency model:
//!
//!   writers ── attachments mutex ── resolve ── swap subscriptions ── publish Arc
//!   readers ───────────────────────────────────── clone Arc ── lookup
//!
//! Writers are serialized by the attachment mutex, held for the whole rebuild.
//! The effective map is copy-on-write: readers clone the current `Arc` and
//! never observe a partially rebuilt table.
//!
//! Subscription swaps add before they remove: new keys and the new operator
//! class are subscribed first, then only the stale ones are released, so a
//! registry change landing mid-swap still finds this principal. If the
//! registry's generation moved while resolving, the pass is repeated.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use tracing::{debug, info, warn};

use bastion_contracts::{
    decision::{DecisionOrigin, DecisionRecord},
    effective::EffectiveEntry,
    error::{BastionError, BastionResult},
    key::PermissionKey,
    node::PermissionNode,
    principal::PrincipalId,
};

use crate::{
    attachment::{
        validate_owner, Attachment, AttachmentHandle, AttachmentInfo, AttachmentOptions, Expiry,
    },
    interceptor::InterceptorChain,
    resolver::{self, Resolution},
    traits::{AttachmentOwner, OperatorStatus, PermissionRegistry, Scheduler, TaskHandle},
};

/// Builder for a `Permissible`.
///
/// ```rust,ignore
/// let player = Permissible::builder(PrincipalId::new("player:alex"), registry)
///     .operator(op_flag)
///     .scheduler(scheduler)
///     .interceptors(chain)
///     .build();
/// ```
pub struct PermissibleBuilder {
    principal: PrincipalId,
    delegate: Option<PrincipalId>,
    registry: Arc<dyn PermissionRegistry>,
    operator: Option<Arc<dyn OperatorStatus>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    interceptors: Option<Arc<InterceptorChain>>,
}

impl PermissibleBuilder {
    /// Operator status provider. Without one the principal is never an operator.
    pub fn operator(mut self, operator: Arc<dyn OperatorStatus>) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Record subscriptions under `delegate` instead of the principal's own id.
    ///
    /// Used when the permission state backs another authority, e.g. a command
    /// sender wrapping a player. Several states may share one authority: the
    /// registry counts their subscriptions, so closing one leaves the others'
    /// in place.
    pub fn delegate(mut self, delegate: PrincipalId) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Scheduler used for self-expiring attachments.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Interceptor chain consulted on every check. Defaults to an empty chain.
    pub fn interceptors(mut self, interceptors: Arc<InterceptorChain>) -> Self {
        self.interceptors = Some(interceptors);
        self
    }

    /// Create the state and run its first recalculation.
    pub fn build(self) -> Arc<Permissible> {
        let authority = self.delegate.unwrap_or_else(|| self.principal.clone());
        let permissible = Arc::new_cyclic(|weak| Permissible {
            principal: self.principal,
            authority,
            registry: self.registry,
            operator: self.operator,
            scheduler: self.scheduler,
            interceptors: self.interceptors.unwrap_or_default(),
            attachments: Mutex::new(Vec::new()),
            published: RwLock::new(Arc::new(Resolution::default())),
            subscribed: Mutex::new(Subscribed::default()),
            this: weak.clone(),
        });
        permissible.recalculate();
        debug!(
            principal = %permissible.principal,
            authority = %permissible.authority,
            "permissible initialized"
        );
        permissible
    }
}

/// The permission state of one principal.
pub struct Permissible {
    principal: PrincipalId,
    /// The id recorded in registry subscriptions (the delegate, or `principal`).
    authority: PrincipalId,
    registry: Arc<dyn PermissionRegistry>,
    operator: Option<Arc<dyn OperatorStatus>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    interceptors: Arc<InterceptorChain>,
    attachments: Mutex<Vec<Attachment>>,
    published: RwLock<Arc<Resolution>>,
    /// Only touched with the attachments lock held.
    subscribed: Mutex<Subscribed>,
    this: Weak<Permissible>,
}

/// What this state currently holds in the registry's subscription index.
#[derive(Debug, Default)]
struct Subscribed {
    class: Option<bool>,
    keys: BTreeSet<PermissionKey>,
}

impl Permissible {
    pub fn builder(principal: PrincipalId, registry: Arc<dyn PermissionRegistry>) -> PermissibleBuilder {
        PermissibleBuilder {
            principal,
            delegate: None,
            registry,
            operator: None,
            scheduler: None,
            interceptors: None,
        }
    }

    pub fn principal(&self) -> &PrincipalId {
        &self.principal
    }

    /// The id this state subscribes under.
    pub fn authority(&self) -> &PrincipalId {
        &self.authority
    }

    // ── Operator status ──────────────────────────────────────────────────────

    pub fn is_operator(&self) -> bool {
        self.operator.as_ref().is_some_and(|o| o.is_operator())
    }

    /// Change operator status and recalculate.
    ///
    /// Returns `BastionError::OperatorUnsupported` if no provider was configured.
    pub fn set_operator(&self, value: bool) -> BastionResult<()> {
        let operator = self
            .operator
            .as_ref()
            .ok_or_else(|| BastionError::OperatorUnsupported {
                principal: self.principal.to_string(),
            })?;
        operator.set_operator(value);
        info!(principal = %self.principal, operator = value, "operator status changed");
        self.recalculate();
        Ok(())
    }

    // ── Checks ───────────────────────────────────────────────────────────────

    /// Decide whether this principal holds `name`.
    ///
    /// Returns `BastionError::InvalidArgument` for an empty name; otherwise the
    /// answer is always available, falling back to the registry's policies.
    pub fn check(&self, name: &str) -> BastionResult<bool> {
        let key = PermissionKey::new(name)?;
        Ok(self.check_key(&key))
    }

    /// Decide whether this principal holds `key`.
    ///
    /// Candidate order: effective map, then the registry node's default
    /// policy, then the registry's fallback policy. The candidate then passes
    /// through the interceptor chain.
    pub fn check_key(&self, key: &PermissionKey) -> bool {
        let is_operator = self.is_operator();
        let snapshot = self.snapshot();
        let (allowed, origin) = match snapshot.effective.get(key) {
            Some(entry) => (
                entry.value,
                DecisionOrigin::Effective {
                    source: entry.source,
                },
            ),
            None => match self.registry.node(key) {
                Some(node) => (node.default.resolve(is_operator), DecisionOrigin::NodeDefault),
                None => (
                    self.registry.fallback_policy().resolve(is_operator),
                    DecisionOrigin::Fallback,
                ),
            },
        };
        self.decide(key.clone(), is_operator, allowed, origin)
    }

    /// Decide whether this principal holds `node`, using the node's own
    /// default policy when nothing effective covers it.
    pub fn check_node(&self, node: &PermissionNode) -> bool {
        let is_operator = self.is_operator();
        let snapshot = self.snapshot();
        let (allowed, origin) = match snapshot.effective.get(&node.name) {
            Some(entry) => (
                entry.value,
                DecisionOrigin::Effective {
                    source: entry.source,
                },
            ),
            None => (node.default.resolve(is_operator), DecisionOrigin::NodeDefault),
        };
        self.decide(node.name.clone(), is_operator, allowed, origin)
    }

    /// True when the effective map holds a value for `name`, from defaults or
    /// from an attachment.
    pub fn is_explicitly_set(&self, name: &str) -> BastionResult<bool> {
        let key = PermissionKey::new(name)?;
        Ok(self.snapshot().effective.contains_key(&key))
    }

    /// The effective entry for `name`, with its source.
    pub fn explain(&self, name: &str) -> BastionResult<Option<EffectiveEntry>> {
        let key = PermissionKey::new(name)?;
        Ok(self.snapshot().effective.get(&key).cloned())
    }

    /// Snapshot of every effective entry, sorted by key.
    pub fn effective_permissions(&self) -> Vec<EffectiveEntry> {
        self.snapshot().sorted_entries()
    }

    /// Nodes truncated by the cycle guard during the last recalculation.
    pub fn cycles(&self) -> Vec<PermissionKey> {
        self.snapshot().cycles.clone()
    }

    fn decide(
        &self,
        key: PermissionKey,
        operator: bool,
        allowed: bool,
        origin: DecisionOrigin,
    ) -> bool {
        let record = DecisionRecord {
            principal: self.principal.clone(),
            operator,
            key,
            allowed,
            origin,
        };
        let decided = self.interceptors.dispatch(record);
        if decided.allowed != allowed {
            debug!(
                principal = %self.principal,
                permission = %decided.key,
                candidate = allowed,
                decided = decided.allowed,
                "interceptor overrode permission decision"
            );
        }
        decided.allowed
    }

    // ── Attachments ──────────────────────────────────────────────────────────

    /// Add an empty attachment for `owner`.
    pub fn add_attachment(&self, owner: Arc<dyn AttachmentOwner>) -> BastionResult<AttachmentHandle> {
        self.create_attachment(owner, AttachmentOptions::new())
    }

    /// Add an attachment seeded with one explicit value.
    pub fn add_attachment_with(
        &self,
        owner: Arc<dyn AttachmentOwner>,
        name: &str,
        value: bool,
    ) -> BastionResult<AttachmentHandle> {
        self.create_attachment(owner, AttachmentOptions::new().permission(name, value))
    }

    /// Add an empty attachment that removes itself after `ticks` ticks.
    pub fn add_expiring_attachment(
        &self,
        owner: Arc<dyn AttachmentOwner>,
        ticks: u64,
    ) -> BastionResult<AttachmentHandle> {
        self.create_attachment(owner, AttachmentOptions::new().expire_after(ticks))
    }

    /// Create, append and publish a new attachment.
    ///
    /// # Errors
    ///
    /// - `InvalidOwner` if the owner is disabled or unnamed
    /// - `InvalidArgument` if the seeded permission name is empty
    /// - `SchedulingFailed` if an expiry was requested and could not be
    ///   registered; nothing was published in that case
    pub fn create_attachment(
        &self,
        owner: Arc<dyn AttachmentOwner>,
        options: AttachmentOptions,
    ) -> BastionResult<AttachmentHandle> {
        let mut attachment = Attachment::new(owner)?;
        if let Some((name, value)) = &options.permission {
            attachment.set_permission(name, *value)?;
        }
        if let Some(callback) = options.on_removed {
            attachment.set_removal_callback(callback);
        }
        let handle = self.handle_for(&attachment);

        let mut attachments = self.lock_attachments();
        if let Some(ticks) = options.expiry_ticks {
            // Scheduled under the writer lock: an expiry racing on another
            // thread blocks until the attachment is in the list.
            let task = self.schedule_expiry(&handle, ticks)?;
            attachment.expiry = Some(Expiry { ticks, task });
        }
        self.adopt(&mut attachments, attachment);
        Ok(handle)
    }

    /// Adopt a detached attachment built with `Attachment::new`.
    pub fn attach(&self, attachment: Attachment) -> BastionResult<AttachmentHandle> {
        validate_owner(attachment.owner().as_ref())?;
        let handle = self.handle_for(&attachment);
        let mut attachments = self.lock_attachments();
        self.adopt(&mut attachments, attachment);
        Ok(handle)
    }

    /// Set one explicit value on a live attachment and recalculate.
    pub fn set_permission(
        &self,
        handle: &AttachmentHandle,
        name: &str,
        value: bool,
    ) -> BastionResult<()> {
        self.update_attachment(handle, |attachment| attachment.set_permission(name, value))
    }

    /// Remove one explicit value from a live attachment and recalculate.
    pub fn unset_permission(&self, handle: &AttachmentHandle, name: &str) -> BastionResult<bool> {
        self.update_attachment(handle, |attachment| attachment.unset_permission(name))
    }

    /// Apply several edits to a live attachment with a single recalculation.
    ///
    /// The map is recalculated even when `edit` fails part-way, so edits made
    /// before the failure are reflected.
    pub fn update_attachment<T>(
        &self,
        handle: &AttachmentHandle,
        edit: impl FnOnce(&mut Attachment) -> BastionResult<T>,
    ) -> BastionResult<T> {
        let mut attachments = self.lock_attachments();
        let position = self.position_of(&attachments, handle)?;
        let result = edit(&mut attachments[position]);
        self.rebuild(&attachments);
        result
    }

    /// Remove a live attachment.
    ///
    /// Returns `BastionError::NotAttached` (and changes nothing) when the
    /// handle is not in this principal's list. Otherwise cancels any pending
    /// expiry, recalculates, and runs the removal callback once the new map is
    /// published.
    pub fn remove_attachment(&self, handle: &AttachmentHandle) -> BastionResult<()> {
        let removed = {
            let mut attachments = self.lock_attachments();
            let position = self.position_of(&attachments, handle)?;
            let removed = attachments.remove(position);
            self.cancel_expiry(&removed);
            self.rebuild(&attachments);
            removed
        };
        info!(
            principal = %self.principal,
            attachment = %handle.id,
            owner = removed.owner().name(),
            "attachment removed"
        );
        removed.notify_removed();
        Ok(())
    }

    /// Snapshot of the live attachments in precedence order (oldest first).
    pub fn attachments(&self) -> Vec<AttachmentInfo> {
        self.lock_attachments().iter().map(Attachment::info).collect()
    }

    // ── Recalculation & teardown ─────────────────────────────────────────────

    /// Rebuild the effective map and subscriptions from current inputs.
    ///
    /// Mutations recalculate on their own; call this when the registry or the
    /// operator flag changed behind the engine's back.
    pub fn recalculate(&self) {
        let attachments = self.lock_attachments();
        self.rebuild(&attachments);
    }

    /// Release every attachment and drop every subscription.
    ///
    /// Removal callbacks run. Checks afterwards fall back to registry
    /// policies. Called automatically on drop.
    pub fn close(&self) {
        let released: Vec<Attachment> = {
            let mut attachments = self.lock_attachments();
            let released: Vec<Attachment> = attachments.drain(..).collect();
            for attachment in &released {
                self.cancel_expiry(attachment);
            }
            self.release_subscriptions();
            self.publish(Resolution::empty(self.is_operator()));
            released
        };
        if !released.is_empty() {
            info!(
                principal = %self.principal,
                released = released.len(),
                "permissible closed"
            );
        }
        for attachment in released {
            attachment.notify_removed();
        }
    }

    /// Resolve, swap subscriptions and publish. Caller holds the writer lock.
    fn rebuild(&self, attachments: &[Attachment]) {
        let is_operator = self.is_operator();
        let resolution = loop {
            let generation = self.registry.generation();
            let resolution = resolver::resolve(self.registry.as_ref(), is_operator, attachments);
            self.swap_subscriptions(&resolution);
            if self.registry.generation() == generation {
                break resolution;
            }
            debug!(
                principal = %self.principal,
                "registry changed during recalculation; resolving again"
            );
        };

        debug!(
            principal = %self.principal,
            operator = is_operator,
            entries = resolution.effective.len(),
            attachments = attachments.len(),
            "permissions recalculated"
        );
        self.publish(resolution);
    }

    /// Move the registry subscriptions to `next`, subscribing before releasing.
    fn swap_subscriptions(&self, next: &Resolution) {
        let mut held = self.lock_subscribed();
        for key in next.subscriptions.difference(&held.keys) {
            self.registry.subscribe_to_permission(key, &self.authority);
        }
        if held.class != Some(next.operator) {
            self.registry.subscribe_to_defaults(next.operator, &self.authority);
            if let Some(previous) = held.class {
                self.registry.unsubscribe_from_defaults(previous, &self.authority);
            }
        }
        for key in held.keys.difference(&next.subscriptions) {
            self.registry.unsubscribe_from_permission(key, &self.authority);
        }
        held.class = Some(next.operator);
        held.keys = next.subscriptions.clone();
    }

    fn release_subscriptions(&self) {
        let held = std::mem::take(&mut *self.lock_subscribed());
        for key in &held.keys {
            self.registry.unsubscribe_from_permission(key, &self.authority);
        }
        if let Some(class) = held.class {
            self.registry.unsubscribe_from_defaults(class, &self.authority);
        }
    }

    fn adopt(&self, attachments: &mut Vec<Attachment>, attachment: Attachment) {
        info!(
            principal = %self.principal,
            attachment = %attachment.id(),
            owner = attachment.owner().name(),
            explicit = attachment.permissions().len(),
            expires_after = attachment.expiry.map(|e| e.ticks),
            "attachment added"
        );
        attachments.push(attachment);
        self.rebuild(attachments);
    }

    fn schedule_expiry(
        &self,
        handle: &AttachmentHandle,
        ticks: u64,
    ) -> BastionResult<TaskHandle> {
        let scheduler = self.scheduler.as_ref().ok_or_else(|| {
            warn!(principal = %self.principal, "no scheduler configured for expiring attachment");
            BastionError::SchedulingFailed {
                reason: "no scheduler configured".to_string(),
            }
        })?;

        let this = self.this.clone();
        let expired = handle.clone();
        scheduler
            .schedule_once_after(
                ticks,
                Box::new(move || {
                    if let Some(permissible) = this.upgrade() {
                        permissible.expire(&expired);
                    }
                }),
            )
            .map_err(|e| {
                warn!(
                    principal = %self.principal,
                    attachment = %handle.id,
                    ticks,
                    error = %e,
                    "could not schedule attachment expiry"
                );
                match e {
                    BastionError::SchedulingFailed { .. } => e,
                    other => BastionError::SchedulingFailed {
                        reason: other.to_string(),
                    },
                }
            })
    }

    fn expire(&self, handle: &AttachmentHandle) {
        match self.remove_attachment(handle) {
            Ok(()) => info!(principal = %self.principal, attachment = %handle.id, "attachment expired"),
            Err(e) => debug!(
                principal = %self.principal,
                attachment = %handle.id,
                error = %e,
                "expiry found attachment already gone"
            ),
        }
    }

    fn cancel_expiry(&self, attachment: &Attachment) {
        if let (Some(expiry), Some(scheduler)) = (attachment.expiry, self.scheduler.as_ref()) {
            scheduler.cancel(expiry.task);
        }
    }

    fn position_of(
        &self,
        attachments: &[Attachment],
        handle: &AttachmentHandle,
    ) -> BastionResult<usize> {
        let found = if handle.principal == self.principal {
            attachments.iter().position(|a| a.id() == handle.id)
        } else {
            None
        };
        found.ok_or_else(|| BastionError::NotAttached {
            attachment: handle.id.to_string(),
            principal: self.principal.to_string(),
        })
    }

    fn handle_for(&self, attachment: &Attachment) -> AttachmentHandle {
        AttachmentHandle {
            id: attachment.id(),
            principal: self.principal.clone(),
        }
    }

    fn lock_attachments(&self) -> MutexGuard<'_, Vec<Attachment>> {
        self.attachments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribed(&self) -> MutexGuard<'_, Subscribed> {
        self.subscribed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Arc<Resolution> {
        Arc::clone(&self.published.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, resolution: Resolution) {
        *self.published.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(resolution);
    }
}

impl Drop for Permissible {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Permissible {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permissible")
            .field("principal", &self.principal)
            .field("authority", &self.authority)
            .field("operator", &self.is_operator())
            .field("effective", &self.snapshot().effective.len())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
