//! Collaborator trait definitions for the BASTION engine.
//!
//! The engine owns resolution, attachments and decisions. Everything else is
//! reached through one of these seams:
//!
//! - `PermissionRegistry`: permission definitions, defaults, subscriptions
//! - `DecisionInterceptor`: observes and may override every check
//! - `Scheduler`: one-shot delayed tasks for expiring attachments
//! - `OperatorStatus`: the binary operator flag of a principal
//! - `AttachmentOwner`: whoever contributes an attachment (e.g. a plugin)

use std::sync::Arc;

use bastion_contracts::{
    decision::DecisionRecord,
    error::BastionResult,
    key::PermissionKey,
    node::{DefaultPolicy, PermissionNode},
    principal::PrincipalId,
};

/// The process-wide source of permission definitions.
///
/// Implementations are shared by every principal and must synchronize
/// internally. The engine only queries definitions; it mutates nothing except
/// its own subscriptions.
pub trait PermissionRegistry: Send + Sync {
    /// Every node whose default policy grants it to the given operator class.
    fn default_permissions(&self, is_operator: bool) -> Vec<Arc<PermissionNode>>;

    /// Look up a single definition.
    fn node(&self, key: &PermissionKey) -> Option<Arc<PermissionNode>>;

    /// Policy applied to names the registry has never heard of.
    fn fallback_policy(&self) -> DefaultPolicy {
        DefaultPolicy::default()
    }

    /// A counter that moves on every change to definitions or default sets.
    ///
    /// A principal re-resolves when it moved during a recalculation. Registries
    /// that never change after construction can keep the default.
    fn generation(&self) -> u64 {
        0
    }

    /// Record that `principal` must be recalculated when the default set for
    /// `is_operator` changes.
    ///
    /// Subscriptions are counted per principal: several states may subscribe
    /// under one id, and each call is paired with exactly one unsubscribe.
    fn subscribe_to_defaults(&self, is_operator: bool, principal: &PrincipalId);

    fn unsubscribe_from_defaults(&self, is_operator: bool, principal: &PrincipalId);

    /// Record that `principal`'s effective state depends on `key`.
    fn subscribe_to_permission(&self, key: &PermissionKey, principal: &PrincipalId);

    fn unsubscribe_from_permission(&self, key: &PermissionKey, principal: &PrincipalId);
}

/// A hook invoked synchronously for every permission check.
///
/// Interceptors run in registration order. Each receives the record produced
/// by the previous one and may change `allowed`.
pub trait DecisionInterceptor: Send + Sync {
    fn intercept(&self, record: &mut DecisionRecord);
}

impl<F> DecisionInterceptor for F
where
    F: Fn(&mut DecisionRecord) + Send + Sync,
{
    fn intercept(&self, record: &mut DecisionRecord) {
        self(record)
    }
}

/// Opaque handle to a task registered with a `Scheduler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(pub u64);

/// A deferred unit of work.
pub type ScheduledTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs one-shot tasks after a delay measured in ticks.
///
/// Implementations must never run `task` on the calling thread before
/// `schedule_once_after` returns; callers may hold locks across the call.
pub trait Scheduler: Send + Sync {
    /// Register `task` to run once, `ticks` ticks from now.
    ///
    /// Must fail promptly (never block indefinitely) when the task cannot be
    /// accepted.
    fn schedule_once_after(&self, ticks: u64, task: ScheduledTask) -> BastionResult<TaskHandle>;

    /// Drop a pending task. Returns false when it already ran or never existed.
    fn cancel(&self, handle: TaskHandle) -> bool;
}

/// The operator flag of a principal, owned outside the engine.
pub trait OperatorStatus: Send + Sync {
    fn is_operator(&self) -> bool;

    fn set_operator(&self, value: bool);
}

/// The contributor of an attachment.
///
/// Disabled owners may not create new attachments.
pub trait AttachmentOwner: Send + Sync {
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool;
}
