//! # bastion-core
//!
//! Per-principal permission state for the BASTION engine.
//!
//! This crate provides:
//! - The collaborator traits (`PermissionRegistry`, `Scheduler`,
//!   `OperatorStatus`, `AttachmentOwner`, `DecisionInterceptor`)
//! - `resolve`, the pure function that turns defaults plus an attachment
//!   stack into an effective permission table
//! - `Permissible`, which owns one principal's attachments, keeps the
//!   effective table current and answers checks
//! - `SubscriptionIndex` and `TickScheduler`, in-memory building blocks for
//!   registries and hosts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bastion_core::{Permissible, TickScheduler};
//!
//! let alex = Permissible::builder(PrincipalId::new("player:alex"), registry)
//!     .scheduler(Arc::new(TickScheduler::new()))
//!     .build();
//! let handle = alex.add_attachment_with(plugin, "world.build", false)?;
//! assert!(!alex.check("world.build")?);
//! ```

pub mod attachment;
pub mod interceptor;
pub mod permissible;
pub mod resolver;
pub mod scheduler;
pub mod subscription;
pub mod traits;

#[cfg(test)]
mod testing;

pub use attachment::{Attachment, AttachmentHandle, AttachmentInfo, AttachmentOptions, RemovalCallback};
pub use interceptor::InterceptorChain;
pub use permissible::{Permissible, PermissibleBuilder};
pub use resolver::{resolve, Resolution};
pub use scheduler::TickScheduler;
pub use subscription::{SubscriptionIndex, Subscriptions};
pub use traits::{
    AttachmentOwner, DecisionInterceptor, OperatorStatus, PermissionRegistry, ScheduledTask,
    Scheduler, TaskHandle,
};
