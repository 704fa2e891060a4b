//! Error types for the BASTION permission engine.
//!
//! Every fallible engine operation returns `BastionResult<T>`. All variants are
//! local and recoverable: a failed call leaves the principal's state exactly as
//! it was before the call.

use thiserror::Error;

/// The unified error type for the BASTION crates.
#[derive(Debug, Error)]
pub enum BastionError {
    /// A permission name (or another caller-supplied argument) was empty or malformed.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The owner requesting an attachment is disabled or unnamed.
    #[error("attachment owner '{owner}' is not usable: {reason}")]
    InvalidOwner { owner: String, reason: String },

    /// The attachment handle does not belong to this principal's attachment list.
    #[error("attachment {attachment} is not attached to principal '{principal}'")]
    NotAttached { attachment: String, principal: String },

    /// The expiry task for a self-expiring attachment could not be scheduled.
    ///
    /// The attachment has already been rolled back when this is returned.
    #[error("could not schedule attachment expiry: {reason}")]
    SchedulingFailed { reason: String },

    /// A permission's child graph revisits a node within one propagation path.
    ///
    /// Never returned from a check: resolution truncates the branch and goes on.
    /// Registries that refuse cyclic definitions up front return it.
    #[error("permission '{permission}' forms a cycle in the registry child graph")]
    RegistryCycle { permission: String },

    /// Operator status was changed on a principal with no operator provider.
    #[error("principal '{principal}' has no operator status provider")]
    OperatorUnsupported { principal: String },

    /// A registry definition file is missing, unreadable, or malformed.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

/// Convenience alias used throughout the BASTION crates.
pub type BastionResult<T> = Result<T, BastionError>;
