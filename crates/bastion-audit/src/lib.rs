//! # bastion-audit
//!
//! Append-only, SHA-256 hash-chained audit trail of BASTION permission
//! decisions.
//!
//! ## Overview
//!
//! [`AuditInterceptor`] plugs into a principal's `InterceptorChain` and wraps
//! every decision it sees in a [`DecisionEvent`] that links to the previous
//! event via its SHA-256 hash. Tampering with any event breaks the chain and
//! is detected by [`verify_chain`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bastion_audit::AuditInterceptor;
//! use bastion_core::InterceptorChain;
//!
//! let audit = AuditInterceptor::new("session-001");
//! let chain = Arc::new(InterceptorChain::new());
//! chain.register(Arc::new(audit.clone()));
//!
//! // ... build principals with `.interceptors(chain.clone())` and check ...
//!
//! assert!(audit.verify_integrity());
//! let log = audit.export_log();
//! ```

pub mod chain;
pub mod event;
pub mod interceptor;

pub use chain::{hash_event, verify_chain};
pub use event::{DecisionEvent, DecisionLog};
pub use interceptor::AuditInterceptor;

// ── Tests ─────────────────────────────────────────────────────────────────────
