//! # bastion-registry
//!
//! A TOML-driven, in-memory permission registry for the BASTION engine.
//!
//! ## Overview
//!
//! This crate provides [`InMemoryRegistry`], which implements the
//! [`PermissionRegistry`](bastion_core::traits::PermissionRegistry) trait.
//! Permission nodes are declared in a TOML file; each has a default policy
//! and an optional map of implied children.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use bastion_registry::InMemoryRegistry;
//!
//! let registry = Arc::new(InMemoryRegistry::from_file(Path::new("registries/server.toml"))?);
//! let alex = Permissible::builder(PrincipalId::new("player:alex"), registry.clone()).build();
//! ```
//!
//! ## Live changes
//!
//! `add_permission`, `remove_permission` and `set_default` return the
//! principals whose effective maps are now stale. Recalculate each of them.

pub mod config;
pub mod registry;

pub use config::RegistryConfig;
pub use registry::InMemoryRegistry;

// ── Tests ─────────────────────────────────────────────────────────────────────
