//! The audit interceptor.
//!
//! `AuditInterceptor` implements `DecisionInterceptor` from bastion-core. It
//! never changes a decision; it appends what it sees to an in-memory hash
//! chain. Register it last on an `InterceptorChain` to record final answers,
//! or first to record the engine's own candidates.
//!
//! Use `export_log()` to obtain a `DecisionLog`, and `verify_integrity()` at
//! any time to confirm the chain has not been tampered with in memory.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{error, info, trace};

use bastion_contracts::decision::DecisionRecord;
use bastion_core::traits::DecisionInterceptor;

use crate::{
    chain::{hash_event, verify_chain},
    event::{DecisionEvent, DecisionLog},
};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct AuditState {
    /// All events recorded so far, in append order.
    pub(crate) events: Vec<DecisionEvent>,

    /// The next sequence number to assign.
    pub(crate) sequence: u64,

    /// The `this_hash` of the last event, or `GENESIS_HASH`.
    pub(crate) last_hash: String,
}

// ── Public interceptor ────────────────────────────────────────────────────────

/// An append-only decision recorder backed by a SHA-256 hash chain.
///
/// Cloning is cheap and every clone appends to the same trail, so one clone
/// can sit in the interceptor chain while another is used for export.
#[derive(Clone)]
pub struct AuditInterceptor {
    trail_id: String,
    pub(crate) state: Arc<Mutex<AuditState>>,
}

impl AuditInterceptor {
    pub fn new(trail_id: impl Into<String>) -> Self {
        let state = AuditState {
            events: Vec::new(),
            sequence: 0,
            last_hash: DecisionEvent::GENESIS_HASH.to_string(),
        };
        Self {
            trail_id: trail_id.into(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn trail_id(&self) -> &str {
        &self.trail_id
    }

    /// Number of decisions recorded so far.
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every event recorded so far.
    pub fn export_log(&self) -> DecisionLog {
        let state = self.lock();
        let terminal_hash = state
            .events
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_default();

        info!(
            trail_id = %self.trail_id,
            event_count = state.events.len(),
            terminal_hash = %terminal_hash,
            "decision log exported"
        );

        DecisionLog {
            trail_id: self.trail_id.clone(),
            events: state.events.clone(),
            exported_at: Utc::now(),
            terminal_hash,
        }
    }

    pub fn verify_integrity(&self) -> bool {
        verify_chain(&self.lock().events)
    }

    /// Append one decision to the chain.
    fn append(&self, record: &DecisionRecord) {
        let mut state = self.lock();
        let prev_hash = state.last_hash.clone();
        let sequence = state.sequence;
        let recorded_at = Utc::now();

        let this_hash = match hash_event(&self.trail_id, sequence, &recorded_at, record, &prev_hash)
        {
            Ok(hash) => hash,
            Err(e) => {
                error!(
                    trail_id = %self.trail_id,
                    permission = %record.key,
                    error = %e,
                    "could not hash decision; not recorded"
                );
                return;
            }
        };

        trace!(
            trail_id = %self.trail_id,
            sequence,
            principal = %record.principal,
            permission = %record.key,
            allowed = record.allowed,
            "decision recorded"
        );

        state.events.push(DecisionEvent {
            sequence,
            trail_id: self.trail_id.clone(),
            record: record.clone(),
            recorded_at,
            prev_hash,
            this_hash: this_hash.clone(),
        });
        state.sequence += 1;
        state.last_hash = this_hash;
    }

    fn lock(&self) -> MutexGuard<'_, AuditState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DecisionInterceptor for AuditInterceptor {
    fn intercept(&self, record: &mut DecisionRecord) {
        self.append(record);
    }
}

impl std::fmt::Debug for AuditInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditInterceptor")
            .field("trail_id", &self.trail_id)
            .field("events", &self.len())
            .finish()
    }
}
