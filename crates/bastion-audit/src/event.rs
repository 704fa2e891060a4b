//! Audit event and log types.
//!
//! `DecisionEvent` is one entry in the hash chain: a `DecisionRecord` with a
//! sequence number, a timestamp and the SHA-256 hashes that make tampering
//! detectable. `DecisionLog` is the exported snapshot of a whole trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bastion_contracts::decision::DecisionRecord;

/// A single entry in the SHA-256 hash chain of one audit trail.
///
/// Each event commits to the previous one via `prev_hash`. Modifying any
/// field, including those of the embedded `record`, invalidates `this_hash`
/// and every later `prev_hash`, which `verify_chain` detects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEvent {
    /// Position in the chain, starting at 0.
    pub sequence: u64,

    /// The trail this event belongs to.
    pub trail_id: String,

    /// The decision as it left the interceptor chain.
    pub record: DecisionRecord,

    /// Wall-clock time (UTC) the decision was recorded.
    pub recorded_at: DateTime<Utc>,

    /// Hash of the previous event, or `GENESIS_HASH` for the first one.
    pub prev_hash: String,

    /// Computed by `hash_event()` over (trail_id, sequence, recorded_at,
    /// prev_hash, canonical JSON of record).
    pub this_hash: String,
}

impl DecisionEvent {
    /// The `prev_hash` of the first event in every chain: 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// A snapshot of an audit trail.
///
/// `terminal_hash` is the `this_hash` of the last event and commits to the
/// whole log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLog {
    pub trail_id: String,

    /// All events in chain order (sequence 0 first).
    pub events: Vec<DecisionEvent>,

    /// Wall-clock time (UTC) the log was exported.
    pub exported_at: DateTime<Utc>,

    /// Empty string if the log is empty.
    pub terminal_hash: String,
}

impl DecisionLog {
    /// Number of recorded decisions that ended in a denial.
    pub fn denials(&self) -> usize {
        self.events.iter().filter(|e| !e.record.allowed).count()
    }
}
