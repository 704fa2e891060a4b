//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. trail_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. recorded_at as RFC 3339 with nanoseconds
//!   4. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   5. canonical JSON of record (serde_json, no pretty-printing)

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use bastion_contracts::decision::DecisionRecord;

use crate::event::DecisionEvent;

/// Compute the SHA-256 hash of one audit event.
///
/// Returns a lowercase 64-character hex string, or the serialization error
/// if `record` cannot be encoded as JSON.
pub fn hash_event(
    trail_id: &str,
    sequence: u64,
    recorded_at: &DateTime<Utc>,
    record: &DecisionRecord,
    prev_hash: &str,
) -> Result<String, serde_json::Error> {
    let record_json = serde_json::to_vec(record)?;

    let mut hasher = Sha256::new();
    hasher.update(trail_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(
        recorded_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify the integrity of a hash chain.
///
/// Valid when every event's `prev_hash` equals the `this_hash` of the one
/// before it (`GENESIS_HASH` for the first), every `this_hash` matches the
/// value recomputed from the event's own fields, and sequence numbers run
/// 0, 1, 2, ... without gaps. An empty chain is valid.
pub fn verify_chain(events: &[DecisionEvent]) -> bool {
    let mut expected_prev = DecisionEvent::GENESIS_HASH.to_string();

    for (position, event) in events.iter().enumerate() {
        if event.sequence != position as u64 || event.prev_hash != expected_prev {
            return false;
        }

        let recomputed = hash_event(
            &event.trail_id,
            event.sequence,
            &event.recorded_at,
            &event.record,
            &event.prev_hash,
        );
        match recomputed {
            Ok(hash) if hash == event.this_hash => {}
            _ => return false,
        }

        expected_prev = event.this_hash.clone();
    }

    true
}
