//! Partition assignment
//!
//! Maps each key onto an ordered (primary, secondary) pair drawn from
//! the current live-node view. The hash is the wrapping sum of the
//! key's character codes. Weak as hashes go, but it is deterministic
//! and identical on every node, which is the property that matters:
//! two nodes with the same liveness view must compute the same pair.
//!
//! The live view passed in must be the configured member list filtered
//! by liveness, never re-sorted; the configured order is the canonical
//! one all nodes share.

use rafiq_core::types::NodeId;

/// Sum of character codes, wrapping at u32.
pub fn key_hash(key: &str) -> u32 {
    key.chars().fold(0u32, |acc, c| acc.wrapping_add(c as u32))
}

/// Compute the (primary, secondary) owners of `key` among `live`.
///
/// Returns `None` when no node is live; the caller must fail the
/// operation. With a single live node, primary == secondary and no
/// replication traffic is emitted.
pub fn assign<'a>(key: &str, live: &'a [NodeId]) -> Option<(&'a NodeId, &'a NodeId)> {
    if live.is_empty() {
        return None;
    }
    let primary_idx = key_hash(key) as usize % live.len();
    let secondary_idx = (primary_idx + 1) % live.len();
    Some((&live[primary_idx], &live[secondary_idx]))
}
