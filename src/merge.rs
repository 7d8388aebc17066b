use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::{common::Record, identity::IdentityKey};

pub type MergedSet = BTreeMap<IdentityKey, Record>;

/// Keeps the first record seen for each identity key, preserving input order.
/// Records without a usable title are dropped.
pub fn dedup(records: impl IntoIterator<Item = Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for record in records {
        let Some(key) = IdentityKey::of(&record) else {
            continue;
        };
        if seen.insert(key.clone()) {
            kept.push(record);
        } else {
            debug!(%key, "dropping duplicate row");
        }
    }
    kept
}

/// Overlays `new` onto `old` by identity key. A new record replaces the old
/// one for its key wholesale; keys only present in `old` are retained.
pub fn merge(
    old: impl IntoIterator<Item = Record>,
    new: impl IntoIterator<Item = Record>,
) -> MergedSet {
    let mut merged = keyed(old);
    for record in new {
        if let Some(key) = IdentityKey::of(&record) {
            merged.insert(key, record);
        }
    }
    merged
}

/// Builds a key-to-record map. Later records win on key collision.
pub fn keyed(records: impl IntoIterator<Item = Record>) -> MergedSet {
    records
        .into_iter()
        .filter_map(|r| IdentityKey::of(&r).map(|k| (k, r)))
        .collect()
}
