//! Short-lived snapshot cache.
//!
//! Snapshots are pure reads of durable state, so results may be reused for a
//! few seconds keyed by `(sheet_id, as_of)`. The cache is never authoritative
//! beyond its staleness window, and any successful store mutation bypasses it:
//! each entry remembers the store's mutation sequence at build time and is
//! discarded when the sequence moves on.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

use lexledger_core::{LedgerResult, SheetId};
use lexledger_store::LedgerStore;

use crate::snapshot::{CumulativeSnapshot, build_cumulative_snapshot};

struct CacheEntry {
    snapshot: CumulativeSnapshot,
    cached_at: DateTime<Utc>,
    mutation_seq: u64,
}

/// TTL cache over [`build_cumulative_snapshot`].
pub struct SnapshotCache {
    ttl: Duration,
    entries: RwLock<HashMap<(SheetId, DateTime<Utc>), CacheEntry>>,
}

impl SnapshotCache {
    /// Default staleness window of 3 seconds.
    pub fn new() -> Self {
        Self::with_ttl_secs(3)
    }

    pub fn with_ttl_secs(secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(secs),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Return a cached snapshot when fresh, building (and caching) otherwise.
    pub fn get_or_build(
        &self,
        store: &LedgerStore,
        sheet_id: SheetId,
        as_of: DateTime<Utc>,
    ) -> LedgerResult<Option<CumulativeSnapshot>> {
        let seq = store.mutation_seq();
        let now = Utc::now();
        let key = (sheet_id, as_of);

        if let Ok(entries) = self.entries.read() {
            if let Some(entry) = entries.get(&key) {
                if entry.mutation_seq == seq && now - entry.cached_at <= self.ttl {
                    return Ok(Some(entry.snapshot.clone()));
                }
            }
        }

        let snapshot = build_cumulative_snapshot(store, sheet_id, as_of)?;
        if let Some(snapshot) = &snapshot {
            if let Ok(mut entries) = self.entries.write() {
                entries.insert(
                    key,
                    CacheEntry {
                        snapshot: snapshot.clone(),
                        cached_at: now,
                        mutation_seq: seq,
                    },
                );
            }
        }
        Ok(snapshot)
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use lexledger_core::{Actor, CaseRef};
    use lexledger_store::{ExpectedVersion, NewLineItem, NewSheet};

    fn seeded_store() -> (LedgerStore, Actor, SheetId) {
        let store = LedgerStore::new();
        let actor = Actor::preparer("Yael");
        let sheet = store
            .create_sheet(
                NewSheet {
                    case_ref: CaseRef::new("200"),
                    insurer: "Ayalon".to_string(),
                    period_label: "2024".to_string(),
                    currency: "ILS".to_string(),
                    deductible_amount: Decimal::ZERO,
                    already_paid_amount: Decimal::ZERO,
                    info_only: false,
                },
                &actor,
            )
            .unwrap();
        (store, actor, sheet.id)
    }

    #[test]
    fn cached_snapshot_is_reused_until_a_mutation() {
        let (store, actor, sheet_id) = seeded_store();
        let cache = SnapshotCache::with_ttl_secs(60);
        let as_of = Utc::now();

        let first = cache.get_or_build(&store, sheet_id, as_of).unwrap().unwrap();
        assert!(first.all_lines.is_empty());

        // A mutation bypasses the cached entry even inside the TTL.
        store
            .add_line_item(
                sheet_id,
                NewLineItem::expense("P", "taxi", dec!(1), dec!(40), Decimal::ZERO),
                ExpectedVersion::Any,
                &actor,
            )
            .unwrap();
        let second = cache.get_or_build(&store, sheet_id, as_of).unwrap().unwrap();
        assert_eq!(second.all_lines.len(), 1);
    }

    #[test]
    fn expired_ttl_rebuilds() {
        let (store, _actor, sheet_id) = seeded_store();
        let cache = SnapshotCache::with_ttl_secs(0);
        let as_of = Utc::now();
        // Zero TTL: the second call must rebuild, and still succeed.
        cache.get_or_build(&store, sheet_id, as_of).unwrap().unwrap();
        cache.get_or_build(&store, sheet_id, as_of).unwrap().unwrap();
    }

    #[test]
    fn unknown_sheet_is_not_cached() {
        let (store, _actor, _sheet_id) = seeded_store();
        let cache = SnapshotCache::new();
        let missing = cache
            .get_or_build(&store, SheetId::new(), Utc::now())
            .unwrap();
        assert!(missing.is_none());
    }
}
