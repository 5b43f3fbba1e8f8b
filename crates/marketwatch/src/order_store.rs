//! Per-region live order state.
//!
//! Two-level concurrent map: `region_id → order_id → entry`. Each region is
//! written by exactly one market worker after its fan-out barrier; the hub's
//! snapshot pass reads concurrently and tolerates a point-in-time view.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use esi::MarketOrder;
use serde::Serialize;

/// A live order plus the snapshot start that last observed it.
#[derive(Debug, Clone)]
pub struct OrderEntry {
    pub touched: DateTime<Utc>,
    pub order: MarketOrder,
}

/// Before/after pair for an order whose observable fields changed.
#[derive(Debug, Clone, Serialize)]
pub struct OrderChange {
    pub order_id: i64,
    pub region_id: i64,
    pub before: MarketOrder,
    pub after: MarketOrder,
}

/// Identifier of an order absent from the latest snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDeletion {
    pub order_id: i64,
    pub region_id: i64,
}

#[derive(Default)]
pub struct OrderStore {
    regions: DashMap<i64, DashMap<i64, OrderEntry>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a region's inner map.
    pub fn create_region(&self, region_id: i64) {
        self.regions.entry(region_id).or_default();
    }

    /// Regions currently tracked.
    pub fn region_ids(&self) -> Vec<i64> {
        self.regions.iter().map(|entry| *entry.key()).collect()
    }

    /// Insert or update one order observed at `touched`.
    ///
    /// Returns `(change, is_new)`: a change is present only when the order
    /// already existed and any observable field differs.
    pub fn upsert(
        &self,
        region_id: i64,
        order: MarketOrder,
        touched: DateTime<Utc>,
    ) -> (Option<OrderChange>, bool) {
        let region = self.regions.entry(region_id).or_default();
        let result = match region.entry(order.order_id) {
            Entry::Occupied(mut occupied) => {
                let change = (occupied.get().order != order).then(|| OrderChange {
                    order_id: order.order_id,
                    region_id,
                    before: occupied.get().order.clone(),
                    after: order.clone(),
                });
                occupied.insert(OrderEntry { touched, order });
                (change, false)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(OrderEntry { touched, order });
                (None, true)
            }
        };
        result
    }

    /// Remove every order last touched before `cutoff` and report the
    /// removals. Called once per cycle after a full successful snapshot.
    pub fn expire(&self, region_id: i64, cutoff: DateTime<Utc>) -> Vec<OrderDeletion> {
        let Some(region) = self.regions.get(&region_id) else {
            return Vec::new();
        };

        let stale: Vec<i64> = region
            .iter()
            .filter(|entry| entry.value().touched < cutoff)
            .map(|entry| *entry.key())
            .collect();

        stale
            .into_iter()
            .filter(|order_id| {
                region
                    .remove_if(order_id, |_, entry| entry.touched < cutoff)
                    .is_some()
            })
            .map(|order_id| OrderDeletion {
                order_id,
                region_id,
            })
            .collect()
    }

    /// Current orders of a region, for on-register snapshots.
    pub fn snapshot(&self, region_id: i64) -> Vec<MarketOrder> {
        self.regions
            .get(&region_id)
            .map(|region| {
                region
                    .iter()
                    .map(|entry| entry.value().order.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(order_id: i64, price: f64) -> MarketOrder {
        MarketOrder {
            order_id,
            type_id: 34,
            location_id: 60_003_760,
            system_id: 30_000_142,
            volume_total: 1000,
            volume_remain: 1000,
            min_volume: 1,
            price,
            is_buy_order: false,
            duration: 90,
            issued: "2026-07-30T14:00:00Z".parse().unwrap(),
            range: "region".to_string(),
        }
    }

    #[test]
    fn first_observation_is_an_addition() {
        let store = OrderStore::new();
        let start = Utc::now();

        let (change, is_new) = store.upsert(10_000_002, order(1, 100.0), start);
        assert!(change.is_none());
        assert!(is_new);
    }

    #[test]
    fn unchanged_order_reports_nothing() {
        let store = OrderStore::new();
        let first = Utc::now();
        store.upsert(10_000_002, order(1, 100.0), first);

        let second = Utc::now();
        let (change, is_new) = store.upsert(10_000_002, order(1, 100.0), second);
        assert!(change.is_none());
        assert!(!is_new);

        // Touched still advanced: the order survives expiry at `second`.
        assert!(store.expire(10_000_002, second).is_empty());
    }

    #[test]
    fn price_change_reports_before_and_after() {
        let store = OrderStore::new();
        store.upsert(10_000_002, order(1, 100.0), Utc::now());

        let (change, is_new) = store.upsert(10_000_002, order(1, 150.0), Utc::now());
        assert!(!is_new);
        let change = change.unwrap();
        assert_eq!(change.before.price, 100.0);
        assert_eq!(change.after.price, 150.0);
        assert_eq!(change.order_id, 1);
    }

    #[test]
    fn expire_removes_only_untouched_orders() {
        let store = OrderStore::new();
        let first = Utc::now();
        store.upsert(10_000_002, order(1, 100.0), first);
        store.upsert(10_000_002, order(2, 200.0), first);

        let second = Utc::now();
        store.upsert(10_000_002, order(2, 200.0), second);

        let deletions = store.expire(10_000_002, second);
        assert_eq!(deletions.len(), 1);
        assert_eq!(deletions[0].order_id, 1);

        let remaining = store.snapshot(10_000_002);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].order_id, 2);
    }

    #[test]
    fn expiry_is_monotonic() {
        let store = OrderStore::new();
        let start = Utc::now();
        store.upsert(10_000_002, order(1, 100.0), start);
        store.upsert(10_000_002, order(2, 200.0), start);

        store.expire(10_000_002, start);

        // Everything left was touched at or after the cutoff.
        let later = store.expire(10_000_002, start);
        assert!(later.is_empty());
        assert_eq!(store.snapshot(10_000_002).len(), 2);
    }

    #[test]
    fn regions_are_independent() {
        let store = OrderStore::new();
        let start = Utc::now();
        store.upsert(10_000_002, order(1, 100.0), start);
        store.upsert(10_000_043, order(1, 100.0), start);

        let next = Utc::now();
        store.upsert(10_000_002, order(1, 100.0), next);

        assert!(store.expire(10_000_002, next).is_empty());
        assert_eq!(store.expire(10_000_043, next).len(), 1);
    }
}
