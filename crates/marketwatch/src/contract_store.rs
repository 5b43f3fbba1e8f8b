//! Per-region live contract state.
//!
//! Same shape as the order store, with a looser equality: a contract's item
//! list is immutable once published, so only the header scalars and the
//! bid state can mark it changed.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use esi::{Contract, ContractBid, ContractItem, ContractType};
use serde::Serialize;

/// A contract header with its fetched payload.
///
/// `items` is populated for item exchanges and auctions, `bids` only for
/// auctions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullContract {
    pub contract: Contract,
    pub items: Vec<ContractItem>,
    pub bids: Vec<ContractBid>,
}

impl FullContract {
    pub fn new(contract: Contract) -> Self {
        Self {
            contract,
            items: Vec::new(),
            bids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContractEntry {
    pub touched: DateTime<Utc>,
    pub contract: FullContract,
}

/// Before/after pair for a changed contract. In practice only auction bids
/// move during a contract's lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct ContractChange {
    pub contract_id: i64,
    pub region_id: i64,
    pub before: FullContract,
    pub after: FullContract,
}

/// Identifier of a contract absent from the latest snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ContractDeletion {
    pub contract_id: i64,
    pub region_id: i64,
}

/// Whether two observations of the same contract are equivalent.
///
/// Item lists are ignored. Bid count always participates; for auctions the
/// bid list itself is compared so amount edits surface too.
fn unchanged(prev: &FullContract, next: &FullContract) -> bool {
    if prev.contract != next.contract {
        return false;
    }
    if prev.bids.len() != next.bids.len() {
        return false;
    }
    if prev.contract.type_ == ContractType::Auction && prev.bids != next.bids {
        return false;
    }
    true
}

#[derive(Default)]
pub struct ContractStore {
    regions: DashMap<i64, DashMap<i64, ContractEntry>>,
}

impl ContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_region(&self, region_id: i64) {
        self.regions.entry(region_id).or_default();
    }

    pub fn region_ids(&self) -> Vec<i64> {
        self.regions.iter().map(|entry| *entry.key()).collect()
    }

    /// Insert or update one contract observed at `touched`.
    pub fn upsert(
        &self,
        region_id: i64,
        contract: FullContract,
        touched: DateTime<Utc>,
    ) -> (Option<ContractChange>, bool) {
        let region = self.regions.entry(region_id).or_default();
        let result = match region.entry(contract.contract.contract_id) {
            Entry::Occupied(mut occupied) => {
                let change = (!unchanged(&occupied.get().contract, &contract)).then(|| {
                    ContractChange {
                        contract_id: contract.contract.contract_id,
                        region_id,
                        before: occupied.get().contract.clone(),
                        after: contract.clone(),
                    }
                });
                occupied.insert(ContractEntry { touched, contract });
                (change, false)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(ContractEntry { touched, contract });
                (None, true)
            }
        };
        result
    }

    /// Remove every contract last touched before `cutoff`.
    pub fn expire(&self, region_id: i64, cutoff: DateTime<Utc>) -> Vec<ContractDeletion> {
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
            .filter(|contract_id| {
                region
                    .remove_if(contract_id, |_, entry| entry.touched < cutoff)
                    .is_some()
            })
            .map(|contract_id| ContractDeletion {
                contract_id,
                region_id,
            })
            .collect()
    }

    /// Current contracts of a region, for on-register snapshots.
    pub fn snapshot(&self, region_id: i64) -> Vec<FullContract> {
        self.regions
            .get(&region_id)
            .map(|region| {
                region
                    .iter()
                    .map(|entry| entry.value().contract.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(contract_id: i64, type_: ContractType) -> FullContract {
        FullContract::new(Contract {
            contract_id,
            type_,
            issuer_id: 90_000_001,
            issuer_corporation_id: 98_000_001,
            for_corporation: Some(false),
            date_issued: "2026-07-28T10:00:00Z".parse().unwrap(),
            date_expired: "2026-09-01T10:00:00Z".parse().unwrap(),
            title: Some("WTS stuff".to_string()),
            price: Some(1_000_000.0),
            reward: None,
            collateral: None,
            buyout: None,
            volume: Some(10.0),
            days_to_complete: None,
            start_location_id: Some(60_003_760),
            end_location_id: None,
        })
    }

    fn bid(bid_id: i32, amount: f64) -> ContractBid {
        ContractBid {
            bid_id,
            amount,
            date_bid: "2026-07-30T12:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn first_observation_is_an_addition() {
        let store = ContractStore::new();
        let (change, is_new) =
            store.upsert(10_000_002, contract(7, ContractType::ItemExchange), Utc::now());
        assert!(change.is_none());
        assert!(is_new);
    }

    #[test]
    fn item_lists_do_not_mark_a_contract_changed() {
        let store = ContractStore::new();
        let mut first = contract(7, ContractType::ItemExchange);
        first.items = vec![ContractItem {
            record_id: 1,
            type_id: 34,
            quantity: 100,
            is_included: true,
            item_id: None,
            is_blueprint_copy: None,
            material_efficiency: None,
            time_efficiency: None,
            runs: None,
        }];
        store.upsert(10_000_002, first, Utc::now());

        // Same header, empty item list this time around.
        let (change, is_new) =
            store.upsert(10_000_002, contract(7, ContractType::ItemExchange), Utc::now());
        assert!(change.is_none());
        assert!(!is_new);
    }

    #[test]
    fn new_bid_marks_an_auction_changed() {
        let store = ContractStore::new();
        let mut auction = contract(9, ContractType::Auction);
        auction.bids = vec![bid(1, 500_000.0)];
        store.upsert(10_000_002, auction.clone(), Utc::now());

        auction.bids.push(bid(2, 600_000.0));
        let (change, is_new) = store.upsert(10_000_002, auction, Utc::now());
        assert!(!is_new);
        let change = change.unwrap();
        assert_eq!(change.before.bids.len(), 1);
        assert_eq!(change.after.bids.len(), 2);
    }

    #[test]
    fn changed_bid_amount_marks_an_auction_changed() {
        let store = ContractStore::new();
        let mut auction = contract(9, ContractType::Auction);
        auction.bids = vec![bid(1, 500_000.0)];
        store.upsert(10_000_002, auction.clone(), Utc::now());

        auction.bids = vec![bid(1, 750_000.0)];
        let (change, _) = store.upsert(10_000_002, auction, Utc::now());
        assert!(change.is_some());
    }

    #[test]
    fn header_scalar_change_is_detected() {
        let store = ContractStore::new();
        store.upsert(10_000_002, contract(7, ContractType::ItemExchange), Utc::now());

        let mut repriced = contract(7, ContractType::ItemExchange);
        repriced.contract.price = Some(2_000_000.0);
        let (change, _) = store.upsert(10_000_002, repriced, Utc::now());
        assert!(change.is_some());
    }

    #[test]
    fn expire_removes_untouched_contracts() {
        let store = ContractStore::new();
        let first = Utc::now();
        store.upsert(10_000_002, contract(7, ContractType::ItemExchange), first);
        store.upsert(10_000_002, contract(8, ContractType::Courier), first);

        let second = Utc::now();
        store.upsert(10_000_002, contract(8, ContractType::Courier), second);

        let deletions = store.expire(10_000_002, second);
        assert_eq!(deletions.len(), 1);
        assert_eq!(deletions[0].contract_id, 7);
        assert_eq!(store.snapshot(10_000_002).len(), 1);
    }
}
