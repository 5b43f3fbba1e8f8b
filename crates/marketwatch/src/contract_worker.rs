//! Per-region public contract polling.
//!
//! Two-level fetch: the region page set yields contract headers; item
//! exchanges and auctions then get their item lists, auctions additionally
//! their bids. A failed items/bids fetch skips that one contract rather
//! than abandoning the region's snapshot.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::histogram;
use tracing::{info, warn};

use broadcast::protocol::{
    ACTION_CONTRACT_ADDITION, ACTION_CONTRACT_CHANGE, ACTION_CONTRACT_DELETION,
};
use broadcast::HubHandle;
use esi::{Contract, ContractBid, ContractItem, ContractType, EsiClient, EsiError};

use crate::contract_store::{ContractChange, ContractDeletion, ContractStore, FullContract};
use crate::market_worker::{MIN_ASSEMBLY_WINDOW, MIN_SUBFETCH_WINDOW, RETRY_PAUSE};
use crate::service::CHANNEL_CONTRACT;
use crate::util::{emit, sleep_random};

pub(crate) struct ContractDeltas {
    pub additions: Vec<FullContract>,
    pub changes: Vec<ContractChange>,
    pub deletions: Vec<ContractDeletion>,
}

/// Fold assembled contracts into the store and collect the deltas.
pub(crate) fn merge_contracts(
    store: &ContractStore,
    region_id: i64,
    start: DateTime<Utc>,
    contracts: Vec<FullContract>,
) -> ContractDeltas {
    let mut additions = Vec::new();
    let mut changes = Vec::new();

    for contract in contracts {
        let (change, is_new) = store.upsert(region_id, contract.clone(), start);
        if is_new {
            additions.push(contract);
        } else if let Some(change) = change {
            changes.push(change);
        }
    }

    let deletions = store.expire(region_id, start);

    ContractDeltas {
        additions,
        changes,
        deletions,
    }
}

/// Poll one region's public contracts forever.
pub(crate) async fn contract_worker(
    esi: Arc<EsiClient>,
    store: Arc<ContractStore>,
    hub: HubHandle,
    region_id: i32,
) {
    loop {
        let start = Utc::now();
        let pull_started = Instant::now();

        let (first_page, info) = match esi.public_contracts(region_id, 1).await {
            Ok(page) => page,
            Err(err) => {
                warn!(region_id, error = %err, "contract page fetch failed");
                tokio::time::sleep(RETRY_PAUSE).await;
                continue;
            }
        };

        if info.window < MIN_ASSEMBLY_WINDOW {
            info!(region_id, window = ?info.window, "contract too close to window, waiting");
            tokio::time::sleep(info.window).await;
            continue;
        }

        let mut fetches = Vec::with_capacity(info.pages.saturating_sub(1) as usize);
        for page in 2..=info.pages {
            let esi = esi.clone();
            fetches.push(tokio::spawn(async move {
                sleep_random(3, 0.5).await;
                let (headers, page_info) = esi.public_contracts(region_id, page).await?;
                if page_info.window < MIN_SUBFETCH_WINDOW {
                    return Err(EsiError::WindowClosed);
                }
                Ok(headers)
            }));
        }

        let mut pages = vec![first_page];
        let mut abandoned = false;
        for result in join_all(fetches).await {
            match result {
                Ok(Ok(headers)) => pages.push(headers),
                Ok(Err(err)) => {
                    warn!(region_id, error = %err, "abandoning contract snapshot");
                    abandoned = true;
                }
                Err(err) => {
                    warn!(region_id, error = %err, "contract page task failed");
                    abandoned = true;
                }
            }
        }
        if abandoned {
            continue;
        }

        let now = Utc::now();
        let mut assembled = Vec::new();
        for header in pages.into_iter().flatten() {
            // Already-expired contracts never enter the store.
            if header.date_expired < now {
                continue;
            }
            let contract_id = header.contract_id;
            match assemble_contract(&esi, header).await {
                Ok(contract) => assembled.push(contract),
                Err(err) => {
                    warn!(region_id, contract_id, error = %err, "skipping contract");
                }
            }
        }

        let deltas = merge_contracts(&store, region_id.into(), start, assembled);

        histogram!("evemarketwatch_contract_pull", "locationID" => region_id.to_string())
            .record(pull_started.elapsed().as_secs_f64() * 1000.0);

        emit(&hub, CHANNEL_CONTRACT, ACTION_CONTRACT_ADDITION, &deltas.additions).await;
        emit(&hub, CHANNEL_CONTRACT, ACTION_CONTRACT_CHANGE, &deltas.changes).await;
        emit(&hub, CHANNEL_CONTRACT, ACTION_CONTRACT_DELETION, &deltas.deletions).await;

        tokio::time::sleep(info.window).await;
    }
}

/// Fetch a contract's payload according to its type.
async fn assemble_contract(esi: &Arc<EsiClient>, header: Contract) -> Result<FullContract, EsiError> {
    let mut contract = FullContract::new(header);

    if matches!(
        contract.contract.type_,
        ContractType::ItemExchange | ContractType::Auction
    ) {
        contract.items = fetch_contract_items(esi, contract.contract.contract_id).await?;
    }
    if contract.contract.type_ == ContractType::Auction {
        contract.bids = fetch_contract_bids(esi, contract.contract.contract_id).await?;
    }

    Ok(contract)
}

/// All pages of one contract's item list.
async fn fetch_contract_items(
    esi: &Arc<EsiClient>,
    contract_id: i64,
) -> Result<Vec<ContractItem>, EsiError> {
    sleep_random(5, 0.5).await;
    let (mut items, info) = esi.contract_items(contract_id, 1).await?;

    let fetches = (2..=info.pages).map(|page| {
        let esi = esi.clone();
        async move {
            sleep_random(5, 0.5).await;
            esi.contract_items(contract_id, page)
                .await
                .map(|(items, _)| items)
        }
    });
    for result in join_all(fetches).await {
        items.extend(result?);
    }

    Ok(items)
}

/// All pages of one auction's bid list.
async fn fetch_contract_bids(
    esi: &Arc<EsiClient>,
    contract_id: i64,
) -> Result<Vec<ContractBid>, EsiError> {
    sleep_random(3, 0.5).await;
    let (mut bids, info) = esi.contract_bids(contract_id, 1).await?;

    let fetches = (2..=info.pages).map(|page| {
        let esi = esi.clone();
        async move {
            sleep_random(5, 0.5).await;
            esi.contract_bids(contract_id, page)
                .await
                .map(|(bids, _)| bids)
        }
    });
    for result in join_all(fetches).await {
        bids.extend(result?);
    }

    Ok(bids)
}
