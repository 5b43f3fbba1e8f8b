//! Per-region market order polling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::histogram;
use tracing::{info, warn};

use broadcast::protocol::{ACTION_ADDITION, ACTION_CHANGE, ACTION_DELETION};
use broadcast::HubHandle;
use esi::{EsiClient, EsiError, MarketOrder};

use crate::order_store::{OrderChange, OrderDeletion, OrderStore};
use crate::service::CHANNEL_MARKET;
use crate::util::{emit, sleep_random};

/// Snapshot assembly is skipped when less than this remains in the cache
/// window; a fresh page set would be published mid-fetch.
pub(crate) const MIN_ASSEMBLY_WINDOW: Duration = Duration::from_secs(3 * 60);

/// Sub-fetches abandon the snapshot when the window has shrunk to this.
pub(crate) const MIN_SUBFETCH_WINDOW: Duration = Duration::from_secs(20);

/// Pause before retrying a failed first page.
pub(crate) const RETRY_PAUSE: Duration = Duration::from_secs(5);

pub(crate) struct MarketDeltas {
    pub additions: Vec<MarketOrder>,
    pub changes: Vec<OrderChange>,
    pub deletions: Vec<OrderDeletion>,
}

/// Fold a full snapshot's pages into the store and collect the deltas.
///
/// Must only be called once every page of the snapshot is in hand: a missing
/// page would make every order on it look deleted.
pub(crate) fn merge_order_pages(
    store: &OrderStore,
    region_id: i64,
    start: DateTime<Utc>,
    pages: Vec<Vec<MarketOrder>>,
) -> MarketDeltas {
    let mut additions = Vec::new();
    let mut changes = Vec::new();

    for page in pages {
        for order in page {
            let (change, is_new) = store.upsert(region_id, order.clone(), start);
            if is_new {
                additions.push(order);
            } else if let Some(change) = change {
                changes.push(change);
            }
        }
    }

    let deletions = store.expire(region_id, start);

    MarketDeltas {
        additions,
        changes,
        deletions,
    }
}

/// Poll one region's market orders forever.
pub(crate) async fn market_worker(
    esi: Arc<EsiClient>,
    store: Arc<OrderStore>,
    hub: HubHandle,
    region_id: i32,
) {
    loop {
        let start = Utc::now();
        let pull_started = Instant::now();

        let (first_page, info) = match esi.market_orders(region_id, 1).await {
            Ok(page) => page,
            Err(err) => {
                warn!(region_id, error = %err, "market page fetch failed");
                tokio::time::sleep(RETRY_PAUSE).await;
                continue;
            }
        };

        if info.window < MIN_ASSEMBLY_WINDOW {
            info!(region_id, window = ?info.window, "market too close to window, waiting");
            tokio::time::sleep(info.window).await;
            continue;
        }

        let mut fetches = Vec::with_capacity(info.pages.saturating_sub(1) as usize);
        for page in 2..=info.pages {
            let esi = esi.clone();
            fetches.push(tokio::spawn(async move {
                sleep_random(5, 0.5).await;
                let (orders, page_info) = esi.market_orders(region_id, page).await?;
                if page_info.window < MIN_SUBFETCH_WINDOW {
                    return Err(EsiError::WindowClosed);
                }
                Ok(orders)
            }));
        }

        let mut pages = vec![first_page];
        let mut abandoned = false;
        for result in join_all(fetches).await {
            match result {
                Ok(Ok(orders)) => pages.push(orders),
                Ok(Err(err)) => {
                    warn!(region_id, error = %err, "abandoning market snapshot");
                    abandoned = true;
                }
                Err(err) => {
                    warn!(region_id, error = %err, "market page task failed");
                    abandoned = true;
                }
            }
        }
        if abandoned {
            continue;
        }

        let deltas = merge_order_pages(&store, region_id.into(), start, pages);

        histogram!("evemarketwatch_market_pull", "locationID" => region_id.to_string())
            .record(pull_started.elapsed().as_secs_f64() * 1000.0);

        emit(&hub, CHANNEL_MARKET, ACTION_ADDITION, &deltas.additions).await;
        emit(&hub, CHANNEL_MARKET, ACTION_CHANGE, &deltas.changes).await;
        emit(&hub, CHANNEL_MARKET, ACTION_DELETION, &deltas.deletions).await;

        tokio::time::sleep(info.window).await;
    }
}
