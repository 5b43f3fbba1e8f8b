//! Service wiring: hub, region catalog, worker spawn, WebSocket listener.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use broadcast::protocol::{ACTION_ADDITION, ACTION_CONTRACT_ADDITION};
use broadcast::{Hub, Message};
use esi::{is_market_region, EsiClient, EsiConfig, EsiError};

use crate::contract_store::ContractStore;
use crate::contract_worker::contract_worker;
use crate::market_worker::market_worker;
use crate::order_store::OrderStore;

pub const CHANNEL_MARKET: &str = "market";
pub const CHANNEL_CONTRACT: &str = "contract";

/// Gap between worker spawns, spreading the initial fetch burst.
const WORKER_STAGGER: Duration = Duration::from_secs(1);

/// The watcher service: ESI client, both stores, and the fan-out hub.
pub struct MarketWatch {
    esi: Arc<EsiClient>,
    orders: Arc<OrderStore>,
    contracts: Arc<ContractStore>,
}

impl MarketWatch {
    pub fn new(config: EsiConfig) -> Result<Self, EsiError> {
        Ok(Self {
            esi: Arc::new(EsiClient::new(config)?),
            orders: Arc::new(OrderStore::new()),
            contracts: Arc::new(ContractStore::new()),
        })
    }

    /// Start the hub and workers, then serve WebSocket clients.
    ///
    /// Only region catalog exhaustion is fatal; workers deal with their own
    /// failures.
    pub async fn run(self, ws_addr: SocketAddr) -> anyhow::Result<()> {
        let mut hub = Hub::new(vec![CHANNEL_MARKET.to_string(), CHANNEL_CONTRACT.to_string()]);

        let orders = self.orders.clone();
        let contracts = self.contracts.clone();
        hub.on_register(move |channels| snapshot_messages(channels, &orders, &contracts));

        let handle = hub.handle();
        tokio::spawn(hub.run());

        let regions = self.esi.region_catalog().await?;
        info!(count = regions.len(), "enumerated regions");

        for &region in &regions {
            self.orders.create_region(region.into());
            self.contracts.create_region(region.into());
        }

        for region in watched_regions(&regions) {
            tokio::time::sleep(WORKER_STAGGER).await;
            tokio::spawn(market_worker(
                self.esi.clone(),
                self.orders.clone(),
                handle.clone(),
                region,
            ));
            tokio::spawn(contract_worker(
                self.esi.clone(),
                self.contracts.clone(),
                handle.clone(),
                region,
            ));
        }

        let app = broadcast::router(handle);
        let listener = TcpListener::bind(ws_addr).await?;
        info!(%ws_addr, "serving websocket clients");
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Regions that get a worker pair: market regions only, each at most once.
fn watched_regions(regions: &[i32]) -> Vec<i32> {
    let mut seen = HashSet::new();
    regions
        .iter()
        .copied()
        .filter(|region| is_market_region(*region) && seen.insert(*region))
        .collect()
}

/// Build the catch-up messages for a newly registered client: one bundled
/// snapshot per region per subscribed channel, using the addition actions.
fn snapshot_messages(
    channels: &HashSet<String>,
    orders: &OrderStore,
    contracts: &ContractStore,
) -> Vec<(String, Message)> {
    let mut out = Vec::new();

    if channels.contains(CHANNEL_MARKET) {
        for region in orders.region_ids() {
            let snapshot = orders.snapshot(region);
            if snapshot.is_empty() {
                continue;
            }
            match Message::new(ACTION_ADDITION, &snapshot) {
                Ok(message) => out.push((CHANNEL_MARKET.to_string(), message)),
                Err(err) => warn!(region, error = %err, "failed to encode market snapshot"),
            }
        }
    }

    if channels.contains(CHANNEL_CONTRACT) {
        for region in contracts.region_ids() {
            let snapshot = contracts.snapshot(region);
            if snapshot.is_empty() {
                continue;
            }
            match Message::new(ACTION_CONTRACT_ADDITION, &snapshot) {
                Ok(message) => out.push((CHANNEL_CONTRACT.to_string(), message)),
                Err(err) => warn!(region, error = %err, "failed to encode contract snapshot"),
            }
        }
    }

    out
}
