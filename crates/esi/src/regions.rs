//! Region catalog enumeration.

use std::time::Duration;

use tracing::warn;

use crate::client::EsiClient;
use crate::error::Result;

/// Attempts before region enumeration is considered fatal.
const CATALOG_TRIES: u32 = 5;
const CATALOG_RETRY_GAP: Duration = Duration::from_secs(5);

/// Wormhole and special-purpose regions start here; they carry no public
/// market or contract data.
const NON_MARKET_FLOOR: i32 = 11_000_000;
const EXCLUDED_REGION: i32 = 11_000_031;

/// Whether a region carries public market and contract streams.
pub fn is_market_region(region_id: i32) -> bool {
    region_id < NON_MARKET_FLOOR && region_id != EXCLUDED_REGION
}

impl EsiClient {
    /// Fetch the full region catalog, retrying transient failures.
    ///
    /// Exhaustion is fatal: without the catalog there is nothing to watch.
    pub async fn region_catalog(&self) -> Result<Vec<i32>> {
        let mut tries: u32 = 0;
        loop {
            tries += 1;
            match self.regions().await {
                Ok(regions) => return Ok(regions),
                Err(err) if tries >= CATALOG_TRIES => return Err(err),
                Err(err) => {
                    warn!(error = %err, tries, "region catalog fetch failed, retrying");
                    tokio::time::sleep(CATALOG_RETRY_GAP).await;
                }
            }
        }
    }
}
