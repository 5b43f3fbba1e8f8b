//! Typed wrappers over the ESI endpoints the watcher polls.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::Result;
use crate::headers;
use crate::transport::EsiTransport;
use crate::types::{Contract, ContractBid, ContractItem, MarketOrder};

const DEFAULT_BASE_URL: &str = "https://esi.evetech.net/latest";

/// Connection pool settings mirror what a long-lived poller needs: patient
/// dials, a deep idle pool shared by every region worker.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(120);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const POOL_MAX_IDLE_PER_HOST: usize = 180;
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// ESI client configuration.
#[derive(Debug, Clone)]
pub struct EsiConfig {
    /// Base URL of the ESI deployment.
    pub base_url: String,
    /// Contact string ESI asks callers to identify with.
    pub user_agent: String,
    /// Log successful round trips, not just failures.
    pub verbose: bool,
}

impl Default for EsiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: "eve-marketwatch".to_string(),
            verbose: false,
        }
    }
}

/// Pagination and cache-window metadata for one fetched page.
#[derive(Debug, Clone, Copy)]
pub struct PageInfo {
    /// Total pages in the current snapshot.
    pub pages: i32,
    /// Time until ESI publishes the next snapshot.
    pub window: Duration,
}

/// Typed ESI client. Cheap to clone-share behind an `Arc`.
pub struct EsiClient {
    transport: EsiTransport,
    http: reqwest::Client,
    base_url: String,
}

impl EsiClient {
    pub fn new(config: EsiConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&config.user_agent) {
            default_headers.insert(USER_AGENT, ua);
        }

        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .tcp_keepalive(TCP_KEEPALIVE)
            .build()?;

        Ok(Self {
            transport: EsiTransport::new(http.clone(), config.verbose),
            http,
            base_url: config.base_url,
        })
    }

    /// `GET /universe/regions/`.
    pub async fn regions(&self) -> Result<Vec<i32>> {
        let url = format!("{}/universe/regions/", self.base_url);
        let req = self.http.get(&url).build()?;
        let res = self.transport.execute(req).await?;
        Ok(res.json().await?)
    }

    /// One page of `GET /markets/{region_id}/orders/?order_type=all`.
    ///
    /// Unlike the contract endpoints, a missing `x-pages` header here is an
    /// error: the worker cannot assemble a snapshot without knowing its size.
    pub async fn market_orders(
        &self,
        region_id: i32,
        page: i32,
    ) -> Result<(Vec<MarketOrder>, PageInfo)> {
        let url = format!("{}/markets/{}/orders/", self.base_url, region_id);
        let req = self
            .http
            .get(&url)
            .query(&[("order_type", "all".to_string()), ("page", page.to_string())])
            .build()?;
        let res = self.transport.execute(req).await?;
        let info = PageInfo {
            pages: headers::pages(res.headers())?,
            window: headers::time_until_cache_expires(res.headers()),
        };
        Ok((res.json().await?, info))
    }

    /// One page of `GET /contracts/public/{region_id}/`.
    pub async fn public_contracts(
        &self,
        region_id: i32,
        page: i32,
    ) -> Result<(Vec<Contract>, PageInfo)> {
        let url = format!("{}/contracts/public/{}/", self.base_url, region_id);
        self.paged(&url, page).await
    }

    /// One page of `GET /contracts/public/items/{contract_id}/`.
    pub async fn contract_items(
        &self,
        contract_id: i64,
        page: i32,
    ) -> Result<(Vec<ContractItem>, PageInfo)> {
        let url = format!("{}/contracts/public/items/{}/", self.base_url, contract_id);
        self.paged(&url, page).await
    }

    /// One page of `GET /contracts/public/bids/{contract_id}/`.
    pub async fn contract_bids(
        &self,
        contract_id: i64,
        page: i32,
    ) -> Result<(Vec<ContractBid>, PageInfo)> {
        let url = format!("{}/contracts/public/bids/{}/", self.base_url, contract_id);
        self.paged(&url, page).await
    }

    async fn paged<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        page: i32,
    ) -> Result<(Vec<T>, PageInfo)> {
        let req = self.http.get(url).query(&[("page", page)]).build()?;
        let res = self.transport.execute(req).await?;
        let info = PageInfo {
            pages: headers::pages_or_single(res.headers()),
            window: headers::time_until_cache_expires(res.headers()),
        };
        Ok((res.json().await?, info))
    }
}
