//! Client for the EVE Swagger Interface (ESI).
//!
//! Every request goes through [`transport::EsiTransport`], which bounds
//! process-wide concurrency, retries server errors, and backs off according
//! to the error budget ESI advertises in its response headers. The typed
//! endpoint wrappers in [`client::EsiClient`] additionally surface the
//! pagination and cache-expiry metadata the polling workers schedule around.

pub mod client;
pub mod error;
pub mod headers;
pub mod regions;
pub mod transport;
pub mod types;

pub use client::{EsiClient, EsiConfig, PageInfo};
pub use error::{EsiError, Result};
pub use regions::is_market_region;
pub use types::{Contract, ContractBid, ContractItem, ContractType, MarketOrder};
