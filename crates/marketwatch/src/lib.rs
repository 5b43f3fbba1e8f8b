//! Live view of EVE's public markets and contracts.
//!
//! One market worker and one contract worker per region poll ESI in step
//! with its cache windows, diff each assembled snapshot against the
//! in-memory stores, and push the resulting deltas through the broadcast
//! hub. Clients connecting mid-stream get a full snapshot first.

pub mod contract_store;
pub mod order_store;
pub mod service;

mod contract_worker;
mod market_worker;
mod util;

pub use contract_store::{ContractChange, ContractDeletion, ContractStore, FullContract};
pub use order_store::{OrderChange, OrderDeletion, OrderStore};
pub use service::MarketWatch;
