//! Serde models for the ESI payloads the watcher consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One order from `GET /markets/{region_id}/orders/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrder {
    pub order_id: i64,
    pub type_id: i32,
    pub location_id: i64,
    pub system_id: i32,
    pub volume_total: i32,
    pub volume_remain: i32,
    pub min_volume: i32,
    pub price: f64,
    pub is_buy_order: bool,
    pub duration: i32,
    pub issued: DateTime<Utc>,
    pub range: String,
}

/// Public contract categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    ItemExchange,
    Auction,
    Courier,
    Loan,
    #[serde(other)]
    Unknown,
}

/// One contract header from `GET /contracts/public/{region_id}/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: i64,
    #[serde(rename = "type")]
    pub type_: ContractType,
    pub issuer_id: i32,
    pub issuer_corporation_id: i32,
    pub for_corporation: Option<bool>,
    pub date_issued: DateTime<Utc>,
    pub date_expired: DateTime<Utc>,
    pub title: Option<String>,
    pub price: Option<f64>,
    pub reward: Option<f64>,
    pub collateral: Option<f64>,
    pub buyout: Option<f64>,
    pub volume: Option<f64>,
    pub days_to_complete: Option<i32>,
    pub start_location_id: Option<i64>,
    pub end_location_id: Option<i64>,
}

/// One item from `GET /contracts/public/items/{contract_id}/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractItem {
    pub record_id: i64,
    pub type_id: i32,
    pub quantity: i32,
    pub is_included: bool,
    pub item_id: Option<i64>,
    pub is_blueprint_copy: Option<bool>,
    pub material_efficiency: Option<i32>,
    pub time_efficiency: Option<i32>,
    pub runs: Option<i32>,
}

/// One bid from `GET /contracts/public/bids/{contract_id}/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractBid {
    pub bid_id: i32,
    pub amount: f64,
    pub date_bid: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_type_deserializes_known_and_unknown() {
        let t: ContractType = serde_json::from_str("\"item_exchange\"").unwrap();
        assert_eq!(t, ContractType::ItemExchange);
        let t: ContractType = serde_json::from_str("\"auction\"").unwrap();
        assert_eq!(t, ContractType::Auction);
        let t: ContractType = serde_json::from_str("\"unknown_future_type\"").unwrap();
        assert_eq!(t, ContractType::Unknown);
    }

    #[test]
    fn market_order_deserializes_esi_shape() {
        let json = r#"{
            "order_id": 4000000000001,
            "type_id": 34,
            "location_id": 60003760,
            "system_id": 30000142,
            "volume_total": 1000,
            "volume_remain": 750,
            "min_volume": 1,
            "price": 5.05,
            "is_buy_order": true,
            "duration": 90,
            "issued": "2026-07-30T14:00:00Z",
            "range": "station"
        }"#;
        let order: MarketOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.order_id, 4_000_000_000_001);
        assert!(order.is_buy_order);
        assert_eq!(order.range, "station");
    }
}
