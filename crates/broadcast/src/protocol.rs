//! Wire envelope for messages pushed to WebSocket clients.

use serde::Serialize;

/// Actions carried on the `market` channel.
pub const ACTION_ADDITION: &str = "addition";
pub const ACTION_CHANGE: &str = "change";
pub const ACTION_DELETION: &str = "deletion";

/// Actions carried on the `contract` channel.
pub const ACTION_CONTRACT_ADDITION: &str = "contractAddition";
pub const ACTION_CONTRACT_CHANGE: &str = "contractChange";
pub const ACTION_CONTRACT_DELETION: &str = "contractDeletion";

/// Envelope every client-bound message is wrapped in.
///
/// On-register snapshots reuse the addition actions with a full list payload,
/// so clients handle exactly one shape per channel.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Payload")]
    pub payload: serde_json::Value,
}

impl Message {
    pub fn new<T: Serialize>(action: &str, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            action: action.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }
}
