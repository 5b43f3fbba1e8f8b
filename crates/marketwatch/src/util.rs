//! Shared worker helpers.

use std::time::Duration;

use broadcast::{HubHandle, Message};
use rand::rngs::OsRng;
use rand::Rng;
use serde::Serialize;
use tracing::warn;

/// Sleep for `additional` plus a random `[0, max)` seconds at 0.1 s
/// resolution, drawn from the OS CSPRNG.
///
/// Decorrelates page fan-outs across regions so dozens of workers do not
/// strike ESI in the same instant.
pub async fn sleep_random(max: u64, additional: f64) {
    let tenths = OsRng.gen_range(0..max * 10);
    let secs = additional + tenths as f64 / 10.0;
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

/// Broadcast a delta batch, skipping empty ones.
pub async fn emit<T: Serialize>(hub: &HubHandle, channel: &str, action: &str, payload: &[T]) {
    if payload.is_empty() {
        return;
    }
    match Message::new(action, &payload) {
        Ok(message) => {
            if let Err(err) = hub.broadcast(channel, message).await {
                warn!(channel, action, error = %err, "broadcast failed");
            }
        }
        Err(err) => warn!(action, error = %err, "failed to encode broadcast payload"),
    }
}
