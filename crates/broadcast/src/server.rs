//! WebSocket endpoint.

use std::collections::{HashMap, HashSet};

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::client;
use crate::hub::HubHandle;

/// Build the router serving `GET /` as a WebSocket upgrade.
///
/// The query string selects channels: `?market=1&contract=1`. Any non-empty
/// value subscribes; unknown parameters are ignored.
pub fn router(hub: HubHandle) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(hub)
        .layer(CorsLayer::permissive())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(hub): State<HubHandle>,
) -> impl IntoResponse {
    let channels = subscribed_channels(hub.channels(), &params);
    ws.on_upgrade(move |socket| client::serve_connection(socket, hub, channels))
}

fn subscribed_channels(
    known: &[String],
    query: &HashMap<String, String>,
) -> HashSet<String> {
    known
        .iter()
        .filter(|channel| query.get(channel.as_str()).is_some_and(|v| !v.is_empty()))
        .cloned()
        .collect()
}
