//! Per-connection reader and writer tasks.

use std::collections::HashSet;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::hub::{HubHandle, Subscriber, OUTBOUND_QUEUE};
use crate::protocol::Message;

/// Keepalive ping cadence; must undercut the write deadline.
const PING_PERIOD: Duration = Duration::from_secs(54);

/// Per-frame write deadline.
const WRITE_DEADLINE: Duration = Duration::from_secs(60);

/// Drive one WebSocket connection until either side goes away.
///
/// The reader half exists only to observe disconnects: inbound frames are
/// discarded. The writer task drains the client's outbound queue; when the
/// hub drops the queue (unregister or back-pressure) it flushes a close
/// frame and exits.
pub async fn serve_connection(socket: WebSocket, hub: HubHandle, channels: HashSet<String>) {
    let id = Uuid::new_v4();
    let (queue_tx, queue_rx) = mpsc::channel(OUTBOUND_QUEUE);

    if hub
        .register(Subscriber {
            id,
            channels,
            queue: queue_tx,
        })
        .await
        .is_err()
    {
        warn!(client = %id, "hub unavailable, closing connection");
        return;
    }

    let (ws_tx, mut ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_pump(ws_tx, queue_rx));
    let mut writer_done = false;

    loop {
        tokio::select! {
            _ = &mut writer => {
                writer_done = true;
                break;
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(client = %id, error = %err, "read error, disconnecting");
                    break;
                }
                None => break,
            },
        }
    }

    if let Err(err) = hub.unregister(id).await {
        debug!(client = %id, error = %err, "hub gone during unregister");
    }

    // Give the writer a chance to flush the close frame before tearing the
    // connection down.
    if !writer_done && timeout(WRITE_DEADLINE, &mut writer).await.is_err() {
        writer.abort();
    }
}

async fn write_pump(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut queue: mpsc::Receiver<Message>,
) {
    let mut ping = interval(PING_PERIOD);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ping.reset();

    loop {
        tokio::select! {
            msg = queue.recv() => match msg {
                Some(msg) => {
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(err) => {
                            warn!(error = %err, "dropping unserializable message");
                            continue;
                        }
                    };
                    match timeout(WRITE_DEADLINE, ws_tx.send(WsMessage::Text(json.into()))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            debug!(error = %err, "write failed");
                            return;
                        }
                        Err(_) => {
                            warn!("write deadline exceeded");
                            return;
                        }
                    }
                }
                None => {
                    let _ = timeout(WRITE_DEADLINE, ws_tx.send(WsMessage::Close(None))).await;
                    return;
                }
            },
            _ = ping.tick() => {
                match timeout(WRITE_DEADLINE, ws_tx.send(WsMessage::Ping(Vec::new().into()))).await {
                    Ok(Ok(())) => {}
                    _ => return,
                }
            }
        }
    }
}
