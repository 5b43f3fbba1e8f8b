//! The fan-out event loop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{HubError, Result};
use crate::protocol::Message;

/// Capacity of each client's outbound queue.
pub const OUTBOUND_QUEUE: usize = 256;

/// Buffer between producers and the hub loop.
const COMMAND_BUFFER: usize = 64;

/// Snapshot callback invoked for every newly registered client.
///
/// Receives the client's subscription set and returns the `(channel,
/// message)` pairs that bring it up to date; the hub enqueues them under the
/// same drop policy as broadcasts.
pub type SnapshotFn = Box<dyn Fn(&HashSet<String>) -> Vec<(String, Message)> + Send + Sync>;

/// Hub-side record of one connected client.
pub struct Subscriber {
    pub id: Uuid,
    /// Channels the client opted into at connect time.
    pub channels: HashSet<String>,
    /// Bounded queue drained by the client's writer task.
    pub queue: mpsc::Sender<Message>,
}

enum Command {
    Register(Subscriber),
    Unregister(Uuid),
    Broadcast { channel: String, message: Message },
}

/// Maintains the set of active clients and fans broadcasts out to them.
///
/// The client map is touched only inside [`Hub::run`], so registration,
/// unregistration, and delivery are all serialized through one task.
pub struct Hub {
    channels: Arc<Vec<String>>,
    on_register: Vec<SnapshotFn>,
    clients: HashMap<Uuid, Subscriber>,
    rx: mpsc::Receiver<Command>,
    tx: mpsc::Sender<Command>,
}

/// Cloneable producer-side handle to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    channels: Arc<Vec<String>>,
    tx: mpsc::Sender<Command>,
}

impl Hub {
    pub fn new(channels: Vec<String>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        info!(?channels, "starting hub");
        Self {
            channels: Arc::new(channels),
            on_register: Vec::new(),
            clients: HashMap::new(),
            rx,
            tx,
        }
    }

    /// Register a snapshot callback. Must be called before [`Hub::run`].
    pub fn on_register(&mut self, f: impl Fn(&HashSet<String>) -> Vec<(String, Message)> + Send + Sync + 'static) {
        self.on_register.push(Box::new(f));
    }

    pub fn handle(&self) -> HubHandle {
        HubHandle {
            channels: self.channels.clone(),
            tx: self.tx.clone(),
        }
    }

    /// Drive the event loop. Runs for the life of the process.
    pub async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            match cmd {
                Command::Register(sub) => self.register(sub),
                Command::Unregister(id) => {
                    if self.clients.remove(&id).is_some() {
                        info!(client = %id, "unregistered client");
                    }
                }
                Command::Broadcast { channel, message } => self.broadcast(&channel, message),
            }
        }
    }

    fn register(&mut self, sub: Subscriber) {
        info!(client = %sub.id, channels = ?sub.channels, "registered client");

        for callback in &self.on_register {
            for (channel, message) in callback(&sub.channels) {
                if !sub.channels.contains(&channel) {
                    continue;
                }
                if let Err(err) = sub.queue.try_send(message) {
                    // A client that cannot absorb its own snapshot will
                    // never catch up.
                    warn!(client = %sub.id, error = %err, "snapshot overflow, dropping client");
                    return;
                }
            }
        }

        self.clients.insert(sub.id, sub);
    }

    fn broadcast(&mut self, channel: &str, message: Message) {
        let mut dropped = Vec::new();

        for (id, sub) in &self.clients {
            if !sub.channels.contains(channel) {
                continue;
            }
            match sub.queue.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(client = %id, channel, "outbound queue full, dropping client");
                    dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client = %id, "outbound queue closed, dropping client");
                    dropped.push(*id);
                }
            }
        }

        for id in dropped {
            self.clients.remove(&id);
        }
    }
}

impl HubHandle {
    /// Channels clients may subscribe to.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub async fn register(&self, sub: Subscriber) -> Result<()> {
        self.tx
            .send(Command::Register(sub))
            .await
            .map_err(|_| HubError::ChannelSend)
    }

    pub async fn unregister(&self, id: Uuid) -> Result<()> {
        self.tx
            .send(Command::Unregister(id))
            .await
            .map_err(|_| HubError::ChannelSend)
    }

    pub async fn broadcast(&self, channel: &str, message: Message) -> Result<()> {
        self.tx
            .send(Command::Broadcast {
                channel: channel.to_string(),
                message,
            })
            .await
            .map_err(|_| HubError::ChannelSend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ACTION_ADDITION;
    use std::time::Duration;
    use tokio::time::timeout;

    fn msg(n: u32) -> Message {
        Message::new(ACTION_ADDITION, &n).unwrap()
    }

    fn subscriber(channels: &[&str], capacity: usize) -> (Subscriber, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        let sub = Subscriber {
            id: Uuid::new_v4(),
            channels: channels.iter().map(|c| c.to_string()).collect(),
            queue: tx,
        };
        (sub, rx)
    }

    async fn recv(rx: &mut mpsc::Receiver<Message>) -> Option<Message> {
        timeout(Duration::from_secs(1), rx.recv()).await.unwrap()
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribed_clients_in_order() {
        let hub = Hub::new(vec!["market".into(), "contract".into()]);
        let handle = hub.handle();
        tokio::spawn(hub.run());

        let (sub, mut rx) = subscriber(&["market"], OUTBOUND_QUEUE);
        handle.register(sub).await.unwrap();

        for n in 0..3 {
            handle.broadcast("market", msg(n)).await.unwrap();
        }

        for n in 0..3 {
            let got = recv(&mut rx).await.unwrap();
            assert_eq!(got.payload, serde_json::json!(n));
        }
    }

    #[tokio::test]
    async fn unsubscribed_channel_is_not_delivered() {
        let hub = Hub::new(vec!["market".into(), "contract".into()]);
        let handle = hub.handle();
        tokio::spawn(hub.run());

        let (sub, mut rx) = subscriber(&["contract"], OUTBOUND_QUEUE);
        handle.register(sub).await.unwrap();

        handle.broadcast("market", msg(1)).await.unwrap();
        handle.broadcast("contract", msg(2)).await.unwrap();

        let got = recv(&mut rx).await.unwrap();
        assert_eq!(got.payload, serde_json::json!(2));
    }

    #[tokio::test]
    async fn saturated_queue_drops_the_client() {
        let hub = Hub::new(vec!["market".into()]);
        let handle = hub.handle();
        tokio::spawn(hub.run());

        let (sub, mut rx) = subscriber(&["market"], 1);
        handle.register(sub).await.unwrap();

        // First fills the queue, second overflows it and severs the client.
        handle.broadcast("market", msg(1)).await.unwrap();
        handle.broadcast("market", msg(2)).await.unwrap();
        // The hub must keep serving other commands afterwards.
        handle.broadcast("market", msg(3)).await.unwrap();

        let got = recv(&mut rx).await.unwrap();
        assert_eq!(got.payload, serde_json::json!(1));
        // Queue sender was dropped with the client record.
        assert!(recv(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn snapshot_arrives_before_subsequent_deltas() {
        let mut hub = Hub::new(vec!["market".into()]);
        hub.on_register(|channels| {
            assert!(channels.contains("market"));
            vec![("market".to_string(), msg(100))]
        });
        let handle = hub.handle();
        tokio::spawn(hub.run());

        let (sub, mut rx) = subscriber(&["market"], OUTBOUND_QUEUE);
        handle.register(sub).await.unwrap();
        handle.broadcast("market", msg(1)).await.unwrap();

        let snapshot = recv(&mut rx).await.unwrap();
        assert_eq!(snapshot.payload, serde_json::json!(100));
        let delta = recv(&mut rx).await.unwrap();
        assert_eq!(delta.payload, serde_json::json!(1));
    }

    #[tokio::test]
    async fn snapshot_respects_subscription_set() {
        let mut hub = Hub::new(vec!["market".into(), "contract".into()]);
        hub.on_register(|_| {
            vec![
                ("market".to_string(), msg(1)),
                ("contract".to_string(), msg(2)),
            ]
        });
        let handle = hub.handle();
        tokio::spawn(hub.run());

        let (sub, mut rx) = subscriber(&["contract"], OUTBOUND_QUEUE);
        handle.register(sub).await.unwrap();

        let got = recv(&mut rx).await.unwrap();
        assert_eq!(got.payload, serde_json::json!(2));

        // Nothing else queued.
        handle.broadcast("contract", msg(3)).await.unwrap();
        let next = recv(&mut rx).await.unwrap();
        assert_eq!(next.payload, serde_json::json!(3));
    }
}
