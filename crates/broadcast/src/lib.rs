//! Channel-scoped WebSocket fan-out.
//!
//! A single [`hub::Hub`] event loop owns the set of connected clients and
//! serializes every state transition: registration, unregistration, and
//! broadcast. Producers hand it `(channel, message)` pairs; each client
//! carries a bounded outbound queue drained by its own writer task, so one
//! stuck peer can never stall delivery to the rest.
//!
//! ```text
//! workers ── broadcast(channel, msg) ──▶ Hub loop ──▶ per-client queues ──▶ WebSocket
//! ```

pub mod client;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod server;

pub use error::HubError;
pub use hub::{Hub, HubHandle, Subscriber, OUTBOUND_QUEUE};
pub use protocol::Message;
pub use server::router;
