//! `iris-middleware` – transport adapters.
//!
//! Translates the two wire protocols a vehicle may speak into the single
//! normalized [`TransportEvent`][iris_types::TransportEvent] stream the
//! ground station consumes.
//!
//! # Modules
//!
//! - [`adapter`] – the [`TransportAdapter`] trait and the
//!   [`AdapterListener`] every adapter reports to.
//! - [`socket_adapter`] – [`SocketAdapter`]: one multiplexed WebSocket
//!   carrying self-describing `{"type": ...}` JSON records.
//! - [`bridge_adapter`] – [`BridgeAdapter`]: a `rosbridge_server` WebSocket
//!   with four independently typed topic subscriptions.

pub mod adapter;
pub mod bridge_adapter;
mod session;
pub mod socket_adapter;

pub use adapter::{AdapterEnvelope, AdapterListener, TransportAdapter, create_adapter};
pub use bridge_adapter::BridgeAdapter;
pub use socket_adapter::SocketAdapter;
