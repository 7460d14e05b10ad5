//! The transport adapter contract.
//!
//! The ground station never speaks a wire protocol directly.  Each protocol
//! lives behind a [`TransportAdapter`] that owns exactly one connection and
//! reports [`TransportEvent`]s to exactly one [`AdapterListener`].
//!
//! # Overview
//!
//! - [`TransportAdapter`] – the trait every adapter implements.
//! - [`SocketAdapter`][crate::socket_adapter::SocketAdapter] – multiplexed
//!   JSON records over a plain WebSocket.
//! - [`BridgeAdapter`][crate::bridge_adapter::BridgeAdapter] – topic
//!   subscriptions over a `rosbridge_server` WebSocket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use iris_types::{IrisError, TopicNames, TransportEvent, TransportKind};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bridge_adapter::BridgeAdapter;
use crate::socket_adapter::SocketAdapter;

/// A [`TransportEvent`] stamped with the session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterEnvelope {
    pub session: Uuid,
    pub event: TransportEvent,
}

/// The single listener an adapter reports to.
///
/// Clones share one liveness flag.  Once [`silence`][Self::silence] has been
/// called no clone delivers anything, even if I/O that was already in flight
/// completes afterwards.
#[derive(Debug, Clone)]
pub struct AdapterListener {
    session: Uuid,
    tx: mpsc::UnboundedSender<AdapterEnvelope>,
    alive: Arc<AtomicBool>,
}

impl AdapterListener {
    pub fn new(session: Uuid, tx: mpsc::UnboundedSender<AdapterEnvelope>) -> Self {
        Self {
            session,
            tx,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Listener with a fresh session id and its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AdapterEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(Uuid::new_v4(), tx), rx)
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Stop all further delivery from this listener and its clones.
    pub fn silence(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Deliver `event` unless the listener has been silenced.
    ///
    /// Returns `false` when nothing was delivered.
    pub fn emit(&self, event: TransportEvent) -> bool {
        if !self.is_alive() {
            return false;
        }
        self.tx
            .send(AdapterEnvelope {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// Every transport adapter implements this trait.
///
/// # Contract
///
/// * `open` – validates `endpoint` and starts connecting in the background.
///   The outcome arrives on the listener as [`TransportEvent::Opened`] or
///   [`TransportEvent::Error`], followed by data events and at most one
///   [`TransportEvent::Closed`] / [`TransportEvent::Error`].
///
/// * `subscribe` – binds topic names for adapters that multiplex by topic.
///   Adapters without topics accept and ignore it.
///
/// * `close` – idempotent and safe even if `open` was never called.  After
///   it returns the listener delivers nothing further.
pub trait TransportAdapter: Send {
    fn kind(&self) -> TransportKind;

    /// Begin connecting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`IrisError::Connect`] when `endpoint` is not a usable
    /// WebSocket URI or the adapter was already opened.
    fn open(&mut self, endpoint: &str) -> Result<(), IrisError>;

    /// Subscribe to the given topics.
    fn subscribe(&mut self, topics: &TopicNames) -> Result<(), IrisError>;

    /// Shut the connection down and silence the listener.
    fn close(&mut self);
}

/// Build the adapter variant for `kind`, reporting to `listener`.
pub fn create_adapter(kind: TransportKind, listener: AdapterListener) -> Box<dyn TransportAdapter> {
    match kind {
        TransportKind::Socket => Box::new(SocketAdapter::new(listener)),
        TransportKind::Bridge => Box::new(BridgeAdapter::new(listener)),
    }
}
