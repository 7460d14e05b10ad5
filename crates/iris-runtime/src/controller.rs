//! [`ConnectionController`] – the protocol-agnostic heart of the ground station.
//!
//! Owns the active [`TransportAdapter`], the single [`TelemetrySnapshot`],
//! the [`ConnectionState`] machine and one [`FrameRateTracker`] per image
//! channel, and routes every normalized event to the [`RenderSink`].
//!
//! # State machine
//!
//! ```text
//! Disconnected --connect()--> Connecting --Opened--> Connected
//!      ^                          |                      |
//!      +------ Error / Closed ----+------ Closed/Error --+
//!      +--------------------- disconnect() --------------+
//! ```
//!
//! # Event loop
//!
//! The controller is driven by [`step`][ConnectionController::step], which
//! awaits exactly one occurrence (an adapter event, a finished image decode,
//! or the once-per-second frame-rate report) and handles it to completion on
//! `&mut self` before returning.  State is always mutated first, so each
//! event is applied atomically with respect to every other.
//!
//! Every adapter gets a fresh session id.  Events stamped with any other
//! session are discarded, which keeps a disconnected adapter inert even if
//! its I/O completes afterwards.

use std::time::Duration;

use iris_media::{FrameRateTracker, ImageBitmap, ImageDecoder};
use iris_middleware::{AdapterEnvelope, AdapterListener, TransportAdapter, create_adapter};
use iris_types::{
    ConnectionState, ImageChannel, ImageFrame, IrisError, Severity, TelemetrySnapshot, TopicNames, TransportEvent,
    TransportKind,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::sink::RenderSink;

/// Period of the frame-rate report.
pub const RATE_REPORT_PERIOD: Duration = Duration::from_secs(1);

/// Builds the adapter for a connection attempt.
pub type AdapterFactory = Box<dyn Fn(TransportKind, AdapterListener) -> Box<dyn TransportAdapter> + Send>;

struct ActiveAdapter {
    adapter: Box<dyn TransportAdapter>,
    session: Uuid,
    kind: TransportKind,
    topics: Option<TopicNames>,
}

struct DecodedFrame {
    session: Uuid,
    channel: ImageChannel,
    declared: (Option<u32>, Option<u32>),
    result: Result<ImageBitmap, IrisError>,
}

#[derive(Debug, Default)]
struct ChannelRates {
    raw: FrameRateTracker,
    processed: FrameRateTracker,
}

impl ChannelRates {
    fn get_mut(&mut self, channel: ImageChannel) -> &mut FrameRateTracker {
        match channel {
            ImageChannel::Raw => &mut self.raw,
            ImageChannel::Processed => &mut self.processed,
        }
    }

    fn reset(&mut self) {
        let now = std::time::Instant::now();
        self.raw.reset_at(now);
        self.processed.reset_at(now);
    }
}

/// Owns the connection lifecycle and dispatches normalized events.
pub struct ConnectionController<S: RenderSink> {
    sink: S,
    state: ConnectionState,
    snapshot: TelemetrySnapshot,
    active: Option<ActiveAdapter>,
    factory: AdapterFactory,
    decoder: ImageDecoder,
    rates: ChannelRates,
    rate_timer: Option<Interval>,
    events_tx: mpsc::UnboundedSender<AdapterEnvelope>,
    events_rx: mpsc::UnboundedReceiver<AdapterEnvelope>,
    decoded_tx: mpsc::UnboundedSender<DecodedFrame>,
    decoded_rx: mpsc::UnboundedReceiver<DecodedFrame>,
}

impl<S: RenderSink> ConnectionController<S> {
    /// Create a disconnected controller that reports to `sink`.
    pub fn new(sink: S) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (decoded_tx, decoded_rx) = mpsc::unbounded_channel();
        Self {
            sink,
            state: ConnectionState::Disconnected,
            snapshot: TelemetrySnapshot::default(),
            active: None,
            factory: Box::new(create_adapter),
            decoder: ImageDecoder::new(),
            rates: ChannelRates::default(),
            rate_timer: None,
            events_tx,
            events_rx,
            decoded_tx,
            decoded_rx,
        }
    }

    /// Replace how adapters are built (builder-style).
    pub fn with_adapter_factory(mut self, factory: AdapterFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.snapshot
    }

    /// Transport kind of the active adapter, if any.
    pub fn active_kind(&self) -> Option<TransportKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    /// Last reported frame rate of `channel`.
    pub fn frame_rate(&self, channel: ImageChannel) -> u32 {
        match channel {
            ImageChannel::Raw => self.rates.raw.rate(),
            ImageChannel::Processed => self.rates.processed.rate(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Start connecting to `endpoint` with the adapter matching `kind`.
    ///
    /// Returns once the attempt is under way; the outcome arrives through
    /// [`step`][Self::step].  Bridge connections need `topics`, which are
    /// subscribed as soon as the connection opens.
    ///
    /// Errors returned here are the caller's to report; everything surfaced
    /// later through `step` has already been passed to the sink.
    ///
    /// # Errors
    ///
    /// * [`IrisError::AlreadyActive`] if a connection is in progress or up.
    ///   Nothing else changes.
    /// * [`IrisError::Connect`] if the endpoint is empty, topics are missing
    ///   for a bridge, or the adapter rejects the endpoint.
    pub fn connect(&mut self, kind: TransportKind, endpoint: &str, topics: Option<TopicNames>) -> Result<(), IrisError> {
        if self.state != ConnectionState::Disconnected {
            debug!(state = %self.state, "connect rejected");
            return Err(IrisError::AlreadyActive(self.state));
        }
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(IrisError::Connect("please enter a server URL".to_string()));
        }
        if kind.uses_topics() && topics.is_none() {
            return Err(IrisError::Connect(format!("{kind} connections need topic names")));
        }

        // Each session counts frames from zero, on a fresh report period.
        self.rates.reset();
        self.rate_timer = None;

        let session = Uuid::new_v4();
        let listener = AdapterListener::new(session, self.events_tx.clone());
        let mut adapter = (self.factory)(kind, listener);

        self.set_state(ConnectionState::Connecting);
        info!(session = %session, %kind, endpoint, "connecting");
        self.sink
            .on_log(&format!("Connecting to {kind} endpoint: {endpoint}"), Severity::Info);

        if let Err(e) = adapter.open(endpoint) {
            warn!(session = %session, error = %e, "adapter rejected endpoint");
            adapter.close();
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }

        self.active = Some(ActiveAdapter {
            adapter,
            session,
            kind,
            topics,
        });
        Ok(())
    }

    /// Close the active adapter, if any, and return to `Disconnected`.
    ///
    /// Idempotent; safe before any `connect`.
    pub fn disconnect(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.adapter.close();
            info!(session = %active.session, "disconnected");
            self.sink.on_log("Disconnected from server", Severity::Info);
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Wait for the next occurrence and handle it.
    ///
    /// Returns the error surfaced by that occurrence, if any.  Only a failed
    /// connection attempt or a lost connection changes state; decode errors
    /// and unrecognized messages are reported and processing continues.
    pub async fn step(&mut self) -> Option<IrisError> {
        let timer = self.rate_timer.get_or_insert_with(|| {
            let mut timer = tokio::time::interval_at(Instant::now() + RATE_REPORT_PERIOD, RATE_REPORT_PERIOD);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        tokio::select! {
            Some(envelope) = self.events_rx.recv() => self.handle_envelope(envelope),
            Some(decoded) = self.decoded_rx.recv() => self.handle_decoded(decoded),
            _ = timer.tick() => {
                self.report_rates();
                None
            }
        }
    }

    /// Apply one adapter event.
    pub fn handle_envelope(&mut self, envelope: AdapterEnvelope) -> Option<IrisError> {
        let Some(active) = self.active.as_mut() else {
            trace!(session = %envelope.session, "event with no active adapter dropped");
            return None;
        };
        if envelope.session != active.session {
            trace!(session = %envelope.session, "stale event dropped");
            return None;
        }

        match envelope.event {
            TransportEvent::Opened => {
                if self.state != ConnectionState::Connecting {
                    return None;
                }
                let session = active.session;
                let subscribe = match (&active.topics, active.kind.uses_topics()) {
                    (Some(topics), true) => Some(active.adapter.subscribe(topics)),
                    _ => None,
                };
                self.set_state(ConnectionState::Connected);
                info!(session = %session, "connected");
                self.sink.on_log("Connected successfully", Severity::Success);

                match subscribe {
                    Some(Ok(())) => {
                        self.sink.on_log("Subscribed to bridge topics", Severity::Success);
                        None
                    }
                    Some(Err(e)) => {
                        self.teardown();
                        self.report(&e);
                        Some(e)
                    }
                    None => None,
                }
            }
            TransportEvent::Telemetry(patch) => {
                if self.state == ConnectionState::Connected && self.snapshot.merge(&patch) {
                    self.sink.on_telemetry(&self.snapshot);
                }
                None
            }
            TransportEvent::Image(frame) => {
                if self.state == ConnectionState::Connected {
                    let session = active.session;
                    self.rates.get_mut(frame.channel).tick();
                    self.spawn_decode(session, frame);
                }
                None
            }
            TransportEvent::Unrecognized(what) => {
                let err = IrisError::UnrecognizedMessage(what);
                self.report(&err);
                Some(err)
            }
            TransportEvent::DecodeError(msg) => {
                let err = IrisError::Decode(msg);
                self.report(&err);
                Some(err)
            }
            TransportEvent::Closed => {
                let err = self.lost("remote end closed the connection".to_string());
                Some(err)
            }
            TransportEvent::Error(msg) => {
                let err = self.lost(msg);
                Some(err)
            }
        }
    }

    fn handle_decoded(&mut self, decoded: DecodedFrame) -> Option<IrisError> {
        let current = self.active.as_ref().map(|a| a.session);
        if current != Some(decoded.session) || self.state != ConnectionState::Connected {
            trace!(session = %decoded.session, "decoded frame from a closed session dropped");
            return None;
        }
        match decoded.result {
            Ok(bitmap) => {
                if let (Some(w), Some(h)) = decoded.declared {
                    if (w, h) != (bitmap.width, bitmap.height) {
                        debug!(channel = %decoded.channel, declared_w = w, declared_h = h,
                            width = bitmap.width, height = bitmap.height, "frame size differs from announced size");
                    }
                }
                self.sink.on_image_frame(decoded.channel, &bitmap);
                None
            }
            Err(e) => {
                self.report(&e);
                Some(e)
            }
        }
    }

    /// Decode off the event loop.  Whichever decode finishes last is what
    /// the sink shows; there is no reordering.
    fn spawn_decode(&self, session: Uuid, frame: ImageFrame) {
        let decoder = self.decoder;
        let tx = self.decoded_tx.clone();
        tokio::task::spawn_blocking(move || {
            let result = decoder.decode(&frame.payload);
            let _ = tx.send(DecodedFrame {
                session,
                channel: frame.channel,
                declared: (frame.width, frame.height),
                result,
            });
        });
    }

    fn report_rates(&mut self) {
        for channel in ImageChannel::ALL {
            let fps = self.rates.get_mut(channel).report();
            self.sink.on_frame_rate(channel, fps);
        }
    }

    /// Connection failed or dropped: tear down and classify the error.
    fn lost(&mut self, reason: String) -> IrisError {
        let err = if self.state == ConnectionState::Connecting {
            IrisError::Connect(reason)
        } else {
            IrisError::TransportClosed(reason)
        };
        self.teardown();
        self.report(&err);
        err
    }

    fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.adapter.close();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "connection state");
            self.state = state;
            self.sink.on_connection_state_changed(state);
        }
    }

    fn report(&mut self, err: &IrisError) {
        match err.severity() {
            Severity::Error => error!(error = %err, "connection error"),
            _ => warn!(error = %err, "transport warning"),
        }
        self.sink.on_log(&err.to_string(), err.severity());
    }
}
