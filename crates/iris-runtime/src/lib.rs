//! `iris-runtime` – the ground-station core loop.
//!
//! # Modules
//!
//! - [`controller`] – [`ConnectionController`][controller::ConnectionController]:
//!   owns the active transport adapter, the connection state machine, the
//!   merged [`TelemetrySnapshot`][iris_types::TelemetrySnapshot] and the
//!   per-channel frame-rate trackers, and forwards everything to a
//!   [`RenderSink`][sink::RenderSink].
//! - [`sink`] – [`RenderSink`][sink::RenderSink]: the presentation seam.
//!   The core never references a concrete UI.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: stderr
//!   logging in compact or JSON form, plus OTLP span export when
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` is set.

pub mod controller;
pub mod sink;
pub mod telemetry;

pub use controller::{AdapterFactory, ConnectionController, RATE_REPORT_PERIOD};
pub use sink::RenderSink;
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
