//! Diagnostic logging for the ground station.
//!
//! The terminal dashboard owns stdout, so `tracing` output goes to stderr and
//! stays quiet (`warn`) unless `RUST_LOG` asks for more.  Adapter and
//! controller events can additionally be shipped to an OTLP collector.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | filter directives, default `warn` |
//! | `IRIS_LOG_FORMAT` | `json` for one JSON object per line, otherwise compact text |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | collector base URL; enables OTLP/HTTP span export |
//!
//! ```rust,no_run
//! let _guard = iris_runtime::telemetry::init_tracing("iris");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn";

/// Line format of the stderr log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// Read an `IRIS_LOG_FORMAT` value; anything but `json` is compact.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }

    /// Formatter layer writing to stderr.
    pub fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        match self {
            LogFormat::Compact => fmt.compact().boxed(),
            LogFormat::Json => fmt.json().boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit: dropping it shuts the tracer
/// provider down and flushes whatever spans are still queued.
///
/// # Panics
///
/// If a global subscriber is already installed.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let format = LogFormat::from_setting(std::env::var("IRIS_LOG_FORMAT").ok().as_deref());
    let provider = build_provider(service_name);
    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("iris")));

    tracing_subscriber::registry()
        .with(format.layer())
        .with(filter)
        .with(otel)
        .init();

    TracerProviderGuard(provider)
}

/// Shuts the OTLP tracer provider down on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// Whether spans are being exported.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[iris] tracer shutdown failed: {e}");
            }
        }
    }
}

/// Provider for `OTEL_EXPORTER_OTLP_ENDPOINT`, or `None` when unset or the
/// exporter cannot be built.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[iris] OTLP exporter unavailable: {e}"))
        .ok()?;

    let resource = Resource::builder().with_service_name(service_name.to_string()).build();

    // Installed before the CLI's runtime exists, so no batch processor.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_provider_without_endpoint() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(build_provider("iris-test").is_none());
    }

    #[test]
    fn json_format_is_opt_in() {
        assert_eq!(LogFormat::from_setting(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_setting(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::from_setting(Some("compact")), LogFormat::Compact);
        assert_eq!(LogFormat::from_setting(Some("")), LogFormat::Compact);
        assert_eq!(LogFormat::from_setting(None), LogFormat::Compact);
    }

    #[test]
    fn either_format_composes_with_filter_and_absent_exporter() {
        for format in [LogFormat::Compact, LogFormat::Json] {
            let otel: Option<tracing_subscriber::layer::Identity> = None;
            let subscriber = tracing_subscriber::registry()
                .with(format.layer())
                .with(EnvFilter::new("debug"))
                .with(otel);
            tracing::subscriber::with_default(subscriber, || {
                tracing::debug!(?format, "formatter installed");
            });
        }
    }

    #[test]
    fn guard_without_provider_is_inert() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }
}
