//! `iris-types` – shared vocabulary of the IRIS ground station.
//!
//! Everything that crosses a crate boundary lives here: the merged
//! [`TelemetrySnapshot`] and its [`TelemetryPatch`] updates, image frames,
//! the normalized [`TransportEvent`] every adapter emits, connection states
//! and the [`IrisError`] taxonomy.

pub mod snapshot;

pub use snapshot::{LaneStatus, Obstacle, ObstaclePatch, ObstaclePosition, TelemetryPatch, TelemetrySnapshot};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle of the single ground-station connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Which wire protocol a connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Multiplexed stream of self-describing JSON text frames.
    #[default]
    Socket,
    /// rosbridge-compatible publish/subscribe WebSocket.
    Bridge,
}

impl TransportKind {
    /// Whether connecting with this kind requires topic names.
    pub fn uses_topics(self) -> bool {
        matches!(self, TransportKind::Bridge)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Socket => write!(f, "socket"),
            TransportKind::Bridge => write!(f, "bridge"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "socket" | "websocket" | "ws" => Ok(TransportKind::Socket),
            "bridge" | "ros" | "rosbridge" => Ok(TransportKind::Bridge),
            other => Err(format!("unknown transport kind '{other}' (expected socket or bridge)")),
        }
    }
}

/// Topic names the bridge subscribes to, one per role.
///
/// Every role is configured independently; nothing here supplies defaults.
/// The persisted form lives with the CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNames {
    pub raw_image: String,
    pub processed_image: String,
    pub steering: String,
    pub speed: String,
}

/// A named image stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageChannel {
    Raw,
    Processed,
}

impl ImageChannel {
    pub const ALL: [ImageChannel; 2] = [ImageChannel::Raw, ImageChannel::Processed];
}

impl fmt::Display for ImageChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageChannel::Raw => write!(f, "raw"),
            ImageChannel::Processed => write!(f, "processed"),
        }
    }
}

/// Encoded image data as it arrived on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// Base64 text, with or without a `data:image/...` URI prefix.
    Encoded(String),
    /// Raw encoded image bytes (JPEG, PNG, ...).
    Bytes(Vec<u8>),
}

/// A single image frame handed from an adapter to the controller.
///
/// Frames are transient: nothing keeps them once they are decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub channel: ImageChannel,
    pub payload: ImagePayload,
    /// Width announced by the sender, if any.
    pub width: Option<u32>,
    /// Height announced by the sender, if any.
    pub height: Option<u32>,
}

/// Normalized output of every transport adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The underlying connection is established.
    Opened,
    /// A partial telemetry update.
    Telemetry(TelemetryPatch),
    /// An encoded image frame.
    Image(ImageFrame),
    /// A well-formed message whose tag, op or topic is not known.
    Unrecognized(String),
    /// A message that could not be decoded; the connection stays up.
    DecodeError(String),
    /// The remote end closed the connection.
    Closed,
    /// The connection failed or dropped.
    Error(String),
}

/// Severity attached to every log line handed to a render sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Error taxonomy of the ground-station core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IrisError {
    /// Endpoint missing, invalid, unreachable or refused.
    #[error("Connect Error: {0}")]
    Connect(String),

    /// Malformed message or image payload.
    #[error("Decode Error: {0}")]
    Decode(String),

    /// Message with a tag, op or topic nobody handles.
    #[error("Unrecognized Message: {0}")]
    UnrecognizedMessage(String),

    /// The remote end closed or dropped the connection.
    #[error("Transport Closed: {0}")]
    TransportClosed(String),

    /// `connect` was called while a connection is already in progress or up.
    #[error("Connection already {0}")]
    AlreadyActive(ConnectionState),
}

impl IrisError {
    /// Severity used when this error is reported to the log sink.
    pub fn severity(&self) -> Severity {
        match self {
            IrisError::Decode(_) | IrisError::UnrecognizedMessage(_) => Severity::Warning,
            IrisError::TransportClosed(_) => Severity::Warning,
            IrisError::Connect(_) | IrisError::AlreadyActive(_) => Severity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_parses_aliases() {
        assert_eq!("socket".parse::<TransportKind>().unwrap(), TransportKind::Socket);
        assert_eq!("WebSocket".parse::<TransportKind>().unwrap(), TransportKind::Socket);
        assert_eq!("ros".parse::<TransportKind>().unwrap(), TransportKind::Bridge);
        assert_eq!(" bridge ".parse::<TransportKind>().unwrap(), TransportKind::Bridge);
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[test]
    fn only_bridge_uses_topics() {
        assert!(TransportKind::Bridge.uses_topics());
        assert!(!TransportKind::Socket.uses_topics());
    }

    #[test]
    fn transport_kind_serializes_lowercase() {
        let json = serde_json::to_string(&TransportKind::Bridge).unwrap();
        assert_eq!(json, "\"bridge\"");
    }

    #[test]
    fn iris_error_display() {
        let err = IrisError::AlreadyActive(ConnectionState::Connecting);
        assert_eq!(err.to_string(), "Connection already connecting");

        let err = IrisError::Connect("refused".to_string());
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn iris_error_severity() {
        assert_eq!(IrisError::Decode("x".into()).severity(), Severity::Warning);
        assert_eq!(IrisError::UnrecognizedMessage("x".into()).severity(), Severity::Warning);
        assert_eq!(IrisError::Connect("x".into()).severity(), Severity::Error);
    }

    #[test]
    fn default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn state_and_channel_labels_are_lowercase() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        let labels: Vec<String> = ImageChannel::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(labels, ["raw", "processed"]);
    }
}
