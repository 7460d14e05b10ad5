//! Socket adapter: one WebSocket, many self-describing records.
//!
//! Every text frame is a JSON object tagged by `type`:
//!
//! | `type` | fields | event |
//! |---|---|---|
//! | `image_raw` | `data`, optional `width` / `height` | raw image frame |
//! | `image_processed` | `data`, optional `width` / `height` | processed image frame |
//! | `telemetry` | `data`: partial telemetry object | telemetry patch |
//! | `steering_angle` | `value` | steering-only patch |
//! | `obstacle` | `detected`, `distance`, `position` | whole-obstacle patch |
//!
//! Unknown tags become [`TransportEvent::Unrecognized`]; frames that do not
//! have the expected shape become [`TransportEvent::DecodeError`].  Neither
//! closes the connection.
//!
//! Optional fields are best effort.  An unreadable obstacle position is
//! dropped from the patch and reported as a separate `DecodeError` after the
//! frame's own event; unusable image dimensions are simply omitted.

use std::convert::Infallible;

use iris_types::{
    ImageChannel, ImageFrame, ImagePayload, IrisError, LaneStatus, ObstaclePatch, ObstaclePosition,
    TelemetryPatch, TopicNames, TransportEvent, TransportKind,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::adapter::{AdapterListener, TransportAdapter};
use crate::session::{Session, SessionHandler};

/// Adapter for the multiplexed JSON-record protocol.
pub struct SocketAdapter {
    listener: AdapterListener,
    session: Option<Session<Infallible>>,
}

impl SocketAdapter {
    pub fn new(listener: AdapterListener) -> Self {
        Self {
            listener,
            session: None,
        }
    }

    /// Translate one text frame into its primary [`TransportEvent`].
    pub fn parse_frame(text: &str) -> TransportEvent {
        match decode_frame(text) {
            Ok(decoded) => decoded.event,
            Err(e) => TransportEvent::DecodeError(e),
        }
    }

    /// Every event one text frame produces: the primary event followed by a
    /// `DecodeError` for each optional field that was dropped.
    pub fn frame_events(text: &str) -> Vec<TransportEvent> {
        match decode_frame(text) {
            Ok(decoded) => std::iter::once(decoded.event)
                .chain(decoded.dropped.into_iter().map(TransportEvent::DecodeError))
                .collect(),
            Err(e) => vec![TransportEvent::DecodeError(e)],
        }
    }
}

impl TransportAdapter for SocketAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn open(&mut self, endpoint: &str) -> Result<(), IrisError> {
        if self.session.is_some() || !self.listener.is_alive() {
            return Err(IrisError::Connect("socket adapter already used".to_string()));
        }
        let session = Session::start(endpoint, self.listener.clone(), SocketHandler)?;
        info!(session = %self.listener.session(), endpoint, "socket adapter connecting");
        self.session = Some(session);
        Ok(())
    }

    fn subscribe(&mut self, _topics: &TopicNames) -> Result<(), IrisError> {
        debug!("socket adapter ignores topic subscriptions");
        Ok(())
    }

    fn close(&mut self) {
        self.listener.silence();
        if let Some(session) = self.session.take() {
            session.close();
            info!(session = %self.listener.session(), "socket adapter closed");
        }
    }
}

impl Drop for SocketAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

struct SocketHandler;

impl SessionHandler for SocketHandler {
    type Command = Infallible;

    fn on_text(&mut self, text: &str) -> Vec<TransportEvent> {
        SocketAdapter::frame_events(text)
    }

    fn on_command(&mut self, command: Infallible) -> Vec<String> {
        match command {}
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ImageMessage {
    data: String,
    width: Option<Value>,
    height: Option<Value>,
}

#[derive(Deserialize)]
struct TelemetryMessage {
    data: WireTelemetry,
}

#[derive(Deserialize)]
struct SteeringMessage {
    value: f64,
}

#[derive(Deserialize)]
struct ObstacleMessage {
    detected: bool,
    distance: f64,
    position: String,
}

/// Partial telemetry object.  Accepts the field names the vehicle firmware
/// has used over time; unknown keys are ignored.
#[derive(Deserialize, Default)]
#[serde(default)]
struct WireTelemetry {
    #[serde(rename = "steeringAngleDeg", alias = "steering_angle")]
    steering_angle_deg: Option<f64>,
    #[serde(rename = "laneStatus", alias = "lane_status")]
    lane_status: Option<String>,
    #[serde(rename = "speedCmPerSec", alias = "speed")]
    speed_cm_per_sec: Option<f64>,
    #[serde(rename = "distanceTraveledM", alias = "jarakTempuh")]
    distance_traveled_m: Option<f64>,
    #[serde(rename = "laneWidth", alias = "lane_width")]
    lane_width: Option<f64>,
    deviation: Option<f64>,
    #[serde(rename = "obstacleDetected")]
    obstacle_detected: Option<bool>,
    #[serde(rename = "obstacleDistance")]
    obstacle_distance: Option<f64>,
    #[serde(rename = "obstaclePosition")]
    obstacle_position: Option<String>,
    obstacle: Option<WireObstacle>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireObstacle {
    detected: Option<bool>,
    #[serde(alias = "distanceCm")]
    distance: Option<f64>,
    position: Option<String>,
}

/// A decoded frame plus the optional fields that had to be dropped.
struct Decoded {
    event: TransportEvent,
    dropped: Vec<String>,
}

impl From<TransportEvent> for Decoded {
    fn from(event: TransportEvent) -> Self {
        Self {
            event,
            dropped: Vec::new(),
        }
    }
}

fn decode_frame(text: &str) -> Result<Decoded, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| format!("malformed frame: {e}"))?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "frame has no string 'type' field".to_string())?
        .to_owned();

    let decoded: Decoded = match tag.as_str() {
        "image_raw" => image_event(ImageChannel::Raw, fields(&tag, value)?).into(),
        "image_processed" => image_event(ImageChannel::Processed, fields(&tag, value)?).into(),
        "telemetry" => {
            let msg: TelemetryMessage = fields(&tag, value)?;
            let mut dropped = Vec::new();
            let patch = msg.data.into_patch(&mut dropped);
            Decoded {
                event: TransportEvent::Telemetry(patch),
                dropped,
            }
        }
        "steering_angle" => {
            let msg: SteeringMessage = fields(&tag, value)?;
            TransportEvent::Telemetry(TelemetryPatch::steering(msg.value)).into()
        }
        "obstacle" => {
            let msg: ObstacleMessage = fields(&tag, value)?;
            let mut dropped = Vec::new();
            let patch = ObstaclePatch {
                detected: Some(msg.detected),
                distance_cm: Some(msg.distance),
                position: parse_position(Some(msg.position), &mut dropped),
            };
            Decoded {
                event: TransportEvent::Telemetry(TelemetryPatch::obstacle(patch)),
                dropped,
            }
        }
        _ => TransportEvent::Unrecognized(tag).into(),
    };
    Ok(decoded)
}

fn fields<T: DeserializeOwned>(tag: &str, value: Value) -> Result<T, String> {
    serde_json::from_value(value).map_err(|e| format!("invalid '{tag}' message: {e}"))
}

fn image_event(channel: ImageChannel, msg: ImageMessage) -> TransportEvent {
    TransportEvent::Image(ImageFrame {
        channel,
        payload: ImagePayload::Encoded(msg.data),
        width: dimension("width", msg.width),
        height: dimension("height", msg.height),
    })
}

/// A declared dimension, if it is a whole number that fits in `u32`.
/// `640.0` is accepted; `640.5`, negatives and non-numbers are omitted.
fn dimension(name: &str, raw: Option<Value>) -> Option<u32> {
    let raw = raw?;
    let usable = raw
        .as_f64()
        .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= f64::from(u32::MAX))
        .map(|v| v as u32);
    if usable.is_none() {
        debug!(field = name, value = %raw, "ignoring unusable image dimension");
    }
    usable
}

/// Blank positions count as absent; unreadable ones are dropped and noted.
fn parse_position(raw: Option<String>, dropped: &mut Vec<String>) -> Option<ObstaclePosition> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(p) => Some(p),
        Err(e) => {
            dropped.push(format!("obstacle position dropped: {e}"));
            None
        }
    }
}

impl WireTelemetry {
    fn into_patch(self, dropped: &mut Vec<String>) -> TelemetryPatch {
        let mut obstacle = match self.obstacle {
            Some(o) => ObstaclePatch {
                detected: o.detected,
                distance_cm: o.distance,
                position: parse_position(o.position, dropped),
            },
            None => ObstaclePatch::default(),
        };
        // Flat keys win over the nested object when both are present.
        if self.obstacle_detected.is_some() {
            obstacle.detected = self.obstacle_detected;
        }
        if self.obstacle_distance.is_some() {
            obstacle.distance_cm = self.obstacle_distance;
        }
        if let Some(p) = parse_position(self.obstacle_position, dropped) {
            obstacle.position = Some(p);
        }

        TelemetryPatch {
            steering_angle_deg: self.steering_angle_deg,
            lane_status: self.lane_status.as_deref().map(LaneStatus::from_wire),
            speed_cm_per_sec: self.speed_cm_per_sec,
            distance_traveled_m: self.distance_traveled_m,
            lane_width: self.lane_width,
            deviation: self.deviation,
            obstacle: (!obstacle.is_empty()).then_some(obstacle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::{accept_async, tungstenite::Message};

    #[test]
    fn steering_angle_touches_only_steering() {
        let event = SocketAdapter::parse_frame(r#"{"type":"steering_angle","value":12.5}"#);
        assert_eq!(event, TransportEvent::Telemetry(TelemetryPatch::steering(12.5)));
    }

    #[test]
    fn unknown_type_is_unrecognized() {
        let event = SocketAdapter::parse_frame(r#"{"type":"mystery"}"#);
        assert_eq!(event, TransportEvent::Unrecognized("mystery".to_string()));
    }

    #[test]
    fn malformed_json_is_decode_error() {
        let event = SocketAdapter::parse_frame("{not json");
        assert!(matches!(event, TransportEvent::DecodeError(msg) if msg.contains("malformed")));
    }

    #[test]
    fn missing_type_is_decode_error() {
        assert!(matches!(
            SocketAdapter::parse_frame(r#"{"value":1.0}"#),
            TransportEvent::DecodeError(_)
        ));
        assert!(matches!(
            SocketAdapter::parse_frame(r#"[1,2,3]"#),
            TransportEvent::DecodeError(_)
        ));
        assert!(matches!(
            SocketAdapter::parse_frame(r#"{"type":7}"#),
            TransportEvent::DecodeError(_)
        ));
    }

    #[test]
    fn steering_with_wrong_field_type_is_decode_error() {
        let event = SocketAdapter::parse_frame(r#"{"type":"steering_angle","value":"left"}"#);
        assert!(matches!(event, TransportEvent::DecodeError(msg) if msg.contains("steering_angle")));
    }

    #[test]
    fn image_raw_carries_dimensions() {
        let event = SocketAdapter::parse_frame(r#"{"type":"image_raw","data":"/9j/4AAQ","width":640,"height":480}"#);
        assert_eq!(
            event,
            TransportEvent::Image(ImageFrame {
                channel: ImageChannel::Raw,
                payload: ImagePayload::Encoded("/9j/4AAQ".to_string()),
                width: Some(640),
                height: Some(480),
            })
        );
    }

    #[test]
    fn image_processed_without_dimensions() {
        match SocketAdapter::parse_frame(r#"{"type":"image_processed","data":"abc"}"#) {
            TransportEvent::Image(frame) => {
                assert_eq!(frame.channel, ImageChannel::Processed);
                assert_eq!(frame.width, None);
                assert_eq!(frame.height, None);
            }
            other => panic!("expected image, got {other:?}"),
        }
    }

    #[test]
    fn image_accepts_whole_float_dimensions() {
        let event = SocketAdapter::parse_frame(r#"{"type":"image_raw","data":"abc","width":640.0,"height":480.0}"#);
        assert_eq!(
            event,
            TransportEvent::Image(ImageFrame {
                channel: ImageChannel::Raw,
                payload: ImagePayload::Encoded("abc".to_string()),
                width: Some(640),
                height: Some(480),
            })
        );
    }

    #[test]
    fn unusable_dimensions_are_omitted_not_fatal() {
        for (w, h) in [("640.5", "-1"), (r#""x""#, "null"), ("1e12", "true")] {
            let text = format!(r#"{{"type":"image_processed","data":"abc","width":{w},"height":{h}}}"#);
            match SocketAdapter::parse_frame(&text) {
                TransportEvent::Image(frame) => {
                    assert_eq!(frame.payload, ImagePayload::Encoded("abc".to_string()));
                    assert_eq!((frame.width, frame.height), (None, None), "{text}");
                }
                other => panic!("expected image for {text}, got {other:?}"),
            }
        }
    }

    #[test]
    fn image_without_data_is_decode_error() {
        assert!(matches!(
            SocketAdapter::parse_frame(r#"{"type":"image_raw","width":640}"#),
            TransportEvent::DecodeError(_)
        ));
    }

    #[test]
    fn obstacle_message_supplies_whole_object() {
        let event = SocketAdapter::parse_frame(r#"{"type":"obstacle","detected":true,"distance":42,"position":"left"}"#);
        assert_eq!(
            event,
            TransportEvent::Telemetry(TelemetryPatch::obstacle(ObstaclePatch::whole(
                true,
                42.0,
                ObstaclePosition::Left
            )))
        );
    }

    #[test]
    fn obstacle_message_requires_all_fields() {
        let event = SocketAdapter::parse_frame(r#"{"type":"obstacle","detected":true}"#);
        assert!(matches!(event, TransportEvent::DecodeError(_)));
    }

    #[test]
    fn obstacle_with_bad_position_keeps_the_rest() {
        let events = SocketAdapter::frame_events(r#"{"type":"obstacle","detected":true,"distance":1,"position":"up"}"#);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            TransportEvent::Telemetry(TelemetryPatch::obstacle(ObstaclePatch {
                detected: Some(true),
                distance_cm: Some(1.0),
                position: None,
            }))
        );
        assert!(matches!(&events[1], TransportEvent::DecodeError(msg) if msg.contains("up")));
    }

    #[test]
    fn telemetry_survives_blank_obstacle_position() {
        let event = SocketAdapter::parse_frame(
            r#"{"type":"telemetry","data":{"steering_angle":7.5,"speed":20,"obstaclePosition":""}}"#,
        );
        assert_eq!(
            event,
            TransportEvent::Telemetry(TelemetryPatch {
                steering_angle_deg: Some(7.5),
                speed_cm_per_sec: Some(20.0),
                ..Default::default()
            })
        );
    }

    #[test]
    fn telemetry_with_unknown_position_warns_after_the_patch() {
        let mut handler = SocketHandler;
        let events = handler.on_text(
            r#"{"type":"telemetry","data":{"steering_angle":7.5,"obstacleDetected":true,"obstaclePosition":"behind"}}"#,
        );
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            TransportEvent::Telemetry(TelemetryPatch {
                steering_angle_deg: Some(7.5),
                obstacle: Some(ObstaclePatch {
                    detected: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            })
        );
        assert!(matches!(&events[1], TransportEvent::DecodeError(msg) if msg.contains("behind")));
    }

    #[test]
    fn well_formed_frames_produce_one_event() {
        assert_eq!(SocketAdapter::frame_events(r#"{"type":"steering_angle","value":1.0}"#).len(), 1);
        assert_eq!(SocketAdapter::frame_events("{not json").len(), 1);
    }

    #[test]
    fn telemetry_accepts_firmware_field_names() {
        let event = SocketAdapter::parse_frame(
            r#"{"type":"telemetry","data":{"steering_angle":-4.5,"laneStatus":"Detected","speed":33.3,"jarakTempuh":12.75,"laneWidth":3.1,"deviation":0.2}}"#,
        );
        assert_eq!(
            event,
            TransportEvent::Telemetry(TelemetryPatch {
                steering_angle_deg: Some(-4.5),
                lane_status: Some(LaneStatus::Detected),
                speed_cm_per_sec: Some(33.3),
                distance_traveled_m: Some(12.75),
                lane_width: Some(3.1),
                deviation: Some(0.2),
                obstacle: None,
            })
        );
    }

    #[test]
    fn telemetry_flat_obstacle_keys_are_sub_field_updates() {
        let event = SocketAdapter::parse_frame(r#"{"type":"telemetry","data":{"obstacleDistance":15}}"#);
        assert_eq!(
            event,
            TransportEvent::Telemetry(TelemetryPatch::obstacle(ObstaclePatch {
                distance_cm: Some(15.0),
                ..Default::default()
            }))
        );
    }

    #[test]
    fn telemetry_nested_obstacle_object() {
        let event = SocketAdapter::parse_frame(
            r#"{"type":"telemetry","data":{"obstacle":{"detected":false,"distance":0,"position":"center"}}}"#,
        );
        assert_eq!(
            event,
            TransportEvent::Telemetry(TelemetryPatch::obstacle(ObstaclePatch::whole(
                false,
                0.0,
                ObstaclePosition::Center
            )))
        );
    }

    #[test]
    fn telemetry_ignores_unknown_keys() {
        let event = SocketAdapter::parse_frame(r#"{"type":"telemetry","data":{"battery":90,"speed":1}}"#);
        assert_eq!(event, TransportEvent::Telemetry(TelemetryPatch::speed(1.0)));
    }

    #[test]
    fn telemetry_data_must_be_an_object() {
        let event = SocketAdapter::parse_frame(r#"{"type":"telemetry","data":5}"#);
        assert!(matches!(event, TransportEvent::DecodeError(_)));
    }

    #[test]
    fn open_rejects_invalid_endpoint() {
        let (listener, _rx) = AdapterListener::channel();
        let mut adapter = SocketAdapter::new(listener);
        assert!(matches!(adapter.open("localhost:8080"), Err(IrisError::Connect(_))));
    }

    #[tokio::test]
    async fn streams_frames_from_a_live_socket() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = server.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"type":"steering_angle","value":3.0}"#.into())).await.unwrap();
            ws.send(Message::Text("garbage".into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"mystery"}"#.into())).await.unwrap();
            ws.close(None).await.unwrap();
            // Drain until the client acknowledges the close.
            while ws.next().await.is_some() {}
        });

        let (listener, mut rx) = AdapterListener::channel();
        let mut adapter = SocketAdapter::new(listener);
        adapter.open(&format!("ws://{addr}")).unwrap();

        let mut events = Vec::new();
        while let Some(env) = rx.recv().await {
            let done = matches!(env.event, TransportEvent::Closed | TransportEvent::Error(_));
            events.push(env.event);
            if done {
                break;
            }
        }

        assert_eq!(events[0], TransportEvent::Opened);
        assert_eq!(events[1], TransportEvent::Telemetry(TelemetryPatch::steering(3.0)));
        assert!(matches!(events[2], TransportEvent::DecodeError(_)));
        assert_eq!(events[3], TransportEvent::Unrecognized("mystery".to_string()));
        assert_eq!(events[4], TransportEvent::Closed);
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn refused_connection_reports_error() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let (listener, mut rx) = AdapterListener::channel();
        let mut adapter = SocketAdapter::new(listener);
        adapter.open(&format!("ws://127.0.0.1:{port}")).unwrap();

        let env = rx.recv().await.unwrap();
        assert!(matches!(env.event, TransportEvent::Error(_)));
    }

    #[tokio::test]
    async fn closed_adapter_is_inert() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            let (stream, _) = server.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = release_rx.await;
            let _ = ws.send(Message::Text(r#"{"type":"steering_angle","value":9.0}"#.into())).await;
            while ws.next().await.is_some() {}
        });

        let (listener, mut rx) = AdapterListener::channel();
        let mut adapter = SocketAdapter::new(listener);
        adapter.open(&format!("ws://{addr}")).unwrap();
        assert_eq!(rx.recv().await.unwrap().event, TransportEvent::Opened);

        adapter.close();
        adapter.close();
        let _ = release_tx.send(());

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn adapter_cannot_be_reopened() {
        let (listener, _rx) = AdapterListener::channel();
        let mut adapter = SocketAdapter::new(listener);
        adapter.close();
        assert!(adapter.open("ws://127.0.0.1:1").is_err());
    }
}
