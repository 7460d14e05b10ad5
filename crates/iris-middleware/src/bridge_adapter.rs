//! Bridge adapter for `rosbridge_server` (rosbridge protocol v2).
//!
//! Unlike the socket protocol there is no single multiplexed record stream.
//! After the connection opens the adapter issues four independent
//! subscriptions, one per role:
//!
//! | Role | Message type | Event |
//! |---|---|---|
//! | raw image | `sensor_msgs/CompressedImage` | raw image frame |
//! | processed image | `sensor_msgs/CompressedImage` | processed image frame |
//! | steering | `std_msgs/Float32` | steering-only patch |
//! | speed | `std_msgs/Float32` | speed-only patch |
//!
//! Inbound `publish` operations are routed by topic name.  Losing the
//! connection produces a single [`TransportEvent::Closed`] covering every
//! subscription.

use std::collections::HashMap;

use iris_types::{
    ImageChannel, ImageFrame, ImagePayload, IrisError, TelemetryPatch, TopicNames, TransportEvent, TransportKind,
};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::adapter::{AdapterListener, TransportAdapter};
use crate::session::{Session, SessionHandler};

/// rosbridge type of the image topics.
pub const IMAGE_MESSAGE_TYPE: &str = "sensor_msgs/CompressedImage";

/// rosbridge type of the steering and speed topics.
pub const SCALAR_MESSAGE_TYPE: &str = "std_msgs/Float32";

/// What a subscribed topic feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeRole {
    RawImage,
    ProcessedImage,
    Steering,
    Speed,
}

impl BridgeRole {
    pub fn message_type(self) -> &'static str {
        match self {
            BridgeRole::RawImage | BridgeRole::ProcessedImage => IMAGE_MESSAGE_TYPE,
            BridgeRole::Steering | BridgeRole::Speed => SCALAR_MESSAGE_TYPE,
        }
    }
}

/// Adapter that subscribes to vehicle topics through a rosbridge WebSocket.
pub struct BridgeAdapter {
    listener: AdapterListener,
    session: Option<Session<TopicNames>>,
}

impl BridgeAdapter {
    pub fn new(listener: AdapterListener) -> Self {
        Self {
            listener,
            session: None,
        }
    }

    /// Build the rosbridge `subscribe` request for `topic`.
    pub fn build_subscribe_frame(id: &str, topic: &str, message_type: &str) -> String {
        json!({
            "op": "subscribe",
            "id": id,
            "topic": topic,
            "type": message_type,
        })
        .to_string()
    }

    /// Build the rosbridge `unsubscribe` request for `topic`.
    pub fn build_unsubscribe_frame(id: &str, topic: &str) -> String {
        json!({
            "op": "unsubscribe",
            "id": id,
            "topic": topic,
        })
        .to_string()
    }
}

impl TransportAdapter for BridgeAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Bridge
    }

    fn open(&mut self, endpoint: &str) -> Result<(), IrisError> {
        if self.session.is_some() || !self.listener.is_alive() {
            return Err(IrisError::Connect("bridge adapter already used".to_string()));
        }
        let session = Session::start(endpoint, self.listener.clone(), BridgeRouter::default())?;
        info!(session = %self.listener.session(), endpoint, "bridge adapter connecting");
        self.session = Some(session);
        Ok(())
    }

    fn subscribe(&mut self, topics: &TopicNames) -> Result<(), IrisError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| IrisError::Connect("bridge adapter is not open".to_string()))?;
        if !session.command(topics.clone()) {
            return Err(IrisError::TransportClosed("bridge session has ended".to_string()));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.listener.silence();
        if let Some(session) = self.session.take() {
            session.close();
            info!(session = %self.listener.session(), "bridge adapter closed");
        }
    }
}

impl Drop for BridgeAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Topic routing
// ---------------------------------------------------------------------------

struct Subscription {
    id: String,
    roles: Vec<BridgeRole>,
}

/// Session-side state: which topic feeds which role.
#[derive(Default)]
struct BridgeRouter {
    routes: HashMap<String, Subscription>,
    next_id: u64,
}

impl BridgeRouter {
    /// Bind every role to its topic, returning the subscribe frames for
    /// topics not yet subscribed.  A topic shared by two roles is subscribed
    /// once and feeds both.
    fn bind(&mut self, topics: &TopicNames) -> Vec<String> {
        let bindings = [
            (topics.raw_image.as_str(), BridgeRole::RawImage),
            (topics.processed_image.as_str(), BridgeRole::ProcessedImage),
            (topics.steering.as_str(), BridgeRole::Steering),
            (topics.speed.as_str(), BridgeRole::Speed),
        ];

        let mut frames = Vec::new();
        for (topic, role) in bindings {
            if let Some(sub) = self.routes.get_mut(topic) {
                if !sub.roles.contains(&role) {
                    warn!(topic, ?role, "topic already bound to another role; sharing it");
                    sub.roles.push(role);
                }
                continue;
            }
            self.next_id += 1;
            let id = format!("subscribe:{topic}:{}", self.next_id);
            frames.push(BridgeAdapter::build_subscribe_frame(&id, topic, role.message_type()));
            debug!(topic, ?role, "subscribing");
            self.routes.insert(
                topic.to_string(),
                Subscription {
                    id,
                    roles: vec![role],
                },
            );
        }
        frames
    }

    fn route(&self, text: &str) -> Vec<TransportEvent> {
        match self.decode(text) {
            Ok(events) => events,
            Err(msg) => vec![TransportEvent::DecodeError(msg)],
        }
    }

    fn decode(&self, text: &str) -> Result<Vec<TransportEvent>, String> {
        let value: Value = serde_json::from_str(text).map_err(|e| format!("malformed bridge message: {e}"))?;
        let op = value
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| "bridge message has no string 'op' field".to_string())?;

        match op {
            "publish" => self.decode_publish(&value),
            "status" => Ok(decode_status(&value)),
            other => Ok(vec![TransportEvent::Unrecognized(format!("bridge op '{other}'"))]),
        }
    }

    fn decode_publish(&self, value: &Value) -> Result<Vec<TransportEvent>, String> {
        let topic = value
            .get("topic")
            .and_then(Value::as_str)
            .ok_or_else(|| "publish without a 'topic'".to_string())?;
        let Some(sub) = self.routes.get(topic) else {
            return Ok(vec![TransportEvent::Unrecognized(format!("topic '{topic}'"))]);
        };
        let data = value
            .get("msg")
            .and_then(|m| m.get("data"))
            .ok_or_else(|| format!("publish on '{topic}' has no msg.data"))?;

        let mut events = Vec::with_capacity(sub.roles.len());
        let mut scalars = TelemetryPatch::default();
        for role in &sub.roles {
            match role {
                BridgeRole::RawImage => events.push(image_event(ImageChannel::Raw, topic, data)?),
                BridgeRole::ProcessedImage => events.push(image_event(ImageChannel::Processed, topic, data)?),
                BridgeRole::Steering => scalars.steering_angle_deg = Some(scalar(topic, data)?),
                BridgeRole::Speed => scalars.speed_cm_per_sec = Some(scalar(topic, data)?),
            }
        }
        if !scalars.is_empty() {
            events.push(TransportEvent::Telemetry(scalars));
        }
        Ok(events)
    }
}

impl SessionHandler for BridgeRouter {
    type Command = TopicNames;

    fn on_text(&mut self, text: &str) -> Vec<TransportEvent> {
        self.route(text)
    }

    fn on_command(&mut self, topics: TopicNames) -> Vec<String> {
        self.bind(&topics)
    }

    fn on_shutdown(&mut self) -> Vec<String> {
        self.routes
            .iter()
            .map(|(topic, sub)| BridgeAdapter::build_unsubscribe_frame(&sub.id, topic))
            .collect()
    }
}

fn decode_status(value: &Value) -> Vec<TransportEvent> {
    let level = value.get("level").and_then(Value::as_str).unwrap_or("info");
    let msg = value.get("msg").and_then(Value::as_str).unwrap_or("");
    match level {
        "error" | "warning" => vec![TransportEvent::DecodeError(format!("bridge {level}: {msg}"))],
        _ => {
            debug!(level, msg, "bridge status");
            Vec::new()
        }
    }
}

fn image_event(channel: ImageChannel, topic: &str, data: &Value) -> Result<TransportEvent, String> {
    let payload = match data {
        Value::String(s) => ImagePayload::Encoded(s.clone()),
        Value::Array(items) => ImagePayload::Bytes(
            items
                .iter()
                .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .ok_or_else(|| format!("image on '{topic}' has a non-byte element"))?,
        ),
        _ => return Err(format!("image on '{topic}' is neither base64 nor a byte array")),
    };
    Ok(TransportEvent::Image(ImageFrame {
        channel,
        payload,
        width: None,
        height: None,
    }))
}

fn scalar(topic: &str, data: &Value) -> Result<f64, String> {
    data.as_f64()
        .ok_or_else(|| format!("value on '{topic}' is not a number"))
}
