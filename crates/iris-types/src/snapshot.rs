//! [`TelemetrySnapshot`] and its partial-update counterpart [`TelemetryPatch`].
//!
//! The snapshot is never replaced wholesale.  Both transports deliver partial
//! updates (a steering angle alone, an obstacle alone, ...) in any order, and
//! [`TelemetrySnapshot::merge`] copies only the fields an update carries.
//!
//! # Example
//!
//! ```
//! use iris_types::{TelemetryPatch, TelemetrySnapshot};
//!
//! let mut snap = TelemetrySnapshot::default();
//! snap.merge(&TelemetryPatch { steering_angle_deg: Some(5.0), ..Default::default() });
//! snap.merge(&TelemetryPatch { speed_cm_per_sec: Some(10.0), ..Default::default() });
//!
//! assert_eq!(snap.steering_angle_deg, 5.0);
//! assert_eq!(snap.speed_cm_per_sec, 10.0);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lane detector verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LaneStatus {
    #[default]
    Unknown,
    Detected,
    Lost,
}

impl LaneStatus {
    /// Map the wire string onto the enum.  Anything unexpected is `Unknown`.
    pub fn from_wire(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "detected" => LaneStatus::Detected,
            "lost" => LaneStatus::Lost,
            _ => LaneStatus::Unknown,
        }
    }
}

impl fmt::Display for LaneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneStatus::Unknown => write!(f, "Unknown"),
            LaneStatus::Detected => write!(f, "Detected"),
            LaneStatus::Lost => write!(f, "Lost"),
        }
    }
}

/// Where the obstacle sits relative to the vehicle's heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObstaclePosition {
    Left,
    #[default]
    Center,
    Right,
}

impl fmt::Display for ObstaclePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObstaclePosition::Left => write!(f, "left"),
            ObstaclePosition::Center => write!(f, "center"),
            ObstaclePosition::Right => write!(f, "right"),
        }
    }
}

impl FromStr for ObstaclePosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(ObstaclePosition::Left),
            "center" | "centre" => Ok(ObstaclePosition::Center),
            "right" => Ok(ObstaclePosition::Right),
            other => Err(format!("invalid obstacle position '{other}'")),
        }
    }
}

/// Obstacle detector output.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Obstacle {
    pub detected: bool,
    pub distance_cm: f64,
    pub position: ObstaclePosition,
}

/// The merged state of every known vehicle metric.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Steering angle in degrees.  Typically within ±90 but never clamped here.
    pub steering_angle_deg: f64,
    pub lane_status: LaneStatus,
    pub speed_cm_per_sec: f64,
    pub distance_traveled_m: f64,
    pub lane_width: Option<f64>,
    pub deviation: Option<f64>,
    pub obstacle: Obstacle,
}

/// Obstacle fields carried by an update; `None` means "not supplied".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ObstaclePatch {
    pub detected: Option<bool>,
    pub distance_cm: Option<f64>,
    pub position: Option<ObstaclePosition>,
}

impl ObstaclePatch {
    /// A patch carrying the whole obstacle object.
    pub fn whole(detected: bool, distance_cm: f64, position: ObstaclePosition) -> Self {
        Self {
            detected: Some(detected),
            distance_cm: Some(distance_cm),
            position: Some(position),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detected.is_none() && self.distance_cm.is_none() && self.position.is_none()
    }
}

/// A partial telemetry update.  Only `Some` fields are applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TelemetryPatch {
    pub steering_angle_deg: Option<f64>,
    pub lane_status: Option<LaneStatus>,
    pub speed_cm_per_sec: Option<f64>,
    pub distance_traveled_m: Option<f64>,
    pub lane_width: Option<f64>,
    pub deviation: Option<f64>,
    pub obstacle: Option<ObstaclePatch>,
}

impl TelemetryPatch {
    pub fn steering(angle_deg: f64) -> Self {
        Self {
            steering_angle_deg: Some(angle_deg),
            ..Default::default()
        }
    }

    pub fn speed(cm_per_sec: f64) -> Self {
        Self {
            speed_cm_per_sec: Some(cm_per_sec),
            ..Default::default()
        }
    }

    pub fn obstacle(obstacle: ObstaclePatch) -> Self {
        Self {
            obstacle: Some(obstacle),
            ..Default::default()
        }
    }

    /// `true` when the patch carries no field at all.
    pub fn is_empty(&self) -> bool {
        self.steering_angle_deg.is_none()
            && self.lane_status.is_none()
            && self.speed_cm_per_sec.is_none()
            && self.distance_traveled_m.is_none()
            && self.lane_width.is_none()
            && self.deviation.is_none()
            && self.obstacle.is_none_or(|o| o.is_empty())
    }
}

impl TelemetrySnapshot {
    /// Apply `patch` field by field.
    ///
    /// Present fields are copied verbatim (no clamping, no unit conversion);
    /// absent fields keep their previous value.  The obstacle is merged as a
    /// nested partial, so a patch carrying only `detected` leaves the stored
    /// distance and position alone.
    ///
    /// Returns `false` when the patch was empty and nothing changed.
    pub fn merge(&mut self, patch: &TelemetryPatch) -> bool {
        if patch.is_empty() {
            return false;
        }

        if let Some(v) = patch.steering_angle_deg {
            self.steering_angle_deg = v;
        }
        if let Some(v) = patch.lane_status {
            self.lane_status = v;
        }
        if let Some(v) = patch.speed_cm_per_sec {
            self.speed_cm_per_sec = v;
        }
        if let Some(v) = patch.distance_traveled_m {
            self.distance_traveled_m = v;
        }
        if let Some(v) = patch.lane_width {
            self.lane_width = Some(v);
        }
        if let Some(v) = patch.deviation {
            self.deviation = Some(v);
        }
        if let Some(obstacle) = &patch.obstacle {
            if let Some(v) = obstacle.detected {
                self.obstacle.detected = v;
            }
            if let Some(v) = obstacle.distance_cm {
                self.obstacle.distance_cm = v;
            }
            if let Some(v) = obstacle.position {
                self.obstacle.position = v;
            }
        }
        true
    }
}
