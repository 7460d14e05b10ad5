//! Terminal render sink – the dashboard, one line at a time.
//!
//! Formatting lives in plain functions returning uncoloured text; colour is
//! applied only when printing.

use std::collections::VecDeque;

use colored::Colorize;
use iris_media::ImageBitmap;
use iris_runtime::RenderSink;
use iris_types::{ConnectionState, ImageChannel, LaneStatus, Severity, TelemetrySnapshot};

/// Log lines kept for `/status`.
const LOG_HISTORY: usize = 200;

/// Cells in the steering gauge, centre included.
const GAUGE_CELLS: usize = 21;

#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub timestamp: String,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelView {
    fps: u32,
    resolution: Option<(u32, u32)>,
}

pub struct TerminalSink {
    snapshot: TelemetrySnapshot,
    state: ConnectionState,
    raw: ChannelView,
    processed: ChannelView,
    history: VecDeque<LogLine>,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self {
            snapshot: TelemetrySnapshot::default(),
            state: ConnectionState::Disconnected,
            raw: ChannelView::default(),
            processed: ChannelView::default(),
            history: VecDeque::with_capacity(LOG_HISTORY),
        }
    }

    /// Most recent `n` log lines, oldest first.
    pub fn recent_logs(&self, n: usize) -> impl Iterator<Item = &LogLine> {
        self.history.iter().skip(self.history.len().saturating_sub(n))
    }

    /// Clear the screen and the log panel.
    pub fn clear(&mut self) {
        self.history.clear();
        print!("\x1B[2J\x1B[H");
        self.on_log("Logs cleared", Severity::Info);
    }

    /// Dashboard summary of the last rendered snapshot and both channels.
    pub fn dashboard_line(&self) -> String {
        format!(
            "{} | {} {}",
            telemetry_line(&self.snapshot),
            channel_summary(ImageChannel::Raw, self.raw.fps, self.raw.resolution),
            channel_summary(ImageChannel::Processed, self.processed.fps, self.processed.resolution),
        )
    }

    fn channel_mut(&mut self, channel: ImageChannel) -> &mut ChannelView {
        match channel {
            ImageChannel::Raw => &mut self.raw,
            ImageChannel::Processed => &mut self.processed,
        }
    }

    fn push_log(&mut self, line: LogLine) {
        if self.history.len() == LOG_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(line);
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSink for TerminalSink {
    fn on_telemetry(&mut self, snapshot: &TelemetrySnapshot) {
        self.snapshot = snapshot.clone();
    }

    fn on_image_frame(&mut self, channel: ImageChannel, bitmap: &ImageBitmap) {
        self.channel_mut(channel).resolution = Some((bitmap.width, bitmap.height));
    }

    fn on_frame_rate(&mut self, channel: ImageChannel, fps: u32) {
        self.channel_mut(channel).fps = fps;
        // Processed is reported last; print once both rates are fresh.
        if channel == ImageChannel::Processed && self.state == ConnectionState::Connected {
            println!("{}", self.dashboard_line().dimmed());
        }
    }

    fn on_connection_state_changed(&mut self, state: ConnectionState) {
        self.state = state;
        let label = state.to_string();
        let label = match state {
            ConnectionState::Connected => label.green().bold(),
            ConnectionState::Connecting => label.yellow().bold(),
            ConnectionState::Disconnected => label.red().bold(),
        };
        println!("  ● {}", label);
        if state == ConnectionState::Disconnected {
            self.raw = ChannelView::default();
            self.processed = ChannelView::default();
        }
    }

    fn on_log(&mut self, message: &str, severity: Severity) {
        let line = LogLine {
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            message: message.to_string(),
            severity,
        };
        let text = line.message.as_str();
        let body = match severity {
            Severity::Info => text.normal(),
            Severity::Success => text.green(),
            Severity::Warning => text.yellow(),
            Severity::Error => text.red(),
        };
        println!("{} {}", format!("[{}]", line.timestamp).dimmed(), body);
        self.push_log(line);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Formatting
// ─────────────────────────────────────────────────────────────────────────────

pub fn format_steering(angle_deg: f64) -> String {
    format!("{:.1}°", angle_deg)
}

/// Needle position on a [-90, 90] gauge; out-of-range angles pin to the edge.
pub fn steering_gauge(angle_deg: f64) -> String {
    let clamped = if angle_deg.is_nan() { 0.0 } else { angle_deg.clamp(-90.0, 90.0) };
    let last = (GAUGE_CELLS - 1) as f64;
    let needle = ((clamped + 90.0) / 180.0 * last).round() as usize;
    let centre = GAUGE_CELLS / 2;
    let cells: String = (0..GAUGE_CELLS)
        .map(|i| match i {
            _ if i == needle => 'o',
            _ if i == centre => '|',
            _ => '-',
        })
        .collect();
    format!("[{cells}]")
}

pub fn format_speed(cm_per_sec: f64) -> String {
    format!("{:.1} cm/s", cm_per_sec)
}

pub fn format_distance(meters: f64) -> String {
    format!("{:.2} m", meters)
}

pub fn format_obstacle_distance(distance_cm: f64) -> String {
    if distance_cm > 0.0 {
        format!("{:.0} cm", distance_cm)
    } else {
        "- cm".to_string()
    }
}

pub fn obstacle_badge(detected: bool) -> &'static str {
    if detected { "Detected" } else { "None" }
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

pub fn telemetry_line(s: &TelemetrySnapshot) -> String {
    let lane = match s.lane_status {
        LaneStatus::Detected => "Detected",
        LaneStatus::Lost => "Lost",
        LaneStatus::Unknown => "-",
    };
    format!(
        "steer {} {} | lane {} (w {}, dev {}) | speed {} | dist {} | obstacle {} {} {}",
        format_steering(s.steering_angle_deg),
        steering_gauge(s.steering_angle_deg),
        lane,
        format_optional(s.lane_width),
        format_optional(s.deviation),
        format_speed(s.speed_cm_per_sec),
        format_distance(s.distance_traveled_m),
        obstacle_badge(s.obstacle.detected),
        format_obstacle_distance(s.obstacle.distance_cm),
        s.obstacle.position,
    )
}

pub fn channel_summary(channel: ImageChannel, fps: u32, resolution: Option<(u32, u32)>) -> String {
    match resolution {
        Some((w, h)) => format!("{channel} {fps} fps {w}x{h}"),
        None => format!("{channel} {fps} fps -"),
    }
}
