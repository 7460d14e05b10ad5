//! [`RenderSink`] – where normalized events leave the core.
//!
//! The controller holds no reference to any presentation layer; whatever
//! draws gauges, canvases or terminal lines implements this trait and is
//! handed to [`ConnectionController::new`][crate::ConnectionController::new].

use iris_media::ImageBitmap;
use iris_types::{ConnectionState, ImageChannel, Severity, TelemetrySnapshot};

/// Consumer of everything the ground station produces.
pub trait RenderSink: Send {
    /// The full post-merge snapshot, after every applied update.
    fn on_telemetry(&mut self, snapshot: &TelemetrySnapshot);

    /// The most recently decoded frame for `channel`.
    fn on_image_frame(&mut self, channel: ImageChannel, bitmap: &ImageBitmap);

    /// Frames per second for `channel` over the last report window.
    fn on_frame_rate(&mut self, channel: ImageChannel, fps: u32);

    fn on_connection_state_changed(&mut self, state: ConnectionState);

    fn on_log(&mut self, message: &str, severity: Severity);
}

impl<S: RenderSink + ?Sized> RenderSink for Box<S> {
    fn on_telemetry(&mut self, snapshot: &TelemetrySnapshot) {
        (**self).on_telemetry(snapshot)
    }

    fn on_image_frame(&mut self, channel: ImageChannel, bitmap: &ImageBitmap) {
        (**self).on_image_frame(channel, bitmap)
    }

    fn on_frame_rate(&mut self, channel: ImageChannel, fps: u32) {
        (**self).on_frame_rate(channel, fps)
    }

    fn on_connection_state_changed(&mut self, state: ConnectionState) {
        (**self).on_connection_state_changed(state)
    }

    fn on_log(&mut self, message: &str, severity: Severity) {
        (**self).on_log(message, severity)
    }
}
