//! `iris-media` – image handling for the ground station.
//!
//! # Modules
//!
//! - [`image_decoder`] – [`ImageDecoder`][image_decoder::ImageDecoder]:
//!   turns a base64 / data-URI / raw-bytes payload into a renderable
//!   [`ImageBitmap`][image_decoder::ImageBitmap].
//! - [`frame_rate`] – [`FrameRateTracker`][frame_rate::FrameRateTracker]:
//!   counts frames per rolling one-second window.

pub mod frame_rate;
pub mod image_decoder;

pub use frame_rate::FrameRateTracker;
pub use image_decoder::{DEFAULT_MEDIA_TYPE, ImageBitmap, ImageDecoder};
