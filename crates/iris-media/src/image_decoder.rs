//! [`ImageDecoder`] – payload normalisation and bitmap decoding.
//!
//! Senders are inconsistent about framing: some ship a complete
//! `data:image/png;base64,...` URI, most ship bare base64 of a JPEG, and the
//! bridge may hand over a raw byte array.  Everything is first normalised to
//! a data URI (bare payloads get the default JPEG prefix), then the base64
//! body is decoded and handed to the `image` crate.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use iris_types::{ImagePayload, IrisError};

/// Media type assumed for payloads that do not announce one.
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

const DATA_IMAGE_PREFIX: &str = "data:image";

/// A decoded, renderable frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBitmap {
    /// Media type from the data URI, e.g. `"image/jpeg"`.
    pub media_type: String,
    /// The normalised data URI the bitmap was decoded from.
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixels, row-major, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

/// Stateless image payload decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl ImageDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Normalise `payload` to a data URI.
    ///
    /// A payload that already starts with `data:image` is returned unchanged;
    /// bare base64 is wrapped with the default JPEG prefix; raw bytes are
    /// base64-encoded first.
    pub fn to_data_uri(payload: &ImagePayload) -> String {
        match payload {
            ImagePayload::Encoded(text) if text.starts_with(DATA_IMAGE_PREFIX) => text.clone(),
            ImagePayload::Encoded(text) => format!("data:{DEFAULT_MEDIA_TYPE};base64,{text}"),
            ImagePayload::Bytes(bytes) => {
                format!("data:{DEFAULT_MEDIA_TYPE};base64,{}", BASE64.encode(bytes))
            }
        }
    }

    /// Decode `payload` into an [`ImageBitmap`].
    ///
    /// # Errors
    ///
    /// Returns [`IrisError::Decode`] when the data URI is malformed, the
    /// base64 body is invalid, or the bytes are not a decodable image.
    pub fn decode(&self, payload: &ImagePayload) -> Result<ImageBitmap, IrisError> {
        let data_uri = Self::to_data_uri(payload);
        let (media_type, body) = split_data_uri(&data_uri)?;

        let bytes = match payload {
            // Skip the base64 round trip for bytes we already hold.
            ImagePayload::Bytes(raw) => raw.clone(),
            ImagePayload::Encoded(_) => decode_base64(body)?,
        };

        let image = image::load_from_memory(&bytes)
            .map_err(|e| IrisError::Decode(format!("image decode failed: {e}")))?;
        let rgba = image.to_rgba8();

        tracing::trace!(media_type, width = rgba.width(), height = rgba.height(), "image decoded");

        Ok(ImageBitmap {
            media_type: media_type.to_string(),
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
            data_uri,
        })
    }
}

/// Split `data:<media>;base64,<body>` into media type and body.
fn split_data_uri(uri: &str) -> Result<(&str, &str), IrisError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| IrisError::Decode("missing data: scheme".to_string()))?;
    let (header, body) = rest
        .split_once(',')
        .ok_or_else(|| IrisError::Decode("data URI has no ',' separator".to_string()))?;
    let media_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| IrisError::Decode(format!("data URI '{header}' is not base64 encoded")))?;
    if media_type.is_empty() {
        return Err(IrisError::Decode("data URI has no media type".to_string()));
    }
    Ok((media_type, body))
}

fn decode_base64(body: &str) -> Result<Vec<u8>, IrisError> {
    // Line-wrapped base64 is common from Python encoders.
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|e| IrisError::Decode(format!("invalid base64 image payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 10, 10])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn data_uri_passes_through_unmodified() {
        let uri = "data:image/png;base64,iVBORw0KGgo=".to_string();
        let out = ImageDecoder::to_data_uri(&ImagePayload::Encoded(uri.clone()));
        assert_eq!(out, uri);
    }

    #[test]
    fn bare_base64_is_wrapped_with_jpeg_prefix() {
        let out = ImageDecoder::to_data_uri(&ImagePayload::Encoded("/9j/4AAQ".to_string()));
        assert_eq!(out, "data:image/jpeg;base64,/9j/4AAQ");
    }

    #[test]
    fn raw_bytes_are_encoded_and_wrapped() {
        let out = ImageDecoder::to_data_uri(&ImagePayload::Bytes(vec![0xff, 0xd8, 0xff]));
        assert_eq!(out, "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn decodes_bare_base64_jpeg() {
        let jpeg = encoded(8, 6, ImageFormat::Jpeg);
        let bitmap = ImageDecoder::new()
            .decode(&ImagePayload::Encoded(BASE64.encode(&jpeg)))
            .unwrap();
        assert_eq!(bitmap.media_type, "image/jpeg");
        assert_eq!((bitmap.width, bitmap.height), (8, 6));
        assert_eq!(bitmap.rgba.len(), 8 * 6 * 4);
    }

    #[test]
    fn decodes_prefixed_png() {
        let png = encoded(3, 2, ImageFormat::Png);
        let uri = format!("data:image/png;base64,{}", BASE64.encode(&png));
        let bitmap = ImageDecoder::new().decode(&ImagePayload::Encoded(uri.clone())).unwrap();
        assert_eq!(bitmap.media_type, "image/png");
        assert_eq!(bitmap.data_uri, uri);
        assert_eq!((bitmap.width, bitmap.height), (3, 2));
        assert_eq!(&bitmap.rgba[..4], &[200, 10, 10, 255]);
    }

    #[test]
    fn decodes_raw_bytes() {
        let png = encoded(5, 5, ImageFormat::Png);
        let bitmap = ImageDecoder::new().decode(&ImagePayload::Bytes(png)).unwrap();
        assert_eq!((bitmap.width, bitmap.height), (5, 5));
    }

    #[test]
    fn tolerates_line_wrapped_base64() {
        let png = encoded(2, 2, ImageFormat::Png);
        let b64 = BASE64.encode(&png);
        let (a, b) = b64.split_at(b64.len() / 2);
        let wrapped = format!("{a}\n{b}");
        assert!(ImageDecoder::new().decode(&ImagePayload::Encoded(wrapped)).is_ok());
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        let err = ImageDecoder::new()
            .decode(&ImagePayload::Encoded("not base64 at all!".to_string()))
            .unwrap_err();
        assert!(matches!(err, IrisError::Decode(_)));
    }

    #[test]
    fn non_image_bytes_are_a_decode_error() {
        let err = ImageDecoder::new()
            .decode(&ImagePayload::Encoded(BASE64.encode(b"hello world")))
            .unwrap_err();
        assert!(matches!(err, IrisError::Decode(_)));
    }

    #[test]
    fn non_base64_data_uri_is_rejected() {
        let err = ImageDecoder::new()
            .decode(&ImagePayload::Encoded("data:image/svg+xml,<svg/>".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("not base64"));
    }
}
