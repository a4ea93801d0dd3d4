//! Image artifact transport encoding: `DynamicImage` -> PNG -> base64.
//!
//! PNG is lossless, so a decoded artifact has exactly the pixels of the crop
//! or visualization it came from.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("image has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("image codec failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Encode to PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, EncodeError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(EncodeError::Empty {
            width: img.width(),
            height: img.height(),
        });
    }
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Encode to base64 PNG text for the result payload.
pub fn encode_artifact(img: &DynamicImage) -> Result<String, EncodeError> {
    let png = encode_png(img)?;
    Ok(STANDARD.encode(png))
}

/// Decode a base64 artifact back into an image.
pub fn decode_artifact(text: &str) -> Result<DynamicImage, EncodeError> {
    let bytes = STANDARD.decode(text.trim())?;
    Ok(image::load_from_memory(&bytes)?)
}
