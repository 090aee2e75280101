//! Image decoding

use crate::config::DecodingHint;
use crate::queue::LoadError;
use image::{DynamicImage, GenericImageView};
use vechnost_network::Bytes;

/// A decoded, ready-to-paint image
#[derive(Debug)]
pub struct DecodedImage {
    /// Source URL
    pub url: String,
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
    /// Decoded pixels
    pub image: DynamicImage,
}

/// Decode `bytes` according to `hint`
pub async fn decode(url: &str, bytes: Bytes, hint: DecodingHint) -> Result<DecodedImage, LoadError> {
    let image = match hint {
        DecodingHint::Sync => decode_bytes(&bytes)?,
        DecodingHint::Async => tokio::task::spawn_blocking(move || decode_bytes(&bytes))
            .await
            .map_err(|e| LoadError::Decode(e.to_string()))??,
    };

    let (width, height) = image.dimensions();
    Ok(DecodedImage {
        url: url.to_string(),
        width,
        height,
        image,
    })
}

fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage, LoadError> {
    image::load_from_memory(bytes).map_err(|e| LoadError::Decode(e.to_string()))
}
