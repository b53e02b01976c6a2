/// Image fetch and decode
///
/// Resolves the optimized variant of an image for the current display
/// and network conditions, fetches it with a quality-dependent timeout,
/// and decodes it off the async thread. Decoding runs under
/// `spawn_blocking` because it is CPU-bound.

use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use log::debug;

use crate::error::EngineError;
use crate::net::catalog::CatalogClient;
use crate::state::data::{ConnectionQuality, WallpaperImage};

/// Encoded quality used when the network or measured performance is
/// constrained
const DEGRADED_QUALITY: u8 = 72;
/// Encoded quality on healthy connections
const FULL_QUALITY: u8 = 85;
/// Device-pixel-ratio cap; beyond 2× the bytes outweigh the sharpness
const MAX_DPR: f32 = 2.0;

/// A fully-resolved image request; its canonical key identifies the
/// cache slot for this exact variant
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub image_id: u64,
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub format: &'static str,
}

impl ImageRequest {
    /// Canonicalized request URL: path + dimensions + quality + format
    pub fn canonical_key(&self) -> String {
        format!(
            "{}?w={}&h={}&fit=cover&quality={}&format={}",
            self.path, self.width, self.height, self.quality, self.format
        )
    }

    /// Whether this variant was degraded below full quality
    pub fn is_optimized(&self) -> bool {
        self.quality < FULL_QUALITY
    }
}

/// A decoded image owned by the cache manager
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: RgbaImage,
}

impl DecodedImage {
    /// Decoded footprint estimate: RGBA, 4 bytes per pixel
    pub fn estimated_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * 4
    }
}

/// Resolve the optimized variant of `image` for the given display and
/// network conditions
pub fn optimized_request(
    image: &WallpaperImage,
    viewport: (u32, u32),
    device_pixel_ratio: f32,
    quality: ConnectionQuality,
    adaptive_quality: bool,
    load_degraded: bool,
) -> ImageRequest {
    let dpr = device_pixel_ratio.clamp(1.0, MAX_DPR);
    let width = (viewport.0 as f32 * dpr).round() as u32;
    let height = (viewport.1 as f32 * dpr).round() as u32;

    let constrained = quality == ConnectionQuality::Slow || load_degraded;
    let quality = if adaptive_quality && constrained {
        DEGRADED_QUALITY
    } else {
        FULL_QUALITY
    };

    ImageRequest {
        image_id: image.id,
        path: image.path.clone(),
        width,
        height,
        quality,
        format: "webp",
    }
}

/// Fetch and decode one image within the given time budget. A timeout
/// is reported as `EngineError::Timeout` and handled by callers exactly
/// like a network failure.
pub async fn fetch_and_decode(
    client: Arc<dyn CatalogClient>,
    request: ImageRequest,
    budget: Duration,
) -> Result<DecodedImage, EngineError> {
    let key = request.canonical_key();
    let fetch = async {
        let bytes = client.fetch_image(&request).await?;
        debug!("fetched {} bytes for {key}", bytes.len());
        decode(bytes).await
    };

    match tokio::time::timeout(budget, fetch).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout(budget)),
    }
}

async fn decode(bytes: Vec<u8>) -> Result<DecodedImage, EngineError> {
    tokio::task::spawn_blocking(move || {
        let decoded = image::load_from_memory(&bytes)?;
        let pixels = decoded.to_rgba8();
        Ok(DecodedImage {
            width: pixels.width(),
            height: pixels.height(),
            pixels,
        })
    })
    .await
    .map_err(|e| EngineError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn sample_image() -> WallpaperImage {
        WallpaperImage {
            id: 7,
            filename: "ridge.jpg".into(),
            path: "themes/alpine/ridge.jpg".into(),
            width: 5120,
            height: 2880,
            aspect_ratio: 16.0 / 9.0,
            size_bytes: 3_000_000,
            modified_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            dominant_color: None,
            is_loaded: false,
            is_preloaded: false,
            load_priority: 0,
            error_count: 0,
        }
    }

    #[test]
    fn test_canonical_key_includes_all_variant_fields() {
        let request = ImageRequest {
            image_id: 7,
            path: "themes/alpine/ridge.jpg".into(),
            width: 1920,
            height: 1080,
            quality: 85,
            format: "webp",
        };
        assert_eq!(
            request.canonical_key(),
            "themes/alpine/ridge.jpg?w=1920&h=1080&fit=cover&quality=85&format=webp"
        );
    }

    #[test]
    fn test_device_pixel_ratio_is_capped_at_two() {
        let request = optimized_request(
            &sample_image(),
            (1920, 1080),
            3.0,
            ConnectionQuality::Fast,
            true,
            false,
        );
        assert_eq!((request.width, request.height), (3840, 2160));
    }

    #[test]
    fn test_quality_degrades_on_slow_connections() {
        let slow = optimized_request(
            &sample_image(),
            (1920, 1080),
            1.0,
            ConnectionQuality::Slow,
            true,
            false,
        );
        assert_eq!(slow.quality, DEGRADED_QUALITY);
        assert!(slow.is_optimized());

        let fast = optimized_request(
            &sample_image(),
            (1920, 1080),
            1.0,
            ConnectionQuality::Fast,
            true,
            false,
        );
        assert_eq!(fast.quality, FULL_QUALITY);
    }

    #[test]
    fn test_quality_degrades_when_loads_are_slow() {
        let request = optimized_request(
            &sample_image(),
            (1920, 1080),
            1.0,
            ConnectionQuality::Fast,
            true,
            true,
        );
        assert_eq!(request.quality, DEGRADED_QUALITY);
    }

    #[test]
    fn test_adaptive_quality_off_keeps_full_quality() {
        let request = optimized_request(
            &sample_image(),
            (1920, 1080),
            1.0,
            ConnectionQuality::Slow,
            false,
            true,
        );
        assert_eq!(request.quality, FULL_QUALITY);
    }

    #[tokio::test]
    async fn test_decode_rejects_garbage_bytes() {
        let result = decode(vec![0u8; 64]).await;
        assert!(matches!(result, Err(EngineError::Decode(_))));
    }

    #[tokio::test]
    async fn test_decode_reads_real_png_bytes() {
        let mut bytes = Vec::new();
        let img = RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();

        let decoded = decode(bytes).await.unwrap();
        assert_eq!((decoded.width, decoded.height), (4, 2));
        assert_eq!(decoded.estimated_size(), 4 * 2 * 4);
    }
}
