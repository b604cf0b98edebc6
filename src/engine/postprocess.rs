//! Post-processing of generated images
//!
//! Downloads the transform result, strips the provider watermark margin,
//! fits it to the original room image's exact pixel dimensions without
//! stretching, and persists it as a collision-free JPEG artifact under the
//! public root. Also owns EXIF orientation correction for the room image,
//! which runs before the transform is invoked.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::providers::RetryPolicy;

/// Pixels removed from the bottom and right edges to drop the provider's
/// watermark, when the image is large enough to spare them.
pub const WATERMARK_MARGIN_PX: u32 = 80;

/// Output encoding quality for generated artifacts
pub const JPEG_QUALITY: u8 = 95;

/// Filename prefix the artifact route matches on
pub const ARTIFACT_PREFIX: &str = "visualized_";

/// Post-processing errors
#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("Failed to download generated image: {0}")]
    Download(String),

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load an image from disk and apply its EXIF orientation.
///
/// A missing or unreadable orientation tag degrades to "no rotation"; a
/// file that does not decode as an image at all is an error.
pub fn load_oriented(path: &Path) -> Result<DynamicImage, PostProcessError> {
    let bytes = std::fs::read(path)?;
    let image = image::load_from_memory(&bytes)?;
    let orientation = read_exif_orientation(&bytes);
    if orientation != 1 {
        debug!(orientation, path = %path.display(), "Applying EXIF orientation");
    }
    Ok(apply_orientation(image, orientation))
}

/// Read the EXIF orientation tag (1 when absent or unreadable)
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation value (1-8) to an image
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Crop the watermark margin from the bottom and right edges. Images that
/// cannot spare the margin in both dimensions pass through untouched.
pub fn crop_watermark(img: DynamicImage, margin: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width > margin && height > margin {
        img.crop_imm(0, 0, width - margin, height - margin)
    } else {
        img
    }
}

/// Fit the image to exactly `width`×`height`: scale preserving aspect ratio,
/// then center-crop the overflow. Never a bare stretch.
pub fn fit_to_dimensions(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    img.resize_to_fill(width, height, FilterType::Lanczos3)
}

/// Encode as JPEG without carrying any source EXIF (the pixels are already
/// correctly oriented; embedded orientation would rotate them twice).
pub fn save_jpeg(img: &DynamicImage, path: &Path, quality: u8) -> Result<(), PostProcessError> {
    let rgb = img.to_rgb8();
    let mut file = std::fs::File::create(path)?;
    let mut encoder = JpegEncoder::new_with_quality(&mut file, quality);
    encoder.encode_image(&rgb)?;
    Ok(())
}

/// Collision-free artifact name: prefix + millisecond timestamp + random
/// suffix. The randomness covers concurrent requests landing on the same
/// millisecond; the timestamp defeats client caching.
pub fn artifact_filename(extension: &str) -> String {
    format!(
        "{ARTIFACT_PREFIX}{}_{:08x}.{extension}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

/// Download the generated image with bounded retries
pub async fn download_with_retry(
    client: &reqwest::Client,
    policy: &RetryPolicy,
    url: &str,
) -> Result<Bytes, PostProcessError> {
    policy
        .run("download generated image", |_attempt| async move {
            let response = client.get(url).send().await?;
            let response = response.error_for_status()?;
            response.bytes().await
        })
        .await
        .map_err(|e: reqwest::Error| PostProcessError::Download(e.to_string()))
}

/// Process the downloaded bytes and persist the artifact under `public_dir`.
///
/// Decode or resize trouble degrades to writing the un-resized download
/// as-is (with a warning); only IO failure on the final write is fatal.
/// Returns the public-relative URL of the artifact.
pub fn finalize_artifact(
    bytes: &[u8],
    target: (u32, u32),
    public_dir: &Path,
) -> Result<String, PostProcessError> {
    std::fs::create_dir_all(public_dir)?;

    match process_image(bytes, target) {
        Ok(img) => {
            let filename = artifact_filename("jpg");
            save_jpeg(&img, &public_dir.join(&filename), JPEG_QUALITY)?;
            info!(
                filename = %filename,
                width = target.0,
                height = target.1,
                "Artifact resized to match original dimensions"
            );
            Ok(format!("/{filename}"))
        }
        Err(e) => {
            warn!(error = %e, "Could not post-process generated image, serving it un-resized");
            let extension = image::guess_format(bytes)
                .ok()
                .and_then(|f| f.extensions_str().first().copied())
                .unwrap_or("jpg");
            let filename = artifact_filename(extension);
            std::fs::write(public_dir.join(&filename), bytes)?;
            Ok(format!("/{filename}"))
        }
    }
}

fn process_image(bytes: &[u8], target: (u32, u32)) -> Result<DynamicImage, PostProcessError> {
    let img = image::load_from_memory(bytes)?;
    debug!(
        width = img.width(),
        height = img.height(),
        "Decoded generated image"
    );
    let img = crop_watermark(img, WATERMARK_MARGIN_PX);
    Ok(fit_to_dimensions(&img, target.0, target.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn solid_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([120, 80, 40])))
    }

    #[test]
    fn test_crop_watermark_large_image() {
        let cropped = crop_watermark(solid_image(500, 400), 80);
        assert_eq!(cropped.dimensions(), (420, 320));
    }

    #[test]
    fn test_crop_watermark_skips_small_image() {
        let cropped = crop_watermark(solid_image(80, 400), 80);
        assert_eq!(cropped.dimensions(), (80, 400));
    }

    #[test]
    fn test_fit_matches_target_exactly() {
        // Wide source into a square target: aspect-fit then center-crop,
        // never a stretch.
        let fitted = fit_to_dimensions(&solid_image(200, 100), 60, 60);
        assert_eq!(fitted.dimensions(), (60, 60));
    }

    #[test]
    fn test_orientation_six_rotates_dimensions() {
        let rotated = apply_orientation(solid_image(300, 200), 6);
        assert_eq!(rotated.dimensions(), (200, 300));
    }

    #[test]
    fn test_orientation_absent_is_identity() {
        assert_eq!(read_exif_orientation(b"not an image at all"), 1);
        let img = apply_orientation(solid_image(300, 200), 1);
        assert_eq!(img.dimensions(), (300, 200));
    }

    #[test]
    fn test_artifact_names_are_distinct() {
        let names: std::collections::HashSet<String> =
            (0..100).map(|_| artifact_filename("jpg")).collect();
        assert_eq!(names.len(), 100);
        assert!(names.iter().all(|n| n.starts_with(ARTIFACT_PREFIX)));
        assert!(names.iter().all(|n| n.ends_with(".jpg")));
    }

    #[test]
    fn test_finalize_resizes_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = Vec::new();
        solid_image(640, 480)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();

        let url = finalize_artifact(&bytes, (320, 240), dir.path()).unwrap();
        assert!(url.starts_with("/visualized_"));

        let written = image::open(dir.path().join(url.trim_start_matches('/'))).unwrap();
        assert_eq!(written.dimensions(), (320, 240));
    }

    #[test]
    fn test_finalize_degrades_to_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let url = finalize_artifact(b"definitely not an image", (320, 240), dir.path()).unwrap();
        let written = std::fs::read(dir.path().join(url.trim_start_matches('/'))).unwrap();
        assert_eq!(written, b"definitely not an image");
    }

    #[test]
    fn test_save_jpeg_round_trips_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        save_jpeg(&solid_image(120, 90), &path, JPEG_QUALITY).unwrap();
        assert_eq!(image::open(&path).unwrap().dimensions(), (120, 90));
    }
}
