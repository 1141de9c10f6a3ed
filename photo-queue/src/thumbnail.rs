use image::imageops::FilterType;
use image::ImageFormat;
use std::io::Cursor;

/// Error type for thumbnail operations
#[derive(Debug)]
pub enum ThumbnailError {
    ImageLoadError(String),
    ImageSaveError(String),
    TaskError(String),
}

impl std::fmt::Display for ThumbnailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThumbnailError::ImageLoadError(msg) => write!(f, "Image load error: {}", msg),
            ThumbnailError::ImageSaveError(msg) => write!(f, "Image save error: {}", msg),
            ThumbnailError::TaskError(msg) => write!(f, "Task error: {}", msg),
        }
    }
}

impl std::error::Error for ThumbnailError {}

/// Thumbnail plus sharpness score for one captured image.
#[derive(Debug, Clone)]
pub struct PreparedCapture {
    /// WebP-encoded thumbnail bytes.
    pub thumb: Vec<u8>,
    /// Laplacian-variance sharpness of the original image.
    pub sharpness: f64,
}

/// Creates a WebP thumbnail from captured image bytes.
pub fn create_upload_thumbnail(bytes: &[u8], max_edge: u32) -> Result<Vec<u8>, ThumbnailError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ThumbnailError::ImageLoadError(format!("Failed to load image: {}", e)))?;

    // The WebP encoder only takes RGB8/RGBA8.
    let thumb = image::DynamicImage::ImageRgb8(
        img.resize(max_edge, max_edge, FilterType::Lanczos3).to_rgb8(),
    );

    let mut buffer = Cursor::new(Vec::new());
    thumb
        .write_to(&mut buffer, ImageFormat::WebP)
        .map_err(|e| ThumbnailError::ImageSaveError(format!("Failed to write thumbnail: {}", e)))?;

    Ok(buffer.into_inner())
}

/// Sharpness of an image as the variance of its Laplacian.
///
/// Higher is sharper. The score is comparable between photos of the same
/// scene, which is all the selection policy needs.
pub fn sharpness_score(bytes: &[u8]) -> Result<f64, ThumbnailError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ThumbnailError::ImageLoadError(format!("Failed to load image: {}", e)))?;
    let gray = img.to_luma8();
    let (width, height) = gray.dimensions();

    if width < 3 || height < 3 {
        return Ok(0.0);
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let count = ((width - 2) as f64) * ((height - 2) as f64);

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = gray.get_pixel(x, y)[0] as f64;
            let up = gray.get_pixel(x, y - 1)[0] as f64;
            let down = gray.get_pixel(x, y + 1)[0] as f64;
            let left = gray.get_pixel(x - 1, y)[0] as f64;
            let right = gray.get_pixel(x + 1, y)[0] as f64;

            let lap = up + down + left + right - 4.0 * center;
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    let mean = sum / count;
    Ok(sum_sq / count - mean * mean)
}

/// Thumbnail + sharpness in one pass on the blocking pool.
///
/// Image work is CPU-bound; keep it off the async runtime.
pub async fn prepare_capture(
    bytes: Vec<u8>,
    thumb_max_edge: u32,
) -> Result<PreparedCapture, ThumbnailError> {
    tokio::task::spawn_blocking(move || {
        let thumb = create_upload_thumbnail(&bytes, thumb_max_edge)?;
        let sharpness = sharpness_score(&bytes)?;
        Ok(PreparedCapture { thumb, sharpness })
    })
    .await
    .map_err(|e| ThumbnailError::TaskError(format!("Task join error: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};

    fn encode_jpeg(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
        buf.into_inner()
    }

    fn flat_image() -> Vec<u8> {
        let img = GrayImage::from_pixel(32, 32, Luma([128u8]));
        encode_jpeg(&DynamicImage::ImageLuma8(img))
    }

    fn checkerboard_image() -> Vec<u8> {
        let img = GrayImage::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        encode_jpeg(&DynamicImage::ImageLuma8(img))
    }

    #[test]
    fn flat_image_scores_near_zero() {
        let score = sharpness_score(&flat_image()).unwrap();
        assert!(score < 1.0, "flat image scored {}", score);
    }

    #[test]
    fn high_contrast_scores_higher_than_flat() {
        let flat = sharpness_score(&flat_image()).unwrap();
        let sharp = sharpness_score(&checkerboard_image()).unwrap();
        assert!(sharp > flat);
    }

    #[test]
    fn thumbnail_is_webp_and_bounded() {
        let thumb = create_upload_thumbnail(&checkerboard_image(), 16).unwrap();
        // WebP files start with RIFF....WEBP
        assert_eq!(&thumb[0..4], b"RIFF");
        assert_eq!(&thumb[8..12], b"WEBP");

        let decoded = image::load_from_memory(&thumb).unwrap();
        assert!(decoded.width() <= 16 && decoded.height() <= 16);
    }

    #[test]
    fn invalid_bytes_fail_to_load() {
        assert!(matches!(
            sharpness_score(b"not an image"),
            Err(ThumbnailError::ImageLoadError(_))
        ));
    }

    #[tokio::test]
    async fn prepare_capture_returns_both() {
        let prepared = prepare_capture(checkerboard_image(), 16).await.unwrap();
        assert!(!prepared.thumb.is_empty());
        assert!(prepared.sharpness > 0.0);
    }
}
