use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::io::Cursor;

use crate::state::data::ThumbnailBlob;

/// Default bounding box of generated thumbnails (square)
pub const THUMBNAIL_SIZE: u32 = 200;

/// Largest size that fits within `max_dim` x `max_dim` while preserving the
/// aspect ratio. Images already inside the box are never enlarged.
pub fn fit_within(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if width <= max_dim && height <= max_dim {
        return (width, height);
    }
    let (w, h, m) = (width as u64, height as u64, max_dim as u64);
    if width >= height {
        (max_dim, ((h * m + w / 2) / w).max(1) as u32)
    } else {
        (((w * m + h / 2) / h).max(1) as u32, max_dim)
    }
}

/// Shrink an image into the bounding box and encode it as PNG.
///
/// Lanczos resampling and PNG encoding are deterministic, so identical
/// input pixels always give byte-identical blobs.
pub fn generate_thumbnail(
    img: &DynamicImage,
    max_dim: u32,
) -> Result<ThumbnailBlob, image::ImageError> {
    let (width, height) = fit_within(img.width(), img.height(), max_dim);
    let resized = if (width, height) == (img.width(), img.height()) {
        img.clone()
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
    };

    // 8-bit output keeps blobs small and every PNG viewer happy
    let color = resized.color();
    let normalized = if color.has_alpha() {
        DynamicImage::ImageRgba8(resized.to_rgba8())
    } else if color.has_color() {
        DynamicImage::ImageRgb8(resized.to_rgb8())
    } else {
        DynamicImage::ImageLuma8(resized.to_luma8())
    };

    let mut bytes = Vec::new();
    normalized.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;

    Ok(ThumbnailBlob {
        width,
        height,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    #[test]
    fn test_fit_within_preserves_aspect() {
        assert_eq!(fit_within(4000, 3000, 200), (200, 150));
        assert_eq!(fit_within(3000, 4000, 200), (150, 200));
        assert_eq!(fit_within(1000, 1000, 200), (200, 200));
        assert_eq!(fit_within(10_000, 10, 200), (200, 1));
        assert_eq!(fit_within(120, 80, 200), (120, 80));
    }

    #[test]
    fn test_thumbnail_is_bounded_and_decodable() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(640, 480, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        let thumb = generate_thumbnail(&img, THUMBNAIL_SIZE).unwrap();
        assert_eq!((thumb.width, thumb.height), (200, 150));

        let decoded = image::load_from_memory_with_format(&thumb.bytes, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 150));
    }

    #[test]
    fn test_small_images_are_not_enlarged() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(30, 20, image::Luma([7])));
        let thumb = generate_thumbnail(&img, THUMBNAIL_SIZE).unwrap();
        assert_eq!((thumb.width, thumb.height), (30, 20));
    }

    #[test]
    fn test_thumbnail_bytes_are_deterministic() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(500, 300, |x, y| {
            image::Luma([((x * 7 + y * 13) % 256) as u8])
        }));
        let a = generate_thumbnail(&img, 200).unwrap();
        let b = generate_thumbnail(&img, 200).unwrap();
        assert_eq!(a, b);
    }
}
