/// Image decoding
///
/// The extraction pipeline only needs two things from a file: its metadata
/// tags and a displayable image to shrink into a thumbnail. `ImageDecoder`
/// is that seam; `StandardDecoder` covers FITS, XISF and every format the
/// `image` crate reads.

use image::{DynamicImage, GrayImage};
use std::path::Path;

use super::{fits, xisf};
use crate::error::DecodeError;
use crate::scan::crawler::normalize_extension;
use crate::state::data::Tags;

/// A decoded file: metadata plus pixels
#[derive(Debug, Clone)]
pub struct Decoded {
    pub tags: Tags,
    pub image: DynamicImage,
}

pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<Decoded, DecodeError>;
}

/// Dispatches on the file extension
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDecoder;

impl ImageDecoder for StandardDecoder {
    fn decode(&self, path: &Path) -> Result<Decoded, DecodeError> {
        let ext = path
            .extension()
            .map(|ext| normalize_extension(&ext.to_string_lossy()))
            .unwrap_or_default();

        match ext.as_str() {
            "fits" | "fit" | "fts" => fits::decode(path),
            "xisf" => xisf::decode(path),
            _ => decode_with_image_crate(path),
        }
    }
}

fn decode_with_image_crate(path: &Path) -> Result<Decoded, DecodeError> {
    let image_error = |source| DecodeError::Image {
        path: path.to_path_buf(),
        source,
    };

    let image = image::ImageReader::open(path)
        .map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .with_guessed_format()
        .map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .decode()
        .map_err(image_error)?;

    let mut tags = Tags::new();
    tags.insert("width".into(), image.width().to_string());
    tags.insert("height".into(), image.height().to_string());
    tags.insert("color".into(), format!("{:?}", image.color()));

    Ok(Decoded { tags, image })
}

/// Numeric sample encodings found in astronomical formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SampleFormat {
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    F32,
    F64,
}

impl SampleFormat {
    pub(crate) fn byte_size(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::I16 | SampleFormat::U16 => 2,
            SampleFormat::I32 | SampleFormat::U32 | SampleFormat::F32 => 4,
            SampleFormat::I64 | SampleFormat::F64 => 8,
        }
    }

    fn read(self, chunk: &[u8], big_endian: bool) -> f64 {
        macro_rules! num {
            ($t:ty, $n:expr) => {{
                let mut raw = [0u8; $n];
                raw.copy_from_slice(&chunk[..$n]);
                if big_endian {
                    <$t>::from_be_bytes(raw) as f64
                } else {
                    <$t>::from_le_bytes(raw) as f64
                }
            }};
        }

        match self {
            SampleFormat::U8 => chunk[0] as f64,
            SampleFormat::I16 => num!(i16, 2),
            SampleFormat::U16 => num!(u16, 2),
            SampleFormat::I32 => num!(i32, 4),
            SampleFormat::U32 => num!(u32, 4),
            SampleFormat::I64 => num!(i64, 8),
            SampleFormat::F32 => num!(f32, 4),
            SampleFormat::F64 => num!(f64, 8),
        }
    }
}

/// Decode `count` samples from the start of `bytes`.
pub(crate) fn read_samples(
    bytes: &[u8],
    format: SampleFormat,
    count: usize,
    big_endian: bool,
) -> Option<Vec<f64>> {
    let size = format.byte_size();
    let needed = count.checked_mul(size)?;
    let bytes = bytes.get(..needed)?;
    Some(
        bytes
            .chunks_exact(size)
            .map(|chunk| format.read(chunk, big_endian))
            .collect(),
    )
}

/// Linear min..max stretch of one image plane into 8-bit grayscale.
/// Non-finite samples render black; a flat plane renders black.
pub(crate) fn stretch_to_gray(samples: &[f64], width: u32, height: u32) -> Option<GrayImage> {
    let (min, max) = samples
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    let range = max - min;
    let pixels: Vec<u8> = samples
        .iter()
        .map(|&v| {
            if !v.is_finite() || !(range > 0.0) {
                0
            } else {
                (((v - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8
            }
        })
        .collect();

    GrayImage::from_raw(width, height, pixels)
}
