//! Minimal FITS reader: primary header keywords and the first image plane.

use image::DynamicImage;
use std::path::Path;

use super::decoder::{read_samples, stretch_to_gray, Decoded, SampleFormat};
use crate::error::DecodeError;
use crate::state::data::Tags;

const BLOCK: usize = 2880;
const CARD: usize = 80;

/// Keywords that carry commentary rather than values
const COMMENTARY: [&str; 4] = ["COMMENT", "HISTORY", "CONTINUE", ""];

pub fn decode(path: &Path) -> Result<Decoded, DecodeError> {
    let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_bytes(path, &bytes)
}

pub(crate) fn decode_bytes(path: &Path, bytes: &[u8]) -> Result<Decoded, DecodeError> {
    let (tags, header_len) = parse_header(path, bytes)?;

    if tags.get("SIMPLE").map(String::as_str) != Some("T") {
        return Err(DecodeError::malformed(path, "missing SIMPLE = T"));
    }

    let bitpix = int_keyword(path, &tags, "BITPIX")?;
    let naxis = int_keyword(path, &tags, "NAXIS")?;
    if naxis < 2 {
        return Err(DecodeError::unsupported(
            path,
            format!("NAXIS = {naxis}, no image in primary HDU"),
        ));
    }
    let width = dimension(path, &tags, "NAXIS1")?;
    let height = dimension(path, &tags, "NAXIS2")?;

    let format = match bitpix {
        8 => SampleFormat::U8,
        16 => SampleFormat::I16,
        32 => SampleFormat::I32,
        64 => SampleFormat::I64,
        -32 => SampleFormat::F32,
        -64 => SampleFormat::F64,
        other => {
            return Err(DecodeError::malformed(path, format!("invalid BITPIX {other}")));
        }
    };

    let bzero = float_keyword(&tags, "BZERO").unwrap_or(0.0);
    let bscale = float_keyword(&tags, "BSCALE").unwrap_or(1.0);

    let count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| DecodeError::malformed(path, "image dimensions overflow"))?;
    let data = &bytes[header_len..];
    let mut samples = read_samples(data, format, count, true)
        .ok_or_else(|| DecodeError::malformed(path, "data unit is truncated"))?;
    for sample in &mut samples {
        *sample = bzero + bscale * *sample;
    }

    let gray = stretch_to_gray(&samples, width, height)
        .ok_or_else(|| DecodeError::malformed(path, "plane size mismatch"))?;

    Ok(Decoded {
        tags,
        image: DynamicImage::ImageLuma8(gray),
    })
}

/// Parse header cards up to END. Returns the keyword map and the byte
/// offset of the data unit (header length rounded up to whole blocks).
fn parse_header(path: &Path, bytes: &[u8]) -> Result<(Tags, usize), DecodeError> {
    let mut tags = Tags::new();

    for (index, card) in bytes.chunks_exact(CARD).enumerate() {
        let card = std::str::from_utf8(card)
            .ok()
            .filter(|card| card.is_ascii())
            .ok_or_else(|| DecodeError::malformed(path, "header card is not ASCII"))?;
        let keyword = card[..8].trim_end();

        if keyword == "END" {
            let header_len = (index + 1) * CARD;
            let padded = header_len.div_ceil(BLOCK) * BLOCK;
            return Ok((tags, padded.min(bytes.len())));
        }
        if COMMENTARY.contains(&keyword) || &card[8..10] != "= " {
            continue;
        }
        if let Some(value) = parse_value(&card[10..]) {
            tags.insert(keyword.to_string(), value);
        }
    }

    Err(DecodeError::malformed(path, "header has no END card"))
}

/// Value field of a card: a quoted string ('' escapes a quote) or the text
/// before the comment separator.
fn parse_value(field: &str) -> Option<String> {
    let field = field.trim_start();
    if let Some(rest) = field.strip_prefix('\'') {
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    value.push('\'');
                } else {
                    break;
                }
            } else {
                value.push(c);
            }
        }
        return Some(value.trim_end().to_string());
    }

    let value = field.split('/').next().unwrap_or("").trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn int_keyword(path: &Path, tags: &Tags, key: &str) -> Result<i64, DecodeError> {
    tags.get(key)
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| DecodeError::malformed(path, format!("missing or invalid {key}")))
}

fn dimension(path: &Path, tags: &Tags, key: &str) -> Result<u32, DecodeError> {
    let value = int_keyword(path, tags, key)?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| DecodeError::malformed(path, format!("invalid {key} = {value}")))
}

fn float_keyword(tags: &Tags, key: &str) -> Option<f64> {
    // FITS allows Fortran-style exponents (1.0D3)
    tags.get(key)
        .and_then(|v| v.replace(['D', 'd'], "E").parse::<f64>().ok())
}
