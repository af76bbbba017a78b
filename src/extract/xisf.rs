//! Minimal XISF reader.
//!
//! Supports monolithic files with an uncompressed attached image. FITS
//! keywords and scalar properties from the XML header become tags; the
//! first channel becomes a grayscale preview.

use image::DynamicImage;
use std::collections::HashMap;
use std::path::Path;

use super::decoder::{read_samples, stretch_to_gray, Decoded, SampleFormat};
use crate::error::DecodeError;
use crate::state::data::Tags;

const SIGNATURE: &[u8; 8] = b"XISF0100";
const PREAMBLE: usize = 16;

pub fn decode(path: &Path) -> Result<Decoded, DecodeError> {
    let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_bytes(path, &bytes)
}

pub(crate) fn decode_bytes(path: &Path, bytes: &[u8]) -> Result<Decoded, DecodeError> {
    if bytes.len() < PREAMBLE || &bytes[..8] != SIGNATURE {
        return Err(DecodeError::malformed(path, "missing XISF0100 signature"));
    }
    let header_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let header = bytes
        .get(PREAMBLE..PREAMBLE + header_len)
        .ok_or_else(|| DecodeError::malformed(path, "header is truncated"))?;
    let xml = String::from_utf8_lossy(header);

    let image = elements(&xml, "Image")
        .into_iter()
        .next()
        .ok_or_else(|| DecodeError::unsupported(path, "no Image element"))?;

    if image.get("compression").is_some_and(|c| !c.is_empty()) {
        return Err(DecodeError::unsupported(path, "compressed data blocks"));
    }

    let geometry = image
        .get("geometry")
        .ok_or_else(|| DecodeError::malformed(path, "Image has no geometry"))?;
    let (width, height) = parse_geometry(geometry)
        .ok_or_else(|| DecodeError::malformed(path, format!("invalid geometry {geometry}")))?;

    let format = match image.get("sampleFormat").map(String::as_str) {
        Some("UInt8") => SampleFormat::U8,
        Some("UInt16") => SampleFormat::U16,
        Some("UInt32") => SampleFormat::U32,
        Some("Float32") => SampleFormat::F32,
        Some("Float64") => SampleFormat::F64,
        other => {
            return Err(DecodeError::unsupported(
                path,
                format!("sample format {}", other.unwrap_or("(none)")),
            ));
        }
    };
    let big_endian = image.get("byteOrder").map(String::as_str) == Some("big");

    let location = image
        .get("location")
        .ok_or_else(|| DecodeError::malformed(path, "Image has no location"))?;
    let offset = parse_attachment(location).ok_or_else(|| {
        DecodeError::unsupported(path, format!("data location {location}"))
    })?;

    let count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| DecodeError::malformed(path, "image dimensions overflow"))?;
    let samples = bytes
        .get(offset..)
        .and_then(|data| read_samples(data, format, count, big_endian))
        .ok_or_else(|| DecodeError::malformed(path, "data block is truncated"))?;

    let gray = stretch_to_gray(&samples, width, height)
        .ok_or_else(|| DecodeError::malformed(path, "plane size mismatch"))?;

    let mut tags = Tags::new();
    for keyword in elements(&xml, "FITSKeyword") {
        if let (Some(name), Some(value)) = (keyword.get("name"), keyword.get("value")) {
            let value = value.trim().trim_matches('\'').trim();
            if !name.is_empty() && !value.is_empty() {
                tags.insert(name.clone(), value.to_string());
            }
        }
    }
    for property in elements(&xml, "Property") {
        if let (Some(id), Some(value)) = (property.get("id"), property.get("value")) {
            tags.insert(id.clone(), value.clone());
        }
    }

    Ok(Decoded {
        tags,
        image: DynamicImage::ImageLuma8(gray),
    })
}

/// "width:height:channels"
fn parse_geometry(geometry: &str) -> Option<(u32, u32)> {
    let mut parts = geometry.split(':').map(|p| p.trim().parse::<u32>().ok());
    let width = parts.next()??;
    let height = parts.next()??;
    (width > 0 && height > 0).then_some((width, height))
}

/// "attachment:position:size" -> position
fn parse_attachment(location: &str) -> Option<usize> {
    let mut parts = location.split(':');
    if parts.next()? != "attachment" {
        return None;
    }
    parts.next()?.trim().parse().ok()
}

/// Attributes of every `<name ...>` element in document order.
fn elements(xml: &str, name: &str) -> Vec<HashMap<String, String>> {
    let open = format!("<{name}");
    let mut found = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        // Must be the whole element name, not a prefix of a longer one
        let is_element = after
            .chars()
            .next()
            .is_some_and(|c| c.is_whitespace() || c == '>' || c == '/');
        let end = after.find('>').unwrap_or(after.len());
        if is_element {
            found.push(attributes(&after[..end]));
        }
        rest = &after[end..];
    }
    found
}

fn attributes(tag: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut rest = tag;

    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().trim_start_matches('/').trim().to_string();
        let after = rest[eq + 1..].trim_start();
        let Some(quote) = after.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            break;
        };
        let body = &after[1..];
        let Some(close) = body.find(quote) else {
            break;
        };
        attrs.insert(key, unescape(&body[..close]));
        rest = &body[close + 1..];
    }
    attrs
}

fn unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use std::path::PathBuf;

    #[test]
    fn test_decode_uint16_image_with_keywords() {
        let bytes = test_support::xisf_bytes(
            2,
            2,
            &[100, 200, 300, 400],
            r#"<FITSKeyword name="OBJECT" value="'NGC 7000'" comment=""/>
<Property id="Instrument:Camera:Name" type="String" value="ASI &amp; co"/>"#,
        );

        let decoded = decode_bytes(&PathBuf::from("nebula.xisf"), &bytes).unwrap();
        assert_eq!(decoded.image.width(), 2);
        assert_eq!(decoded.image.to_luma8().into_raw(), vec![0, 85, 170, 255]);
        assert_eq!(decoded.tags.get("OBJECT").map(String::as_str), Some("NGC 7000"));
        assert_eq!(
            decoded.tags.get("Instrument:Camera:Name").map(String::as_str),
            Some("ASI & co")
        );
    }

    #[test]
    fn test_rejects_bad_signature() {
        let err = decode_bytes(&PathBuf::from("x.xisf"), b"SIMPLE  =  T    ........").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_elements_match_whole_names() {
        let xml = r#"<Images/><Image geometry="4:3:1" sampleFormat="UInt8"></Image>"#;
        let found = elements(xml, "Image");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("geometry").map(String::as_str), Some("4:3:1"));
        assert_eq!(parse_geometry("4:3:1"), Some((4, 3)));
        assert_eq!(parse_attachment("attachment:4096:24"), Some(4096));
        assert_eq!(parse_attachment("inline:base64"), None);
    }
}
