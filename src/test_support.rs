//! Fixture builders shared by unit tests.

use image::RgbImage;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use crate::state::data::{CycleId, Mtime, RecordDraft, Tags, ThumbnailBlob};
use crate::state::library::{Catalog, Library};

const FITS_BLOCK: usize = 2880;

pub fn write_png(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    img.save(path).unwrap();
}

fn card(keyword: &str, value: &str) -> String {
    format!("{:<8}= {:>20}", keyword, value)
}

fn pad_block(bytes: &mut Vec<u8>, fill: u8) {
    let padded = bytes.len().div_ceil(FITS_BLOCK) * FITS_BLOCK;
    bytes.resize(padded, fill);
}

/// Header unit from raw (keyword, value) pairs, END card included
pub fn fits_header(cards: &[(&str, &str)]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (keyword, value) in cards {
        bytes.extend(format!("{:<80}", card(keyword, value)).into_bytes());
    }
    bytes.extend(format!("{:<80}", "END").into_bytes());
    pad_block(&mut bytes, b' ');
    bytes
}

/// 16-bit primary image, `extra` cards are appended after the mandatory ones
pub fn fits_bytes(width: u32, height: u32, extra: &[(&str, &str)], samples: &[i16]) -> Vec<u8> {
    let (w, h) = (width.to_string(), height.to_string());
    let mut cards = vec![
        ("SIMPLE", "T"),
        ("BITPIX", "16"),
        ("NAXIS", "2"),
        ("NAXIS1", w.as_str()),
        ("NAXIS2", h.as_str()),
    ];
    cards.extend_from_slice(extra);

    let mut bytes = fits_header(&cards);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_be_bytes());
    }
    pad_block(&mut bytes, 0);
    bytes
}

/// A gradient frame; different seeds give different pixels at the same size.
pub fn write_fits(path: &Path, width: u32, height: u32, seed: u32) {
    let samples: Vec<i16> = (0..height)
        .flat_map(|y| (0..width).map(move |x| ((x * 31 + y * 17 + seed * 101) % 4096) as i16))
        .collect();
    let bytes = fits_bytes(width, height, &[("OBJECT", "'M42'")], &samples);
    std::fs::write(path, bytes).unwrap();
}

/// Monolithic XISF with one UInt16 grayscale image attached at offset 4096
pub fn xisf_bytes(width: u32, height: u32, samples: &[u16], extra_xml: &str) -> Vec<u8> {
    const DATA_OFFSET: usize = 4096;
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<xisf version="1.0">
<Image geometry="{width}:{height}:1" sampleFormat="UInt16" colorSpace="Gray" location="attachment:{DATA_OFFSET}:{size}">
{extra_xml}
</Image>
</xisf>"#,
        size = samples.len() * 2,
    );

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"XISF0100");
    bytes.extend_from_slice(&(xml.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&[0u8; 4]);
    bytes.extend_from_slice(xml.as_bytes());
    assert!(bytes.len() <= DATA_OFFSET);
    bytes.resize(DATA_OFFSET, 0);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

pub fn set_mtime(path: &Path, secs: i64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(secs as u64))
        .unwrap();
}

/// Strips every permission from a directory until dropped.
#[cfg(unix)]
pub struct UnreadableDir(PathBuf);

#[cfg(unix)]
impl UnreadableDir {
    /// None when listing still works afterwards (running as root)
    pub fn new(dir: &Path) -> Option<Self> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o000)).unwrap();
        let guard = Self(dir.to_path_buf());
        std::fs::read_dir(dir).is_err().then_some(guard)
    }
}

#[cfg(unix)]
impl Drop for UnreadableDir {
    fn drop(&mut self) {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&self.0, std::fs::Permissions::from_mode(0o755));
    }
}

/// Insert `count` records with ids 1..=count into a fresh library
pub fn seed_records(library: &Library, count: usize) {
    let cycle: CycleId = library.begin_cycle().unwrap();
    for index in 1..=count {
        library
            .upsert(&RecordDraft {
                absolute_path: format!("/seed/frame_{index:03}.fits"),
                size_bytes: 2880 * index as u64,
                mtime: Mtime::new(1_700_000_000, 0),
                content_hash: format!("{index:040x}"),
                tags: Tags::new(),
                thumbnail: ThumbnailBlob {
                    width: 1,
                    height: 1,
                    bytes: vec![index as u8],
                },
                seen_cycle: cycle,
            })
            .unwrap();
    }
}
