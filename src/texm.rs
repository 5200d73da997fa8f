//! Texm texture validator: fixed 32-byte header, mip pyramid, optional
//! `Page` rect trailer, per spec.md §3.4 / §4.F.

use std::collections::BTreeMap;
use std::io::Cursor;

use binrw::{binrw, BinRead};
use serde::{Deserialize, Serialize};

use crate::bytes::read_u32_at;
use crate::error::{CoreError, CoreResult, Issue, ValidationReport};

pub const MAGIC: &[u8; 4] = b"Texm";
const HEADER_LEN: usize = 32;
const PAGE_MAGIC: &[u8; 4] = b"Page";
const KNOWN_FORMATS: [u32; 6] = [0, 565, 556, 4444, 888, 8888];

#[binrw]
#[derive(Debug, Clone)]
struct TexmHeaderRaw {
    magic: [u8; 4],
    width: u32,
    height: u32,
    mip_count: u32,
    flags4: u32,
    _reserved: [u8; 8],
    format: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TexmExtras {
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub format: u32,
    pub rect_count: Option<u32>,
}

fn bytes_per_pixel(format: u32) -> CoreResult<u32> {
    match format {
        0 => Ok(1),
        565 | 556 | 4444 => Ok(2),
        888 => Ok(4),
        8888 => Ok(4),
        other => Err(CoreError::UnsupportedTexmFormat(other)),
    }
}

fn mip_pixel_bytes(width: u32, height: u32, mip_count: u32, bpp: u32) -> u64 {
    let mut total = 0u64;
    let (mut w, mut h) = (width.max(1), height.max(1));
    for _ in 0..mip_count.max(1) {
        total += w as u64 * h as u64 * bpp as u64;
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    total
}

/// Validates a Texm payload, returning accumulated issues and the header
/// fields relevant to callers (dimensions, format, trailer rect count).
pub fn validate(data: &[u8]) -> CoreResult<ValidationReport<TexmExtras>> {
    if data.len() < HEADER_LEN {
        return Err(CoreError::Truncated {
            where_: "texm.header",
            need: HEADER_LEN,
            have: data.len(),
        });
    }
    let header = TexmHeaderRaw::read_le(&mut Cursor::new(&data[0..HEADER_LEN]))?;
    if header.magic != *MAGIC {
        return Err(CoreError::BadMagic {
            where_: "texm.header",
            expected: MAGIC.to_vec(),
            found: header.magic.to_vec(),
        });
    }

    let mut issues = Vec::new();
    let width = header.width;
    let height = header.height;
    let mip_count = header.mip_count;
    let flags4 = header.flags4;
    let format = header.format;

    if flags4 != 0 && flags4 != 32 {
        issues.push(Issue::warning("texm.header", "texture", format!("flags4={flags4} (known values: 0, 32)")));
    }
    if !KNOWN_FORMATS.contains(&format) {
        return Err(CoreError::UnsupportedTexmFormat(format));
    }

    let bpp = bytes_per_pixel(format)?;
    let pixel_bytes = mip_pixel_bytes(width, height, mip_count, bpp);
    let palette_bytes: u64 = if format == 0 { 1024 } else { 0 };
    let required = HEADER_LEN as u64 + palette_bytes + pixel_bytes;

    if required > data.len() as u64 {
        issues.push(Issue::error(
            "texm.size",
            "texture",
            format!("header + palette + pixels = {required} exceeds payload size {}", data.len()),
        ));
    }

    let mut rect_count = None;
    let tail_start = required.min(data.len() as u64) as usize;
    let tail = &data[tail_start.min(data.len())..];
    if !tail.is_empty() {
        if tail.len() < 8 || &tail[0..4] != PAGE_MAGIC {
            issues.push(Issue::error("texm.trailer", "texture", "trailing bytes are not a Page rect chunk".to_string()));
        } else {
            let count = read_u32_at(tail, 4)?;
            let expected_len = 8 + 8 * count as usize;
            if tail.len() != expected_len {
                issues.push(Issue::error(
                    "texm.trailer",
                    "texture",
                    format!("Page trailer length {} != expected 8+8*rectCount={expected_len}", tail.len()),
                ));
            }
            rect_count = Some(count);
        }
    }

    let mut summary = BTreeMap::new();
    summary.insert("mip_count".to_string(), mip_count as u64);

    Ok(ValidationReport {
        summary,
        issues,
        extras: TexmExtras {
            width,
            height,
            mip_count,
            format,
            rect_count,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(width: u32, height: u32, mip_count: u32, format: u32) -> Vec<u8> {
        let mut h = vec![0u8; HEADER_LEN];
        h[0..4].copy_from_slice(MAGIC);
        h[4..8].copy_from_slice(&width.to_le_bytes());
        h[8..12].copy_from_slice(&height.to_le_bytes());
        h[12..16].copy_from_slice(&mip_count.to_le_bytes());
        h[28..32].copy_from_slice(&format.to_le_bytes());
        h
    }

    #[test]
    fn single_mip_rgba8888_with_exact_size() {
        let mut data = header(2, 2, 1, 8888);
        data.extend(vec![0u8; 2 * 2 * 4]);
        let report = validate(&data).unwrap();
        assert!(!report.has_errors());
        assert_eq!(report.extras.format, 8888);
    }

    #[test]
    fn undersized_payload_is_an_error() {
        let mut data = header(4, 4, 1, 8888);
        data.extend(vec![0u8; 4]); // far short of 4*4*4
        let report = validate(&data).unwrap();
        assert!(report.has_errors());
    }

    #[test]
    fn page_trailer_must_match_declared_rect_count() {
        let mut data = header(1, 1, 1, 8888);
        data.extend(vec![0u8; 4]); // exact pixel bytes
        data.extend(PAGE_MAGIC);
        data.extend(&1u32.to_le_bytes());
        data.extend(vec![0u8; 8]); // one rect
        let report = validate(&data).unwrap();
        assert!(!report.has_errors());
        assert_eq!(report.extras.rect_count, Some(1));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let data = header(1, 1, 1, 9999);
        assert!(matches!(validate(&data), Err(CoreError::UnsupportedTexmFormat(9999))));
    }
}
