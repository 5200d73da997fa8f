//! RsLi container: 32-byte header, XOR-encrypted 32-byte directory rows,
//! optional `AO` trailer, unpack and byte-exact pack.
//!
//! Unlike NRes, the directory itself is obfuscated: it must be decrypted
//! with the header's `seed` (low 16 bits) before any row can be read. Each
//! row then names its own codec via `flags_signed & 0x1E0` (see
//! [`crate::codec::Method`]).

use std::collections::BTreeMap;
use std::io::Cursor;

use bilge::prelude::*;
use binrw::{binrw, BinRead};
use serde::{Deserialize, Serialize};

use crate::bytes::{decode_latin1, name_bytes, read_u16_at, read_u32_at, sha256_hex};
use crate::codec::{self, Method};
use crate::error::{CoreError, CoreResult, Issue, ValidationReport};

pub const MAGIC: &[u8; 4] = b"NL\x00\x01";
const HEADER_LEN: usize = 32;
const ROW_LEN: usize = 32;
const PRESORTED_MAGIC: u16 = 0xABBA;

/// `flags_signed` reinterpreted as bits: the codec method lives in bits
/// 5-8 (`& 0x1E0`), the rest is unassigned in every known asset.
#[bitsize(16)]
#[derive(DebugBits, FromBits, Clone, Copy)]
struct EntryFlags {
    low: u5,
    method: u4,
    high: u7,
}

/// The 32-byte directory row, still XOR-encrypted key-stream-wise at the
/// byte level but otherwise a plain fixed-layout record once decrypted.
#[binrw]
#[derive(Debug, Clone)]
struct RsLiRowRaw {
    name_raw: [u8; 12],
    reserved: [u8; 4],
    flags_signed: i16,
    sort_to_original: i16,
    unpacked_size: u32,
    data_offset: u32,
    packed_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsLiHeader {
    /// Hex of the 4-byte magic (`NL\x00\x01`); not valid UTF-8 as a string.
    pub magic_hex: String,
    pub entry_count: i16,
    pub seed: u32,
    pub presorted_flag: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsLiTrailer {
    pub present: bool,
    /// The literal `"AO"` bytes when present, empty otherwise.
    pub signature: String,
    pub overlay_offset: u32,
    pub raw_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsLiEntry {
    pub index: u32,
    pub name: String,
    pub name_raw_hex: String,
    pub reserved_raw_hex: String,
    pub flags_signed: i16,
    /// `flags_signed & 0x1E0`; names the [`Method`] this entry decodes with.
    pub method: u16,
    pub sort_to_original: i16,
    pub unpacked_size: u32,
    pub data_offset: u32,
    pub effective_data_offset: i64,
    pub packed_size: u32,
    pub packed_file: String,
    pub packed_file_size: u32,
    pub packed_sha256: String,
    pub unpacked_file: Option<String>,
    pub unpacked_sha256: Option<String>,
    pub unpack_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsLiManifest {
    pub format: &'static str,
    pub source_path: String,
    pub source_size: usize,
    pub header_raw_hex: String,
    pub header: RsLiHeader,
    pub entries: Vec<RsLiEntry>,
    #[serde(skip)]
    pub packed_payloads: Vec<Vec<u8>>,
    #[serde(skip)]
    pub unpacked_payloads: Vec<Option<Vec<u8>>>,
    pub trailer: RsLiTrailer,
    pub issues: Vec<String>,
    pub source_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RsLiExtras {}

fn overlay_trailer(data: &[u8]) -> RsLiTrailer {
    if data.len() >= 6 && &data[data.len() - 6..data.len() - 4] == b"AO" {
        let overlay_offset = read_u32_at(data, data.len() - 4).unwrap_or(0);
        RsLiTrailer {
            present: true,
            signature: "AO".to_string(),
            overlay_offset,
            raw_hex: hex::encode(&data[data.len() - 6..]),
        }
    } else {
        RsLiTrailer {
            present: false,
            signature: String::new(),
            overlay_offset: 0,
            raw_hex: String::new(),
        }
    }
}

fn read_rows(data: &[u8], entry_count: i16, seed: u32, overlay_offset: u32) -> CoreResult<Vec<RsLiEntry>> {
    if entry_count < 0 {
        return Err(CoreError::DirectoryBounds {
            offset: HEADER_LEN as i64,
            entry_count: entry_count as u32,
            file_size: data.len(),
        });
    }
    let entry_count = entry_count as usize;
    let table_size = entry_count * ROW_LEN;
    if HEADER_LEN + table_size > data.len() {
        return Err(CoreError::DirectoryBounds {
            offset: HEADER_LEN as i64,
            entry_count: entry_count as u32,
            file_size: data.len(),
        });
    }

    let encrypted = &data[HEADER_LEN..HEADER_LEN + table_size];
    let plain = codec::xor::apply(encrypted, (seed & 0xFFFF) as u16);

    let mut entries = Vec::with_capacity(entry_count);
    for index in 0..entry_count {
        let row_bytes = &plain[index * ROW_LEN..(index + 1) * ROW_LEN];
        let row = RsLiRowRaw::read_le(&mut Cursor::new(row_bytes))?;
        let flags = EntryFlags::from(row.flags_signed as u16);
        let method = u16::from(flags.method()) << 5;

        entries.push(RsLiEntry {
            index: index as u32,
            name: decode_latin1(name_bytes(&row.name_raw)),
            name_raw_hex: hex::encode(row.name_raw),
            reserved_raw_hex: hex::encode(row.reserved),
            flags_signed: row.flags_signed,
            method,
            sort_to_original: row.sort_to_original,
            unpacked_size: row.unpacked_size,
            data_offset: row.data_offset,
            effective_data_offset: row.data_offset as i64 + overlay_offset as i64,
            packed_size: row.packed_size,
            packed_file: String::new(),
            packed_file_size: 0,
            packed_sha256: String::new(),
            unpacked_file: None,
            unpacked_sha256: None,
            unpack_error: None,
        });
    }
    Ok(entries)
}

/// Parses and structurally validates an RsLi archive.
pub fn validate(data: &[u8]) -> CoreResult<ValidationReport<RsLiExtras>> {
    if data.len() < HEADER_LEN {
        return Err(CoreError::Truncated {
            where_: "rsli.header",
            need: HEADER_LEN,
            have: data.len(),
        });
    }
    if &data[0..4] != MAGIC {
        return Err(CoreError::BadMagic {
            where_: "rsli.header",
            expected: MAGIC.to_vec(),
            found: data[0..4].to_vec(),
        });
    }

    let mut issues = Vec::new();
    let reserved_zero = data[2];
    let version = data[3];
    let entry_count = read_u16_at(data, 4)? as i16;
    let presorted_flag = read_u16_at(data, 14)?;
    let seed = read_u32_at(data, 20)?;

    if reserved_zero != 0 {
        issues.push(Issue::warning("rsli.header", "archive", format!("header[2]={reserved_zero} != 0")));
    }
    if version != 1 {
        issues.push(Issue::warning("rsli.header", "archive", format!("version={version} != 1")));
    }

    let trailer = overlay_trailer(data);
    let entries = read_rows(data, entry_count, seed, trailer.overlay_offset)?;

    let mut sort_values = Vec::with_capacity(entries.len());
    for entry in &entries {
        let effective_offset = entry.effective_data_offset;
        sort_values.push(entry.sort_to_original);
        if effective_offset < 0 {
            issues.push(
                Issue::error("rsli.entry", entry.name.clone(), format!("negative effective_data_offset={effective_offset}"))
                    .with_entry(format!("{}", entry.index)),
            );
            continue;
        }
        let end = effective_offset as usize + entry.packed_size as usize;
        if end > data.len() {
            if entry.method == 0x100 && end == data.len() + 1 {
                issues.push(
                    Issue::warning(
                        "rsli.entry",
                        entry.name.clone(),
                        format!("deflate packed_size reaches EOF+1 ({end}); likely decoder lookahead byte"),
                    )
                    .with_entry(format!("{}", entry.index)),
                );
            } else {
                issues.push(
                    Issue::error(
                        "rsli.entry",
                        entry.name.clone(),
                        format!("packed range [{effective_offset}, {end}) out of file"),
                    )
                    .with_entry(format!("{}", entry.index)),
                );
            }
        }
    }

    if presorted_flag == PRESORTED_MAGIC {
        let mut sorted = sort_values.clone();
        sorted.sort();
        let expected: Vec<i16> = (0..entries.len() as i16).collect();
        if sorted != expected {
            issues.push(Issue::warning(
                "rsli.directory",
                "archive",
                "presorted flag is 0xABBA but sort_to_original is not a permutation".to_string(),
            ));
        }
    }

    let mut summary = BTreeMap::new();
    summary.insert("entries".to_string(), entries.len() as u64);

    Ok(ValidationReport {
        summary,
        issues,
        extras: RsLiExtras {},
    })
}

/// Parses `data`, extracts packed payloads, and attempts to decode each
/// one. A decode failure becomes an [`Issue`] on the returned manifest
/// rather than aborting the whole unpack. `source_path` is carried
/// through verbatim for provenance.
pub fn unpack(data: &[u8], source_path: &str) -> CoreResult<RsLiManifest> {
    let report = validate(data)?;
    let mut issues = report.issues;

    let entry_count = read_u16_at(data, 4)? as i16;
    let presorted_flag = read_u16_at(data, 14)?;
    let seed = read_u32_at(data, 20)?;
    let trailer = overlay_trailer(data);
    let mut entries = read_rows(data, entry_count, seed, trailer.overlay_offset)?;

    let mut packed_payloads = Vec::with_capacity(entries.len());
    let mut unpacked_payloads = Vec::with_capacity(entries.len());

    for entry in &mut entries {
        let begin = entry.effective_data_offset.max(0) as usize;
        let end = (begin + entry.packed_size as usize).min(data.len());
        let packed = data.get(begin..end).unwrap_or(&[]).to_vec();

        let base = crate::bytes::safe_component(&entry.name, &format!("entry_{:05}", entry.index), 80);
        entry.packed_file = format!("entries/{:05}__{}__packed.bin", entry.index, base);
        entry.packed_file_size = packed.len() as u32;
        entry.packed_sha256 = sha256_hex(&packed);

        match Method::from_tag(entry.method)
            .and_then(|method| codec::decode(&packed, method, (entry.sort_to_original as u16) & 0xFFFF, entry.unpacked_size as usize))
        {
            Ok(unpacked) => {
                entry.unpacked_file = Some(format!("entries/{:05}__{}__unpacked.bin", entry.index, base));
                entry.unpacked_sha256 = Some(sha256_hex(&unpacked));
                unpacked_payloads.push(Some(unpacked));
            }
            Err(err) => {
                entry.unpack_error = Some(err.to_string());
                issues.push(
                    Issue::error("rsli.entry", entry.name.clone(), format!("cannot decode method 0x{:03X}: {err}", entry.method))
                        .with_entry(format!("{}", entry.index)),
                );
                unpacked_payloads.push(None);
            }
        }
        packed_payloads.push(packed);
    }

    let manifest = RsLiManifest {
        format: "RsLi",
        source_path: source_path.to_string(),
        source_size: data.len(),
        header_raw_hex: hex::encode(&data[0..HEADER_LEN]),
        header: RsLiHeader {
            magic_hex: hex::encode(MAGIC),
            entry_count,
            seed,
            presorted_flag,
        },
        entries,
        packed_payloads,
        unpacked_payloads,
        trailer,
        issues: issues.into_iter().map(|i| i.message).collect(),
        source_sha256: sha256_hex(data),
    };
    Ok(manifest)
}

/// Rebuilds the archive bytes described by `manifest`. Overlapping writes
/// into the shared data region are permitted only when the bytes agree;
/// a genuine conflict raises [`CoreError::PackConflict`].
pub fn pack(manifest: &RsLiManifest) -> CoreResult<Vec<u8>> {
    let mut header_raw = hex::decode(&manifest.header_raw_hex).map_err(|_| CoreError::PackConflict { offset: 0 })?;
    if header_raw.len() != HEADER_LEN {
        return Err(CoreError::PackConflict { offset: 0 });
    }
    header_raw[0..4].copy_from_slice(MAGIC);
    header_raw[4..6].copy_from_slice(&(manifest.entries.len() as i16).to_le_bytes());
    header_raw[20..24].copy_from_slice(&manifest.header.seed.to_le_bytes());

    let mut rows = Vec::with_capacity(manifest.entries.len() * ROW_LEN);
    for (i, entry) in manifest.entries.iter().enumerate() {
        let packed = &manifest.packed_payloads[i];
        if packed.len() > entry.packed_size as usize {
            return Err(CoreError::PackOverflow {
                what: "rsli.packed_size",
                at: i,
                value: packed.len() as i64,
            });
        }
        let name_raw = hex::decode(&entry.name_raw_hex).map_err(|_| CoreError::PackConflict { offset: 0 })?;
        let reserved_raw = hex::decode(&entry.reserved_raw_hex).map_err(|_| CoreError::PackConflict { offset: 0 })?;
        if name_raw.len() != 12 || reserved_raw.len() != 4 {
            return Err(CoreError::PackConflict { offset: 0 });
        }
        rows.extend_from_slice(&name_raw);
        rows.extend_from_slice(&reserved_raw);
        rows.extend_from_slice(&entry.flags_signed.to_le_bytes());
        rows.extend_from_slice(&entry.sort_to_original.to_le_bytes());
        rows.extend_from_slice(&entry.unpacked_size.to_le_bytes());
        rows.extend_from_slice(&entry.data_offset.to_le_bytes());
        rows.extend_from_slice(&entry.packed_size.to_le_bytes());
    }
    let encrypted_table = codec::xor::apply(&rows, (manifest.header.seed & 0xFFFF) as u16);

    let trailer_raw = if manifest.trailer.present {
        let raw = hex::decode(&manifest.trailer.raw_hex).map_err(|_| CoreError::PackConflict { offset: 0 })?;
        if raw.len() != 6 {
            return Err(CoreError::PackConflict { offset: 0 });
        }
        raw
    } else {
        Vec::new()
    };

    let table_end = HEADER_LEN + encrypted_table.len();
    let pre_trailer_size = manifest.source_size.saturating_sub(trailer_raw.len()).max(table_end);

    let mut out = vec![0u8; pre_trailer_size];
    let mut occupied = vec![false; pre_trailer_size];
    out[0..HEADER_LEN].copy_from_slice(&header_raw);
    out[HEADER_LEN..table_end].copy_from_slice(&encrypted_table);
    for b in &mut occupied[0..table_end] {
        *b = true;
    }

    for (i, entry) in manifest.entries.iter().enumerate() {
        let packed = &manifest.packed_payloads[i];
        let base = entry.data_offset as usize;
        for (idx, &byte) in packed.iter().enumerate() {
            let pos = base + idx;
            if pos >= pre_trailer_size {
                return Err(CoreError::PackOverflow {
                    what: "rsli.data_offset",
                    at: pos,
                    value: byte as i64,
                });
            }
            if occupied[pos] && out[pos] != byte {
                return Err(CoreError::PackConflict { offset: pos });
            }
            out[pos] = byte;
            occupied[pos] = true;
        }
    }

    out.extend_from_slice(&trailer_raw);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_archive(seed: u32, names: &[&str], payloads: &[&[u8]]) -> Vec<u8> {
        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(MAGIC);
        header[3] = 1; // version
        header[4..6].copy_from_slice(&(names.len() as i16).to_le_bytes());
        header[20..24].copy_from_slice(&seed.to_le_bytes());

        let table_end = HEADER_LEN + names.len() * ROW_LEN;
        let mut data_offset = table_end;
        let mut offsets = Vec::new();
        for p in payloads {
            offsets.push(data_offset as u32);
            data_offset += p.len();
        }

        let mut rows = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let mut name_field = [0u8; 12];
            name_field[..name.len()].copy_from_slice(name.as_bytes());
            rows.extend_from_slice(&name_field);
            rows.extend_from_slice(&[0u8; 4]);
            rows.extend_from_slice(&0i16.to_le_bytes()); // flags_signed: identity method
            rows.extend_from_slice(&(i as i16).to_le_bytes()); // sort_to_original
            rows.extend_from_slice(&(payloads[i].len() as u32).to_le_bytes());
            rows.extend_from_slice(&offsets[i].to_le_bytes());
            rows.extend_from_slice(&(payloads[i].len() as u32).to_le_bytes());
        }
        let encrypted = codec::xor::apply(&rows, (seed & 0xFFFF) as u16);

        let mut out = Vec::new();
        out.extend_from_slice(&header);
        out.extend_from_slice(&encrypted);
        for p in payloads {
            out.extend_from_slice(p);
        }
        out
    }

    #[test]
    fn validate_identity_archive_has_no_errors() {
        let data = build_archive(0x1234, &["a.txt", "b.txt"], &[b"hello", b"world!"]);
        let report = validate(&data).unwrap();
        assert!(!report.has_errors());
    }

    #[test]
    fn unpack_decodes_identity_payloads() {
        let data = build_archive(0xBEEF, &["one"], &[b"payload-bytes"]);
        let manifest = unpack(&data, "test.rsli").unwrap();
        assert!(manifest.issues.is_empty());
        assert_eq!(manifest.unpacked_payloads[0].as_deref(), Some(&b"payload-bytes"[..]));
        assert_eq!(manifest.entries[0].unpacked_sha256.as_deref(), Some(sha256_hex(b"payload-bytes").as_str()));
    }

    #[test]
    fn unpack_then_pack_is_byte_identical() {
        let data = build_archive(0x4321, &["x", "yy", "zzz"], &[b"1", b"22", b"333"]);
        let manifest = unpack(&data, "test.rsli").unwrap();
        let repacked = pack(&manifest).unwrap();
        assert_eq!(repacked, data);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut data = build_archive(1, &["a"], &[b"x"]);
        data[0] = b'Z';
        assert!(matches!(validate(&data), Err(CoreError::BadMagic { .. })));
    }
}
