//! NRes container: header, 64-byte directory rows, unpack and byte-exact
//! pack.
//!
//! Layout per spec.md §1: a 16-byte header (`magic`, `version`,
//! `entry_count`, `total_size`) followed by the data region and, at the
//! tail, one 64-byte directory row per entry. Directory rows are NOT
//! necessarily stored in sort order; `sort_index` records where each
//! entry falls in a case-insensitive ordering over its name bytes.

use std::collections::BTreeMap;
use std::io::Cursor;

use binrw::{binrw, BinRead};
use serde::{Deserialize, Serialize};

use crate::bytes::{name_bytes, read_u32_at, sha256_hex};
use crate::error::{CoreError, CoreResult, Issue, ValidationReport};
use crate::write::ByteWriter;

pub const MAGIC: &[u8; 4] = b"NRes";
const DIR_ROW_LEN: usize = 64;
const HEADER_LEN: usize = 16;
const EXPECTED_VERSION: u32 = 0x0000_0100;

/// The 64-byte directory row shared by every resource directory in this
/// family of containers (archive-level NRes, and the nested NRes inside
/// MSH/map payloads). Parsed with `binrw` rather than by hand since it's
/// the textbook fixed-layout struct the format repeats verbatim.
#[binrw]
#[derive(Debug, Clone)]
pub(crate) struct NResDirRowRaw {
    pub type_id: u32,
    pub attr1: u32,
    pub attr2: u32,
    pub size: u32,
    pub attr3: u32,
    pub name_raw: [u8; 36],
    pub data_offset: u32,
    pub sort_index: u32,
}

/// Decodes one directory row from an exactly-64-byte slice. Callers are
/// expected to have already bounds-checked `row` against the archive size
/// so truncation is reported with full `{where, need, have}` context
/// before this ever runs.
pub(crate) fn read_dir_row_le(row: &[u8]) -> CoreResult<NResDirRowRaw> {
    Ok(NResDirRowRaw::read_le(&mut Cursor::new(row))?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NResHeader {
    pub magic: &'static str,
    pub version: u32,
    pub entry_count: u32,
    pub total_size: u32,
    pub directory_offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NResEntry {
    pub index: u32,
    pub type_id: u32,
    pub attr1: u32,
    pub attr2: u32,
    pub size: u32,
    pub attr3: u32,
    pub name: String,
    /// Hex of the name bytes up to (not including) the terminating NUL.
    pub name_bytes_hex: String,
    /// Hex of the full 36-byte raw name field, padding included — kept so
    /// repacking reproduces the original bytes even when they contain
    /// embedded non-UTF8 or post-NUL garbage.
    pub name_raw_hex: String,
    pub data_offset: u32,
    pub sort_index: u32,
    /// Sidecar path, `entries/<index>__<safe_name>.bin`.
    pub data_file: String,
    pub sha256: String,
}

/// Stable, serializable unpack product: enough to byte-exactly rebuild the
/// archive via [`pack`]. Mirrors the shape in spec.md §6.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NResManifest {
    pub format: &'static str,
    pub source_path: String,
    pub header: NResHeader,
    pub entries: Vec<NResEntry>,
    /// Sidecar payload for each entry, in entry order; not part of the
    /// serialized manifest document itself (it lives in the sidecar
    /// files named by each entry's `data_file`).
    #[serde(skip)]
    pub payloads: Vec<Vec<u8>>,
    pub issues: Vec<String>,
    pub source_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NResExtras {}

/// Parses and structurally validates an NRes archive, without copying out
/// entry payloads. Soft deviations from spec.md §1 accumulate as
/// [`Issue`]s in the returned report rather than aborting; only
/// unrecoverable structural problems (truncation, an out-of-bounds
/// directory) raise [`CoreError`].
pub fn validate(data: &[u8]) -> CoreResult<ValidationReport<NResExtras>> {
    if data.len() < HEADER_LEN {
        return Err(CoreError::Truncated {
            where_: "nres.header",
            need: HEADER_LEN,
            have: data.len(),
        });
    }
    if &data[0..4] != MAGIC {
        return Err(CoreError::BadMagic {
            where_: "nres.header",
            expected: MAGIC.to_vec(),
            found: data[0..4].to_vec(),
        });
    }

    let mut issues = Vec::new();
    let version = read_u32_at(data, 4)?;
    let entry_count = read_u32_at(data, 8)?;
    let total_size = read_u32_at(data, 12)?;

    if total_size as usize != data.len() {
        issues.push(Issue::warning(
            "nres.header",
            "archive",
            format!("header.total_size={total_size} != actual_size={}", data.len()),
        ));
    }
    if version != EXPECTED_VERSION {
        issues.push(Issue::warning(
            "nres.header",
            "archive",
            format!("version=0x{version:08X} != 0x{EXPECTED_VERSION:08X}"),
        ));
    }

    let dir_bytes = entry_count as usize * DIR_ROW_LEN;
    let directory_offset = (total_size as i64) - dir_bytes as i64;
    if directory_offset < HEADER_LEN as i64 || directory_offset as usize > data.len() {
        return Err(CoreError::DirectoryBounds {
            offset: directory_offset,
            entry_count,
            file_size: data.len(),
        });
    }
    let directory_offset = directory_offset as usize;
    if directory_offset + dir_bytes != data.len() {
        issues.push(Issue::warning(
            "nres.header",
            "archive",
            "directory_offset + entry_count*64 != file_size".to_string(),
        ));
    }

    let entries = read_directory(data, directory_offset, entry_count)?;
    validate_entries(data, directory_offset, &entries, &mut issues);

    let mut summary = BTreeMap::new();
    summary.insert("entries".to_string(), entry_count as u64);

    Ok(ValidationReport {
        summary,
        issues,
        extras: NResExtras {},
    })
}

fn read_directory(data: &[u8], directory_offset: usize, entry_count: u32) -> CoreResult<Vec<NResEntry>> {
    let mut entries = Vec::with_capacity(entry_count as usize);
    for index in 0..entry_count {
        let offset = directory_offset + index as usize * DIR_ROW_LEN;
        if offset + DIR_ROW_LEN > data.len() {
            return Err(CoreError::Truncated {
                where_: "nres.directory_entry",
                need: DIR_ROW_LEN,
                have: data.len().saturating_sub(offset),
            });
        }
        let row = read_dir_row_le(&data[offset..offset + DIR_ROW_LEN])?;
        let name_trimmed = name_bytes(&row.name_raw);
        entries.push(NResEntry {
            index,
            type_id: row.type_id,
            attr1: row.attr1,
            attr2: row.attr2,
            size: row.size,
            attr3: row.attr3,
            name: crate::bytes::decode_latin1(name_trimmed),
            name_bytes_hex: hex::encode(name_trimmed),
            name_raw_hex: hex::encode(row.name_raw),
            data_offset: row.data_offset,
            sort_index: row.sort_index,
            data_file: String::new(),
            sha256: String::new(),
        });
    }
    Ok(entries)
}

fn validate_entries(data: &[u8], directory_offset: usize, entries: &[NResEntry], issues: &mut Vec<Issue>) {
    let mut expected_sort: Vec<usize> = (0..entries.len()).collect();
    expected_sort.sort_by_key(|&idx| hex::decode(&entries[idx].name_bytes_hex).unwrap_or_default().to_ascii_lowercase());
    let current_sort: Vec<u32> = entries.iter().map(|e| e.sort_index).collect();
    let expected_u32: Vec<u32> = expected_sort.iter().map(|&i| i as u32).collect();
    if current_sort != expected_u32 {
        issues.push(Issue::warning(
            "nres.directory",
            "archive",
            "sort_index table does not match case-insensitive name order".to_string(),
        ));
    }

    let mut regions: Vec<(u32, u32, u32)> = entries
        .iter()
        .map(|e| (e.index, e.data_offset, e.size))
        .collect();
    regions.sort_by_key(|r| r.1);

    for &(idx, data_offset, size) in &regions {
        let entry_name = entries[idx as usize].name.clone();
        if data_offset % 8 != 0 {
            issues.push(
                Issue::warning("nres.entry", entry_name.clone(), format!("data_offset={data_offset} not aligned to 8"))
                    .with_entry(format!("{idx}")),
            );
        }
        if data_offset < HEADER_LEN as u32 || data_offset as usize + size as usize > directory_offset {
            issues.push(
                Issue::error(
                    "nres.entry",
                    entry_name,
                    format!("data range [{data_offset}, {}) out of data area", data_offset as usize + size as usize),
                )
                .with_entry(format!("{idx}")),
            );
        }
    }
    for pair in regions.windows(2) {
        let (_, start, size) = pair[0];
        let (_, next_start, _) = pair[1];
        if start + size > next_start {
            issues.push(Issue::error(
                "nres.entry",
                "archive",
                format!("entry overlap at data_offset={start}, next={next_start}"),
            ));
        }
        let pad_start = (start + size) as usize;
        let pad_end = next_start as usize;
        if pad_end <= data.len() && data[pad_start..pad_end].iter().any(|&b| b != 0) {
            issues.push(Issue::warning(
                "nres.entry",
                "archive",
                format!("non-zero padding after data block at offset={pad_start}"),
            ));
        }
    }
}

/// Parses `data` and extracts every entry payload, producing a manifest
/// suitable for byte-exact repacking via [`pack`]. `source_path` is
/// carried through verbatim for provenance; it plays no role in parsing.
pub fn unpack(data: &[u8], source_path: &str) -> CoreResult<NResManifest> {
    let report = validate(data)?;
    let version = read_u32_at(data, 4)?;
    let entry_count = read_u32_at(data, 8)?;
    let total_size = read_u32_at(data, 12)?;
    let dir_bytes = entry_count as usize * DIR_ROW_LEN;
    let directory_offset = total_size as u64 - dir_bytes as u64;
    let mut entries = read_directory(data, directory_offset as usize, entry_count)?;

    let mut payloads = Vec::with_capacity(entries.len());
    for entry in &mut entries {
        let begin = entry.data_offset as usize;
        let end = begin + entry.size as usize;
        let slice = data.get(begin..end).ok_or(CoreError::Truncated {
            where_: "nres.entry_payload",
            need: entry.size as usize,
            have: data.len().saturating_sub(begin.min(data.len())),
        })?;
        let base = crate::bytes::safe_component(&entry.name, &format!("entry_{:05}", entry.index), 80);
        entry.data_file = format!("entries/{:05}__{}__data.bin", entry.index, base);
        entry.sha256 = sha256_hex(slice);
        payloads.push(slice.to_vec());
    }

    let manifest = NResManifest {
        format: "NRes",
        source_path: source_path.to_string(),
        header: NResHeader {
            magic: "NRes",
            version,
            entry_count,
            total_size,
            directory_offset,
        },
        entries,
        payloads,
        issues: report.issues.into_iter().map(|i| i.message).collect(),
        source_sha256: sha256_hex(data),
    };
    Ok(manifest)
}

/// Rebuilds the exact archive bytes described by `manifest`, re-deriving
/// `sort_index` from a case-insensitive sort over each entry's name bytes
/// rather than trusting the stored value — matching the reference packer.
pub fn pack(manifest: &NResManifest) -> CoreResult<Vec<u8>> {
    if manifest.payloads.len() != manifest.entries.len() {
        return Err(CoreError::PackConflict { offset: 0 });
    }

    let mut w = ByteWriter::new();
    w.write_bytes(&[0u8; HEADER_LEN]);

    let mut data_offsets = Vec::with_capacity(manifest.entries.len());
    let mut data_sizes = Vec::with_capacity(manifest.entries.len());
    for payload in &manifest.payloads {
        let offset = w.position();
        w.write_bytes(payload);
        w.pad_to_align(8);
        data_offsets.push(offset as u32);
        data_sizes.push(payload.len() as u32);
    }

    let mut order: Vec<usize> = (0..manifest.entries.len()).collect();
    order.sort_by_key(|&idx| {
        hex::decode(&manifest.entries[idx].name_bytes_hex)
            .unwrap_or_default()
            .to_ascii_lowercase()
    });
    let mut sort_index_of = vec![0u32; manifest.entries.len()];
    for (rank, &idx) in order.iter().enumerate() {
        sort_index_of[idx] = rank as u32;
    }

    for (i, entry) in manifest.entries.iter().enumerate() {
        w.write_u32(entry.type_id);
        w.write_u32(entry.attr1);
        w.write_u32(entry.attr2);
        w.write_u32(data_sizes[i]);
        w.write_u32(entry.attr3);
        let name_raw = hex::decode(&entry.name_raw_hex).map_err(|_| CoreError::PackConflict { offset: 0 })?;
        let mut field = [0u8; 36];
        let take = name_raw.len().min(36);
        field[..take].copy_from_slice(&name_raw[..take]);
        w.write_bytes(&field);
        w.write_u32(data_offsets[i]);
        w.write_u32(sort_index_of[i]);
    }

    let total_size = w.position() as u32;
    let mut out = w.into_inner();
    out[0..4].copy_from_slice(MAGIC);
    out[4..8].copy_from_slice(&manifest.header.version.to_le_bytes());
    out[8..12].copy_from_slice(&(manifest.entries.len() as u32).to_le_bytes());
    out[12..16].copy_from_slice(&total_size.to_le_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_archive(names: &[&str], payloads: &[&[u8]]) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_bytes(&[0u8; HEADER_LEN]);
        let mut offsets = Vec::new();
        let mut sizes = Vec::new();
        for p in payloads {
            offsets.push(w.position() as u32);
            w.write_bytes(p);
            w.pad_to_align(8);
            sizes.push(p.len() as u32);
        }
        let mut order: Vec<usize> = (0..names.len()).collect();
        order.sort_by_key(|&i| names[i].to_ascii_lowercase());
        let mut sort_index_of = vec![0u32; names.len()];
        for (rank, &idx) in order.iter().enumerate() {
            sort_index_of[idx] = rank as u32;
        }
        for (i, name) in names.iter().enumerate() {
            w.write_u32(1); // type_id
            w.write_u32(0); // attr1
            w.write_u32(0); // attr2
            w.write_u32(sizes[i]);
            w.write_u32(0); // attr3
            let mut field = [0u8; 36];
            field[..name.len()].copy_from_slice(name.as_bytes());
            w.write_bytes(&field);
            w.write_u32(offsets[i]);
            w.write_u32(sort_index_of[i]);
        }
        let total = w.position() as u32;
        let mut out = w.into_inner();
        out[0..4].copy_from_slice(MAGIC);
        out[4..8].copy_from_slice(&EXPECTED_VERSION.to_le_bytes());
        out[8..12].copy_from_slice(&(names.len() as u32).to_le_bytes());
        out[12..16].copy_from_slice(&total.to_le_bytes());
        out
    }

    #[test]
    fn validate_clean_archive_has_no_errors() {
        let data = build_archive(&["beta.bin", "alpha.bin"], &[b"BB", b"AAAA"]);
        let report = validate(&data).unwrap();
        assert!(!report.has_errors());
    }

    #[test]
    fn unpack_then_pack_is_byte_identical() {
        let data = build_archive(&["zed.bin", "apple.bin", "mango.bin"], &[b"ZZZZ", b"A", b"MMM"]);
        let manifest = unpack(&data, "test.nres").unwrap();
        assert!(manifest.issues.is_empty());
        let repacked = pack(&manifest).unwrap();
        assert_eq!(repacked, data);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut data = build_archive(&["a.bin"], &[b"A"]);
        data[0] = b'X';
        assert!(matches!(validate(&data), Err(CoreError::BadMagic { .. })));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let data = [0u8; 8];
        assert!(matches!(validate(&data), Err(CoreError::Truncated { .. })));
    }
}
