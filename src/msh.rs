//! MSH model validator: a nested NRes container (itself parsed by
//! [`crate::nres`]) carrying typed, fixed-stride vertex/index/material
//! chunks, validated per spec.md §3.3 / §4.E.
//!
//! This is a pure read-only pass over borrowed bytes: it never persists
//! or repacks anything, it only accumulates [`Issue`]s.

use std::collections::BTreeMap;
use std::io::Cursor;

use binrw::{binrw, BinRead};
use serde::{Deserialize, Serialize};

use crate::bytes::{read_u16_at, read_u32_at, ByteReader};
use crate::error::{CoreError, CoreResult, Issue, ValidationReport};
use crate::nres;

/// Res13 batch record (stride 20): the triangle-index range and base
/// vertex for one draw batch.
#[binrw]
#[derive(Debug, Clone)]
struct Res13BatchRaw {
    _reserved0: [u8; 8],
    idx_count: u16,
    idx_start: u32,
    _reserved1: u16,
    base_vertex: u32,
}

/// Res2 slot record (stride 68): triangle/batch ranges plus ten bounding
/// floats.
#[binrw]
#[derive(Debug, Clone)]
struct Res2SlotRaw {
    tri_start: u16,
    tri_count: u16,
    batch_start: u16,
    slot_batch_count: u16,
    bounds: [f32; 10],
    _reserved: [u8; 20],
}

/// Res7 triangle-adjacency record (stride 16): three neighbor links.
#[binrw]
#[derive(Debug, Clone)]
struct Res7TriRaw {
    _reserved0: u16,
    links: [u16; 3],
    _reserved1: [u8; 8],
}

/// Res1 node record for the 38-byte stride variant: animation fallback
/// key, animation-map offset, and fifteen slot-matrix indices.
#[binrw]
#[derive(Debug, Clone)]
struct Res1NodeRaw {
    _reserved0: [u8; 4],
    map_offset: u16,
    fallback_key: u16,
    slot_indices: [u16; 15],
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MshExtras {
    pub node_count: i64,
    pub vertex_count: i64,
    pub index_count: i64,
    pub batch_count: i64,
    pub slot_count: i64,
    pub triangle_desc_count: i64,
}

struct Resource {
    data_offset: usize,
    size: u32,
    attr1: u32,
    attr2: u32,
    attr3: u32,
}

fn entry_payload<'a>(blob: &'a [u8], res: &Resource) -> &'a [u8] {
    let end = (res.data_offset + res.size as usize).min(blob.len());
    &blob[res.data_offset.min(blob.len())..end]
}

fn expect_single<'a>(
    by_type: &'a BTreeMap<u32, Vec<Resource>>,
    type_id: u32,
    label: &str,
    required: bool,
    issues: &mut Vec<Issue>,
) -> Option<&'a Resource> {
    let Some(rows) = by_type.get(&type_id) else {
        if required {
            issues.push(Issue::error("model-resource", "model", format!("missing required resource type={type_id} ({label})")));
        }
        return None;
    };
    if rows.len() > 1 {
        issues.push(Issue::warning(
            "model-resource",
            "model",
            format!("multiple resources type={type_id} ({label}); using first entry"),
        ));
    }
    rows.first()
}

fn check_fixed_stride(res: &Resource, stride: u32, label: &str, enforce_attr3: bool, enforce_attr2_zero: bool, issues: &mut Vec<Issue>) -> i64 {
    let size = res.size;
    if size % stride != 0 {
        issues.push(Issue::error("model-stride", "model", format!("{label}: size={size} is not divisible by stride={stride}")));
        return -1;
    }
    let count = (size / stride) as i64;
    if res.attr1 as i64 != count {
        issues.push(Issue::error("model-attr", "model", format!("{label}: attr1={} != size/stride={count}", res.attr1)));
    }
    if enforce_attr3 && res.attr3 != stride {
        issues.push(Issue::error("model-attr", "model", format!("{label}: attr3={} != {stride}", res.attr3)));
    }
    if enforce_attr2_zero && res.attr2 != 0 {
        issues.push(Issue::warning("model-attr", "model", format!("{label}: attr2={} (expected 0 in known assets)", res.attr2)));
    }
    count
}

fn validate_node_names(data: &[u8], node_count: i64, issues: &mut Vec<Issue>) {
    let mut r = ByteReader::new(data, "res10.node");
    for idx in 0..node_count {
        let off = r.position();
        let len = match r.u32() {
            Ok(v) => v as usize,
            Err(_) => {
                issues.push(Issue::error("res10", "model", format!("record {idx}: missing u32 length (offset={off}, size={})", data.len())));
                return;
            }
        };
        if len == 0 {
            continue;
        }
        let need = len + 1;
        let record_off = r.position();
        let bytes = match r.slice(need) {
            Ok(b) => b,
            Err(_) => {
                issues.push(Issue::error("res10", "model", format!("record {idx}: out of bounds (len={len}, need={need}, offset={record_off}, size={})", data.len())));
                return;
            }
        };
        if bytes[len] != 0 {
            issues.push(Issue::warning("res10", "model", format!("record {idx}: missing trailing NUL at payload end")));
        }
    }
    if r.position() != data.len() {
        issues.push(Issue::error("res10", "model", format!("tail bytes after node records: consumed={}, size={}", r.position(), data.len())));
    }
}

/// Validates the nested-NRes MSH payload, returning accumulated issues and
/// the record counts resolved along the way.
pub fn validate(blob: &[u8]) -> CoreResult<ValidationReport<MshExtras>> {
    if &blob.get(0..4).unwrap_or(&[]) != &nres::MAGIC.as_slice() {
        return Err(CoreError::BadMagic {
            where_: "msh.payload",
            expected: nres::MAGIC.to_vec(),
            found: blob.get(0..4).unwrap_or(&[]).to_vec(),
        });
    }

    let mut issues = Vec::new();
    let report = nres::validate(blob)?;
    for issue in report.issues {
        issues.push(Issue::warning("model-container", "model", issue.message));
    }

    let version = read_u32_at(blob, 4)?;
    let entry_count = read_u32_at(blob, 8)?;
    let total_size = read_u32_at(blob, 12)?;
    let _ = version;
    let dir_bytes = entry_count as usize * 64;
    let directory_offset = total_size as usize - dir_bytes;

    let mut by_type: BTreeMap<u32, Vec<Resource>> = BTreeMap::new();
    for index in 0..entry_count {
        let off = directory_offset + index as usize * 64;
        if off + 64 > blob.len() {
            return Err(CoreError::Truncated {
                where_: "msh.directory_entry",
                need: 64,
                have: blob.len().saturating_sub(off),
            });
        }
        let row = nres::read_dir_row_le(&blob[off..off + 64])?;
        by_type.entry(row.type_id).or_default().push(Resource {
            data_offset: row.data_offset as usize,
            size: row.size,
            attr1: row.attr1,
            attr2: row.attr2,
            attr3: row.attr3,
        });
    }

    let res1 = expect_single(&by_type, 1, "Res1", true, &mut issues);
    let res2 = expect_single(&by_type, 2, "Res2", true, &mut issues);
    let res3 = expect_single(&by_type, 3, "Res3", true, &mut issues);
    let res4 = expect_single(&by_type, 4, "Res4", false, &mut issues);
    let res5 = expect_single(&by_type, 5, "Res5", false, &mut issues);
    let res6 = expect_single(&by_type, 6, "Res6", true, &mut issues);
    let res7 = expect_single(&by_type, 7, "Res7", false, &mut issues);
    let res8 = expect_single(&by_type, 8, "Res8", false, &mut issues);
    let res10 = expect_single(&by_type, 10, "Res10", false, &mut issues);
    let res13 = expect_single(&by_type, 13, "Res13", true, &mut issues);
    let res15 = expect_single(&by_type, 15, "Res15", false, &mut issues);
    let res16 = expect_single(&by_type, 16, "Res16", false, &mut issues);
    let res18 = expect_single(&by_type, 18, "Res18", false, &mut issues);
    let res19 = expect_single(&by_type, 19, "Res19", false, &mut issues);

    let mut extras = MshExtras::default();

    let (Some(res1), Some(res2), Some(res3), Some(res6), Some(res13)) = (res1, res2, res3, res6, res13) else {
        let mut summary = BTreeMap::new();
        summary.insert("issues".to_string(), issues.len() as u64);
        return Ok(ValidationReport { summary, issues, extras });
    };

    let res1_stride = res1.attr3;
    if res1_stride != 38 && res1_stride != 24 {
        issues.push(Issue::warning("res1", "model", format!("unexpected Res1 stride attr3={res1_stride} (known: 38 or 24)")));
    }
    if res1_stride == 0 || res1.size % res1_stride != 0 {
        issues.push(Issue::error("res1", "model", format!("invalid Res1 stride={res1_stride} for size={}", res1.size)));
        let mut summary = BTreeMap::new();
        summary.insert("issues".to_string(), issues.len() as u64);
        return Ok(ValidationReport { summary, issues, extras });
    }
    let node_count = (res1.size / res1_stride) as i64;
    extras.node_count = node_count;
    if res1.attr1 as i64 != node_count {
        issues.push(Issue::error("res1", "model", format!("Res1 attr1={} != node_count={node_count}", res1.attr1)));
    }

    if res2.size < 0x8C {
        issues.push(Issue::error("res2", "model", format!("Res2 too small: size={}", res2.size)));
    }
    let mut slot_count = -1i64;
    if res2.size >= 0x8C {
        let slot_bytes = res2.size - 0x8C;
        if slot_bytes % 68 != 0 {
            issues.push(Issue::error("res2", "model", format!("Res2 slot area not divisible by 68: slot_bytes={slot_bytes}")));
        } else {
            slot_count = (slot_bytes / 68) as i64;
            if res2.attr1 as i64 != slot_count {
                issues.push(Issue::error("res2", "model", format!("Res2 attr1={} != slot_count={slot_count}", res2.attr1)));
            }
        }
        if res2.attr2 != 0 {
            issues.push(Issue::warning("res2", "model", format!("Res2 attr2={} (expected 0 in known assets)", res2.attr2)));
        }
        if res2.attr3 != 68 {
            issues.push(Issue::error("res2", "model", format!("Res2 attr3={} != 68", res2.attr3)));
        }
    }
    extras.slot_count = slot_count;

    let vertex_count = check_fixed_stride(res3, 12, "Res3", true, true, &mut issues);
    extras.vertex_count = vertex_count;
    if let Some(res4) = res4 {
        check_fixed_stride(res4, 4, "Res4", true, true, &mut issues);
    }
    if let Some(res5) = res5 {
        check_fixed_stride(res5, 4, "Res5", true, true, &mut issues);
    }
    let index_count = check_fixed_stride(res6, 2, "Res6", true, true, &mut issues);
    extras.index_count = index_count;
    let tri_desc_count = res7.map(|r| check_fixed_stride(r, 16, "Res7", true, true, &mut issues)).unwrap_or(-1);
    extras.triangle_desc_count = tri_desc_count;
    let anim_key_count = if let Some(res8) = res8 {
        let count = check_fixed_stride(res8, 24, "Res8", false, true, &mut issues);
        if res8.attr3 != 4 {
            issues.push(Issue::error("res8", "model", format!("Res8 attr3={} != 4", res8.attr3)));
        }
        count
    } else {
        -1
    };
    let batch_count = check_fixed_stride(res13, 20, "Res13", true, true, &mut issues);
    extras.batch_count = batch_count;
    if let Some(res15) = res15 {
        check_fixed_stride(res15, 8, "Res15", true, true, &mut issues);
    }
    if let Some(res16) = res16 {
        check_fixed_stride(res16, 8, "Res16", true, true, &mut issues);
    }
    if let Some(res18) = res18 {
        check_fixed_stride(res18, 4, "Res18", true, true, &mut issues);
    }
    let (anim_map_count, frame_count) = if let Some(res19) = res19 {
        let count = check_fixed_stride(res19, 2, "Res19", false, false, &mut issues);
        if res19.attr3 != 2 {
            issues.push(Issue::error("res19", "model", format!("Res19 attr3={} != 2", res19.attr3)));
        }
        (count, res19.attr2 as i64)
    } else {
        (-1, 0)
    };

    if let Some(res10) = res10 {
        if res10.attr1 as i64 != res1.attr1 as i64 {
            issues.push(Issue::error("res10", "model", format!("Res10 attr1={} != Res1.attr1={}", res10.attr1, res1.attr1)));
        }
        if res10.attr3 != 0 {
            issues.push(Issue::warning("res10", "model", format!("Res10 attr3={} (known assets use 0)", res10.attr3)));
        }
        validate_node_names(entry_payload(blob, res10), node_count, &mut issues);
    }

    if vertex_count > 0 {
        if let Some(res4) = res4 {
            if res4.size as i64 / 4 != vertex_count {
                issues.push(Issue::error("model-cross", "model", "Res4 count != Res3 count".to_string()));
            }
        }
        if let Some(res5) = res5 {
            if res5.size as i64 / 4 != vertex_count {
                issues.push(Issue::error("model-cross", "model", "Res5 count != Res3 count".to_string()));
            }
        }
    }

    let mut indices = Vec::new();
    if index_count > 0 {
        let data = entry_payload(blob, res6);
        for i in 0..index_count as usize {
            indices.push(read_u16_at(data, i * 2)?);
        }
    }

    if batch_count > 0 {
        let data = entry_payload(blob, res13);
        for batch_idx in 0..batch_count as usize {
            let b_off = batch_idx * 20;
            let batch = Res13BatchRaw::read_le(&mut Cursor::new(&data[b_off..b_off + 20]))?;
            let idx_count = batch.idx_count as usize;
            let idx_start = batch.idx_start as usize;
            let base_vertex = batch.base_vertex;
            let end = idx_start + idx_count;
            if index_count > 0 && end > index_count as usize {
                issues.push(Issue::error(
                    "res13",
                    "model",
                    format!("batch {batch_idx}: index range [{idx_start}, {end}) outside Res6 count={index_count}"),
                ));
                continue;
            }
            if idx_count % 3 != 0 {
                issues.push(Issue::warning("res13", "model", format!("batch {batch_idx}: indexCount={idx_count} is not divisible by 3")));
            }
            if vertex_count > 0 && index_count > 0 && idx_count > 0 {
                let max_raw = indices[idx_start..end].iter().copied().max().unwrap_or(0);
                if base_vertex as i64 + max_raw as i64 >= vertex_count {
                    issues.push(Issue::error(
                        "res13",
                        "model",
                        format!("batch {batch_idx}: baseVertex+maxIndex={} >= vertex_count={vertex_count}", base_vertex as i64 + max_raw as i64),
                    ));
                }
            }
        }
    }

    if slot_count > 0 {
        let data = entry_payload(blob, res2);
        for slot_idx in 0..slot_count as usize {
            let s_off = 0x8C + slot_idx * 68;
            let slot = Res2SlotRaw::read_le(&mut Cursor::new(&data[s_off..s_off + 68]))?;
            let tri_start = slot.tri_start as i64;
            let tri_count = slot.tri_count as i64;
            let batch_start = slot.batch_start as i64;
            let slot_batch_count = slot.slot_batch_count as i64;
            if tri_desc_count > 0 && tri_start + tri_count > tri_desc_count {
                issues.push(Issue::error(
                    "res2-slot",
                    "model",
                    format!("slot {slot_idx}: tri range [{tri_start}, {}) outside Res7 count={tri_desc_count}", tri_start + tri_count),
                ));
            }
            if batch_count > 0 && batch_start + slot_batch_count > batch_count {
                issues.push(Issue::error(
                    "res2-slot",
                    "model",
                    format!("slot {slot_idx}: batch range [{batch_start}, {}) outside Res13 count={batch_count}", batch_start + slot_batch_count),
                ));
            }
            for (f_idx, &value) in slot.bounds.iter().enumerate() {
                if !value.is_finite() {
                    issues.push(Issue::error("res2-slot", "model", format!("slot {slot_idx}: non-finite bound float at field {f_idx}")));
                    break;
                }
            }
        }
    }

    if tri_desc_count > 0 {
        if let Some(res7) = res7 {
            let data = entry_payload(blob, res7);
            for tri_idx in 0..tri_desc_count as usize {
                let t_off = tri_idx * 16;
                let tri = Res7TriRaw::read_le(&mut Cursor::new(&data[t_off..t_off + 16]))?;
                for &link in &tri.links {
                    if link != 0xFFFF && link as i64 >= tri_desc_count {
                        issues.push(Issue::error("res7", "model", format!("tri {tri_idx}: link {link} outside tri_desc_count={tri_desc_count}")));
                    }
                }
            }
        }
    }

    if res1_stride == 38 {
        let data = entry_payload(blob, res1);
        let map_words: Vec<u16> = if anim_map_count > 0 {
            if let Some(res19) = res19 {
                let r19 = entry_payload(blob, res19);
                (0..anim_map_count as usize).map(|i| read_u16_at(r19, i * 2)).collect::<CoreResult<_>>()?
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };

        for node_idx in 0..node_count as usize {
            let n_off = node_idx * 38;
            let node = Res1NodeRaw::read_le(&mut Cursor::new(&data[n_off..n_off + 38]))?;
            let map_offset = node.map_offset;
            let fallback_key = node.fallback_key;
            for (w_idx, &slot_idx) in node.slot_indices.iter().enumerate() {
                if slot_idx != 0xFFFF && slot_count > 0 && slot_idx as i64 >= slot_count {
                    issues.push(Issue::error("res1-slot", "model", format!("node {node_idx}: slotIndex[{w_idx}]={slot_idx} outside slot_count={slot_count}")));
                }
            }
            if anim_key_count > 0 && fallback_key != 0xFFFF && fallback_key as i64 >= anim_key_count {
                issues.push(Issue::error("res1-anim", "model", format!("node {node_idx}: fallbackKeyIndex={fallback_key} outside Res8 count={anim_key_count}")));
            }
            if !map_words.is_empty() && map_offset != 0xFFFF && frame_count > 0 {
                let end = map_offset as i64 + frame_count;
                if end > map_words.len() as i64 {
                    issues.push(Issue::error("res19-map", "model", format!("node {node_idx}: map range [{map_offset}, {end}) outside Res19 count={}", map_words.len())));
                }
            }
        }
    }

    let mut summary = BTreeMap::new();
    summary.insert("issues".to_string(), issues.len() as u64);
    summary.insert("node_count".to_string(), node_count.max(0) as u64);
    summary.insert("vertex_count".to_string(), vertex_count.max(0) as u64);

    Ok(ValidationReport { summary, issues, extras })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_resource_is_an_error() {
        // An otherwise-empty nested NRes with zero entries is missing every
        // required type.
        let mut blob = vec![0u8; 16];
        blob[0..4].copy_from_slice(nres::MAGIC);
        blob[4..8].copy_from_slice(&0x100u32.to_le_bytes());
        blob[8..12].copy_from_slice(&0u32.to_le_bytes());
        blob[12..16].copy_from_slice(&16u32.to_le_bytes());
        let report = validate(&blob).unwrap();
        assert!(report.has_errors());
    }
}
