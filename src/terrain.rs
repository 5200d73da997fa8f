//! Terrain ArealMap validator: a single type-12 chunk inside a map's
//! nested NRes, carrying a variable-length stream of areal records
//! followed by a 2D cell grid, per spec.md §3.6 / §4.G.

use std::collections::BTreeMap;
use std::io::Cursor;

use binrw::{binrw, BinRead};
use serde::{Deserialize, Serialize};

use crate::bytes::{read_f32_at, read_u16_at, read_u32_at};
use crate::error::{CoreError, CoreResult, Issue, ValidationReport};
use crate::nres;

const RECORD_HEADER_LEN: usize = 56;

/// The 56-byte areal-record header: anchor point, declared area, unit
/// normal, four opaque fields, vertex/poly counts.
#[binrw]
#[derive(Debug, Clone)]
struct ArealRecordHeaderRaw {
    anchor: [f32; 3],
    u12: u32,
    area: f32,
    normal: [f32; 3],
    logic_flag: u32,
    u36: u32,
    class_id: u32,
    u44: u32,
    vertex_count: u32,
    poly_count: u32,
}

struct Record {
    index: usize,
    vertex_count: u32,
    poly_count: u32,
    edge_links: Vec<(i32, i32)>,
    poly_links: Vec<(i32, i32)>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TerrainExtras {
    pub areal_count: u32,
    pub area_delta_abs_max: f64,
    pub area_delta_rel_max: f64,
    pub area_rel_gt_05_count: u64,
    pub normal_len_min: Option<f64>,
    pub normal_len_max: Option<f64>,
    pub cells_x: u32,
    pub cells_y: u32,
}

fn read_i32_at(data: &[u8], offset: usize) -> CoreResult<i32> {
    Ok(read_u32_at(data, offset)? as i32)
}

fn parse_record(payload: &[u8], idx: usize, ptr: usize, issues: &mut Vec<Issue>, extras: &mut TerrainExtras) -> CoreResult<Option<(Record, usize)>> {
    if ptr + RECORD_HEADER_LEN > payload.len() {
        issues.push(Issue::error("map-record", "terrain", format!("truncated areal header at index={idx}, ptr={ptr}, size={}", payload.len())));
        return Ok(None);
    }

    let header = ArealRecordHeaderRaw::read_le(&mut Cursor::new(&payload[ptr..ptr + RECORD_HEADER_LEN]))?;
    let [nx, ny, nz] = header.normal;
    let area_f = header.area;
    let vertex_count = header.vertex_count;
    let poly_count = header.poly_count;

    let normal_len = ((nx * nx + ny * ny + nz * nz) as f64).sqrt();
    extras.normal_len_min = Some(extras.normal_len_min.map_or(normal_len, |m: f64| m.min(normal_len)));
    extras.normal_len_max = Some(extras.normal_len_max.map_or(normal_len, |m: f64| m.max(normal_len)));
    if (normal_len - 1.0).abs() > 1e-3 {
        issues.push(Issue::warning("map-normal", "terrain", format!("record[{idx}] normal length={normal_len:.6} (expected ~1.0)")));
    }

    let vertices_off = ptr + RECORD_HEADER_LEN;
    let vertices_size = 12 * vertex_count as usize;
    if vertices_off + vertices_size > payload.len() {
        issues.push(Issue::error("map-vertices", "terrain", format!("record[{idx}] vertices out of bounds")));
        return Ok(None);
    }

    let mut vertices = Vec::with_capacity(vertex_count as usize);
    for i in 0..vertex_count as usize {
        let off = vertices_off + i * 12;
        vertices.push((read_f32_at(payload, off)?, read_f32_at(payload, off + 4)?));
    }

    if vertex_count >= 3 {
        let mut shoelace = 0.0f64;
        for i in 0..vertex_count as usize {
            let (x1, y1) = vertices[i];
            let (x2, y2) = vertices[(i + 1) % vertex_count as usize];
            shoelace += x1 as f64 * y2 as f64 - x2 as f64 * y1 as f64;
        }
        let area_xy = shoelace.abs() * 0.5;
        let delta = (area_xy - area_f as f64).abs();
        extras.area_delta_abs_max = extras.area_delta_abs_max.max(delta);
        let rel_delta = delta / area_xy.max(1.0);
        extras.area_delta_rel_max = extras.area_delta_rel_max.max(rel_delta);
        if rel_delta > 0.05 {
            extras.area_rel_gt_05_count += 1;
        }
    }

    let links_off = vertices_off + vertices_size;
    let link_count = vertex_count as usize + 3 * poly_count as usize;
    let links_size = 8 * link_count;
    if links_off + links_size > payload.len() {
        issues.push(Issue::error("map-links", "terrain", format!("record[{idx}] link table out of bounds")));
        return Ok(None);
    }

    let mut edge_links = Vec::with_capacity(vertex_count as usize);
    for i in 0..vertex_count as usize {
        let off = links_off + i * 8;
        edge_links.push((read_i32_at(payload, off)?, read_i32_at(payload, off + 4)?));
    }
    let poly_links_off = links_off + 8 * vertex_count as usize;
    let mut poly_links = Vec::with_capacity(3 * poly_count as usize);
    for i in 0..3 * poly_count as usize {
        let off = poly_links_off + i * 8;
        poly_links.push((read_i32_at(payload, off)?, read_i32_at(payload, off + 4)?));
    }

    let mut p = links_off + links_size;
    for poly_idx in 0..poly_count as usize {
        if p + 4 > payload.len() {
            issues.push(Issue::error("map-poly", "terrain", format!("record[{idx}] poly header truncated at poly_idx={poly_idx}")));
            return Ok(None);
        }
        let n = read_u32_at(payload, p)?;
        let poly_size = 4 * (3 * n as usize + 1);
        if p + poly_size > payload.len() {
            issues.push(Issue::error("map-poly", "terrain", format!("record[{idx}] poly data out of bounds at poly_idx={poly_idx}")));
            return Ok(None);
        }
        p += poly_size;
    }

    Ok(Some((
        Record {
            index: idx,
            vertex_count,
            poly_count,
            edge_links,
            poly_links,
        },
        p,
    )))
}

fn validate_links(records: &[Record], areal_count: u32, issues: &mut Vec<Issue>) {
    let vertex_counts: Vec<u32> = records.iter().map(|r| r.vertex_count).collect();
    for rec in records {
        let idx = rec.index;
        for (link_idx, &(area_ref, edge_ref)) in rec.edge_links.iter().enumerate() {
            if area_ref == -1 {
                if edge_ref != -1 {
                    issues.push(Issue::warning("map-link", "terrain", format!("record[{idx}] edge_link[{link_idx}] has area_ref=-1 but edge_ref={edge_ref}")));
                }
                continue;
            }
            if area_ref < 0 || area_ref as u32 >= areal_count {
                issues.push(Issue::error("map-link", "terrain", format!("record[{idx}] edge_link[{link_idx}] area_ref={area_ref} out of range")));
                continue;
            }
            let dst_vcount = vertex_counts[area_ref as usize];
            if edge_ref < 0 || edge_ref as u32 >= dst_vcount {
                issues.push(Issue::error(
                    "map-link",
                    "terrain",
                    format!("record[{idx}] edge_link[{link_idx}] edge_ref={edge_ref} out of range dst_vertex_count={dst_vcount}"),
                ));
            }
        }
        for (link_idx, &(area_ref, edge_ref)) in rec.poly_links.iter().enumerate() {
            if area_ref == -1 {
                if edge_ref != -1 {
                    issues.push(Issue::warning("map-poly-link", "terrain", format!("record[{idx}] poly_link[{link_idx}] has area_ref=-1 but edge_ref={edge_ref}")));
                }
                continue;
            }
            if area_ref < 0 || area_ref as u32 >= areal_count {
                issues.push(Issue::error("map-poly-link", "terrain", format!("record[{idx}] poly_link[{link_idx}] area_ref={area_ref} out of range")));
            }
        }
    }
}

/// Validates a type-12 ArealMap payload (already sliced out of its NRes
/// entry) against spec.md §3.6.
pub fn validate(payload: &[u8], areal_count: u32) -> CoreResult<ValidationReport<TerrainExtras>> {
    let mut issues = Vec::new();
    let mut extras = TerrainExtras {
        areal_count,
        ..Default::default()
    };

    if areal_count == 0 {
        issues.push(Issue::error("map-areal", "terrain", format!("invalid areal_count={areal_count}")));
        let mut summary = BTreeMap::new();
        summary.insert("issues".to_string(), issues.len() as u64);
        return Ok(ValidationReport { summary, issues, extras });
    }

    let mut ptr = 0usize;
    let mut records = Vec::with_capacity(areal_count as usize);
    for idx in 0..areal_count as usize {
        match parse_record(payload, idx, ptr, &mut issues, &mut extras)? {
            Some((record, next_ptr)) => {
                ptr = next_ptr;
                records.push(record);
            }
            None => {
                let mut summary = BTreeMap::new();
                summary.insert("issues".to_string(), issues.len() as u64);
                return Ok(ValidationReport { summary, issues, extras });
            }
        }
    }

    validate_links(&records, areal_count, &mut issues);

    if ptr + 8 > payload.len() {
        issues.push(Issue::error("map-cells", "terrain", format!("missing cells header at ptr={ptr}, size={}", payload.len())));
        let mut summary = BTreeMap::new();
        summary.insert("issues".to_string(), issues.len() as u64);
        return Ok(ValidationReport { summary, issues, extras });
    }

    let cells_x = read_u32_at(payload, ptr)?;
    let cells_y = read_u32_at(payload, ptr + 4)?;
    extras.cells_x = cells_x;
    extras.cells_y = cells_y;
    ptr += 8;

    if cells_x == 0 || cells_y == 0 {
        issues.push(Issue::error("map-cells", "terrain", format!("invalid cells dimensions {cells_x}x{cells_y}")));
        let mut summary = BTreeMap::new();
        summary.insert("issues".to_string(), issues.len() as u64);
        return Ok(ValidationReport { summary, issues, extras });
    }

    'grid: for x in 0..cells_x {
        for y in 0..cells_y {
            if ptr + 2 > payload.len() {
                issues.push(Issue::error("map-cells", "terrain", format!("truncated hitCount at cell ({x},{y})")));
                break 'grid;
            }
            let hit_count = read_u16_at(payload, ptr)? as usize;
            ptr += 2;
            let need = 2 * hit_count;
            if ptr + need > payload.len() {
                issues.push(Issue::error("map-cells", "terrain", format!("truncated areaIds at cell ({x},{y}), hitCount={hit_count}")));
                break 'grid;
            }
            for i in 0..hit_count {
                let area_id = read_u16_at(payload, ptr + 2 * i)?;
                if area_id as u32 >= areal_count {
                    issues.push(Issue::error("map-cells", "terrain", format!("cell ({x},{y}) has area_id={area_id} out of range areal_count={areal_count}")));
                }
            }
            ptr += need;
        }
    }

    if ptr != payload.len() {
        issues.push(Issue::error("map-size", "terrain", format!("payload tail mismatch: consumed={ptr}, payload_size={}", payload.len())));
    }

    let mut summary = BTreeMap::new();
    summary.insert("issues".to_string(), issues.len() as u64);
    summary.insert("records".to_string(), records.len() as u64);
    Ok(ValidationReport { summary, issues, extras })
}

/// Convenience entry point used by the archive-level driver: locates the
/// single type-12 entry inside a map's nested NRes container and
/// validates its payload.
pub fn validate_map_nres(blob: &[u8]) -> CoreResult<ValidationReport<TerrainExtras>> {
    let report = crate::nres::validate(blob)?;
    let mut issues: Vec<Issue> = report.issues.into_iter().map(|i| Issue::warning("map-nres", "terrain", i.message)).collect();

    let version = read_u32_at(blob, 4)?;
    let _ = version;
    let entry_count = read_u32_at(blob, 8)?;
    let total_size = read_u32_at(blob, 12)?;
    let directory_offset = total_size as usize - entry_count as usize * 64;

    if entry_count != 1 {
        issues.push(Issue::error("map-chunk", "terrain", format!("expected single chunk type=12, got {entry_count} entries")));
        let mut summary = BTreeMap::new();
        summary.insert("issues".to_string(), issues.len() as u64);
        return Ok(ValidationReport { summary, issues, extras: TerrainExtras::default() });
    }

    if directory_offset + 64 > blob.len() {
        return Err(CoreError::Truncated {
            where_: "map.directory_entry",
            need: 64,
            have: blob.len().saturating_sub(directory_offset),
        });
    }
    let row = nres::read_dir_row_le(&blob[directory_offset..directory_offset + 64])?;
    let type_id = row.type_id;
    let attr1 = row.attr1;
    let size = row.size;
    let data_offset = row.data_offset;

    if type_id != 12 {
        issues.push(Issue::error("map-chunk", "terrain", format!("expected single chunk type=12, got type={type_id}")));
        let mut summary = BTreeMap::new();
        summary.insert("issues".to_string(), issues.len() as u64);
        return Ok(ValidationReport { summary, issues, extras: TerrainExtras::default() });
    }

    let payload = blob
        .get(data_offset as usize..data_offset as usize + size as usize)
        .ok_or(CoreError::Truncated {
            where_: "map.payload",
            need: size as usize,
            have: blob.len().saturating_sub(data_offset as usize),
        })?;

    let mut inner = validate(payload, attr1)?;
    inner.issues.splice(0..0, issues);
    Ok(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_single_triangle_record(area: f32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0f32.to_le_bytes()); // anchor.x
        out.extend_from_slice(&0f32.to_le_bytes()); // anchor.y
        out.extend_from_slice(&0f32.to_le_bytes()); // anchor.z
        out.extend_from_slice(&0u32.to_le_bytes()); // u12
        out.extend_from_slice(&area.to_le_bytes()); // area
        out.extend_from_slice(&0f32.to_le_bytes()); // nx
        out.extend_from_slice(&0f32.to_le_bytes()); // ny
        out.extend_from_slice(&1f32.to_le_bytes()); // nz (unit normal)
        out.extend_from_slice(&0u32.to_le_bytes()); // logic_flag
        out.extend_from_slice(&0u32.to_le_bytes()); // u36
        out.extend_from_slice(&0u32.to_le_bytes()); // class_id
        out.extend_from_slice(&0u32.to_le_bytes()); // u44
        out.extend_from_slice(&3u32.to_le_bytes()); // vertex_count
        out.extend_from_slice(&0u32.to_le_bytes()); // poly_count
        assert_eq!(out.len(), RECORD_HEADER_LEN);

        // Right triangle (0,0) (2,0) (0,2) -> area 2.0
        out.extend_from_slice(&0f32.to_le_bytes());
        out.extend_from_slice(&0f32.to_le_bytes());
        out.extend_from_slice(&0f32.to_le_bytes());
        out.extend_from_slice(&2f32.to_le_bytes());
        out.extend_from_slice(&0f32.to_le_bytes());
        out.extend_from_slice(&0f32.to_le_bytes());
        out.extend_from_slice(&0f32.to_le_bytes());
        out.extend_from_slice(&2f32.to_le_bytes());
        out.extend_from_slice(&0f32.to_le_bytes());

        // link table: 3 vertex links, all sentinel.
        for _ in 0..3 {
            out.extend_from_slice(&(-1i32).to_le_bytes());
            out.extend_from_slice(&(-1i32).to_le_bytes());
        }
        // no polygons (poly_count=0).

        // cell grid: 1x1, zero hits.
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    #[test]
    fn matching_area_has_no_error_issues() {
        let payload = build_single_triangle_record(2.0);
        let report = validate(&payload, 1).unwrap();
        assert!(!report.has_errors());
        assert!(report.extras.area_delta_abs_max < 1e-4);
    }

    #[test]
    fn mismatched_area_is_tracked_but_not_fatal() {
        let payload = build_single_triangle_record(99.0);
        let report = validate(&payload, 1).unwrap();
        assert!(!report.has_errors());
        assert!(report.extras.area_delta_abs_max > 50.0);
    }

    #[test]
    fn zero_areal_count_is_an_error() {
        let report = validate(&[], 0).unwrap();
        assert!(report.has_errors());
    }
}
