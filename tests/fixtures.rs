//! Literal end-to-end scenarios, one per worked example.

use relicpack::{codec, fxid, nres, rng, rsli, terrain};

#[test]
fn scenario_1_nres_minimum() {
    // Two entries: index 0 "b.bin" -> [0xAA], index 1 "a.bin" -> [0xBB, 0xCC].
    // data_offset[0]=16, data_offset[1]=24 (after a 7-byte pad to align 8),
    // directory at 32, total_size = 32 + 2*64 = 160, sort_index[0]=1 (b > a),
    // sort_index[1]=0.
    let mut data = Vec::new();
    data.extend_from_slice(&[0u8; 16]); // header placeholder
    data.push(0xAA);
    data.extend_from_slice(&[0u8; 7]); // pad to 8-byte alignment
    data.extend_from_slice(&[0xBB, 0xCC]);
    data.extend_from_slice(&[0u8; 6]); // pad to 32

    assert_eq!(data.len(), 32);

    let mut dir = Vec::new();
    // entry 0: "b.bin"
    dir.extend_from_slice(&1u32.to_le_bytes()); // type_id
    dir.extend_from_slice(&0u32.to_le_bytes()); // attr1
    dir.extend_from_slice(&0u32.to_le_bytes()); // attr2
    dir.extend_from_slice(&1u32.to_le_bytes()); // size
    dir.extend_from_slice(&0u32.to_le_bytes()); // attr3
    let mut name = [0u8; 36];
    name[..5].copy_from_slice(b"b.bin");
    dir.extend_from_slice(&name);
    dir.extend_from_slice(&16u32.to_le_bytes()); // data_offset
    dir.extend_from_slice(&1u32.to_le_bytes()); // sort_index

    // entry 1: "a.bin"
    dir.extend_from_slice(&1u32.to_le_bytes());
    dir.extend_from_slice(&0u32.to_le_bytes());
    dir.extend_from_slice(&0u32.to_le_bytes());
    dir.extend_from_slice(&2u32.to_le_bytes());
    dir.extend_from_slice(&0u32.to_le_bytes());
    let mut name = [0u8; 36];
    name[..5].copy_from_slice(b"a.bin");
    dir.extend_from_slice(&name);
    dir.extend_from_slice(&24u32.to_le_bytes());
    dir.extend_from_slice(&0u32.to_le_bytes());

    data.extend_from_slice(&dir);

    let total_size = data.len() as u32;
    assert_eq!(total_size, 160);
    data[0..4].copy_from_slice(nres::MAGIC);
    data[4..8].copy_from_slice(&0x0000_0100u32.to_le_bytes());
    data[8..12].copy_from_slice(&2u32.to_le_bytes());
    data[12..16].copy_from_slice(&total_size.to_le_bytes());

    let manifest = nres::unpack(&data, "scenario1.nres").unwrap();
    assert!(manifest.issues.is_empty());
    assert_eq!(manifest.entries[0].data_offset, 16);
    assert_eq!(manifest.entries[1].data_offset, 24);
    assert_eq!(manifest.entries[0].sort_index, 1);
    assert_eq!(manifest.entries[1].sort_index, 0);
    assert_eq!(manifest.header.directory_offset, 32);
    assert_eq!(manifest.header.total_size, 160);

    let repacked = nres::pack(&manifest).unwrap();
    assert_eq!(repacked, data);
}

#[test]
fn scenario_2_lzss_literal_only() {
    let input = [0xFFu8, b'A', b'B', b'C', b'D', b'E', b'F', b'G', b'H'];
    let out = codec::lzss::decode(&input, 8).unwrap();
    assert_eq!(out, b"ABCDEFGH");
}

#[test]
fn scenario_3_xor_keystream() {
    let out = codec::xor::apply(&[0, 0, 0, 0], 0x1234);
    assert_eq!(out[0], 0x7A);
    let restored = codec::xor::apply(&out, 0x1234);
    assert_eq!(restored, [0, 0, 0, 0]);
}

#[test]
fn scenario_4_rsli_trailer_detection() {
    // Build a minimal one-entry RsLi archive, then append (or omit) the
    // trailer and check detection either way.
    let seed = 0xABCDu32;
    let mut header = [0u8; 32];
    header[0..4].copy_from_slice(rsli::MAGIC);
    header[3] = 1;
    header[4..6].copy_from_slice(&1i16.to_le_bytes());
    header[20..24].copy_from_slice(&seed.to_le_bytes());

    let mut row = Vec::new();
    row.extend_from_slice(&[0u8; 12]); // name
    row.extend_from_slice(&[0u8; 4]); // reserved
    row.extend_from_slice(&0i16.to_le_bytes()); // flags: identity
    row.extend_from_slice(&0i16.to_le_bytes()); // sort_to_original
    row.extend_from_slice(&1u32.to_le_bytes()); // unpacked_size
    row.extend_from_slice(&64u32.to_le_bytes()); // data_offset (effective = 64+0x10 with the trailer below)
    row.extend_from_slice(&1u32.to_le_bytes()); // packed_size
    let encrypted = codec::xor::apply(&row, (seed & 0xFFFF) as u16);

    let mut with_trailer = Vec::new();
    with_trailer.extend_from_slice(&header);
    with_trailer.extend_from_slice(&encrypted);
    with_trailer.extend_from_slice(&[0u8; 16]); // data region up to effective offset 80
    with_trailer.push(0xAB); // the one packed byte
    with_trailer.extend_from_slice(b"AO");
    with_trailer.extend_from_slice(&0x10u32.to_le_bytes());

    let manifest = rsli::unpack(&with_trailer, "scenario4.rsl").unwrap();
    assert!(manifest.trailer.present);
    assert_eq!(manifest.trailer.overlay_offset, 0x10);
    assert!(manifest.issues.is_empty());

    let without_trailer = with_trailer[..with_trailer.len() - 6].to_vec();
    let manifest2 = rsli::unpack(&without_trailer, "scenario4b.rsl").unwrap();
    assert!(!manifest2.trailer.present);
}

#[test]
fn scenario_5_fxid_stream() {
    let mut payload = vec![0u8; 0x3C];
    payload[0..4].copy_from_slice(&2u32.to_le_bytes()); // cmd_count
    let mut cmd6 = vec![0u8; 4];
    cmd6[0] = 6;
    let mut cmd5 = vec![0u8; 112];
    cmd5[0] = 5;
    payload.extend_from_slice(&cmd6);
    payload.extend_from_slice(&cmd5);
    assert_eq!(payload.len(), 0xC0);

    let report = fxid::validate(&payload).unwrap();
    assert!(!report.has_errors());
    assert_eq!(report.extras.opcode_histogram.get(&6), Some(&1));
    assert_eq!(report.extras.opcode_histogram.get(&5), Some(&1));
}

#[test]
fn scenario_6_terrain_areal() {
    let mut record = Vec::new();
    record.extend_from_slice(&0f32.to_le_bytes()); // anchor.x
    record.extend_from_slice(&0f32.to_le_bytes()); // anchor.y
    record.extend_from_slice(&0f32.to_le_bytes()); // anchor.z
    record.extend_from_slice(&0u32.to_le_bytes()); // u12
    record.extend_from_slice(&0.5f32.to_le_bytes()); // declared area
    record.extend_from_slice(&0f32.to_le_bytes()); // nx
    record.extend_from_slice(&0f32.to_le_bytes()); // ny
    record.extend_from_slice(&1f32.to_le_bytes()); // nz
    record.extend_from_slice(&[0u8; 16]); // logic_flag, u36, class_id, u44
    record.extend_from_slice(&3u32.to_le_bytes()); // vertex_count
    record.extend_from_slice(&0u32.to_le_bytes()); // poly_count
    assert_eq!(record.len(), 56);

    // vertices (0,0,0) (1,0,0) (0,1,0) -> shoelace area 0.5
    for (x, y) in [(0.0f32, 0.0f32), (1.0, 0.0), (0.0, 1.0)] {
        record.extend_from_slice(&x.to_le_bytes());
        record.extend_from_slice(&y.to_le_bytes());
        record.extend_from_slice(&0f32.to_le_bytes());
    }
    for _ in 0..3 {
        record.extend_from_slice(&(-1i32).to_le_bytes());
        record.extend_from_slice(&(-1i32).to_le_bytes());
    }
    record.extend_from_slice(&1u32.to_le_bytes()); // cells_x
    record.extend_from_slice(&1u32.to_le_bytes()); // cells_y
    record.extend_from_slice(&0u16.to_le_bytes()); // hit_count

    let report = terrain::validate(&record, 1).unwrap();
    assert!(!report.has_errors());
    assert!(report.extras.area_delta_abs_max < 1e-4);
}

#[test]
fn rng_reference_vectors_are_deterministic() {
    let a = rng::vector(0x1234_5678, 16);
    let b = rng::vector(0x1234_5678, 16);
    assert_eq!(a, b);
    assert_eq!(a.len(), 16);
}
