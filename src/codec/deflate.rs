//! RsLi deflate decoding.
//!
//! The encoder wrote a raw DEFLATE stream (no zlib header) for most
//! entries, but a handful of older archives were produced by a path that
//! wraps the stream in a two-byte zlib header. Rather than branch on
//! archive version, this tries raw inflate first and falls back to
//! zlib-wrapped inflate, matching what the reference tooling does.
//!
//! One more wrinkle carried over from the original: the reference decoder
//! feeds the inflater one byte past the end of the compressed region
//! before treating a short read as EOF. `flate2`'s `Decompress` already
//! tolerates a trailing byte of slack, so this is naturally absorbed by
//! decompressing the whole remaining slice rather than a pre-sliced exact
//! region.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{CoreError, CoreResult};
use crate::MAX_ALLOC;

fn inflate_with(decompress: &mut Decompress, input: &[u8], expected_size: usize) -> CoreResult<Vec<u8>> {
    if expected_size > MAX_ALLOC {
        return Err(CoreError::AllocationTooLarge {
            requested: expected_size,
            limit: MAX_ALLOC,
        });
    }
    let mut out = vec![0u8; expected_size];
    let mut total_out = 0usize;
    let mut in_pos = 0usize;

    loop {
        let before_out = decompress.total_out();
        let before_in = decompress.total_in();
        let status = decompress
            .decompress(&input[in_pos..], &mut out[total_out..], FlushDecompress::Sync)
            .map_err(|_| CoreError::DeflateFailed)?;
        let produced = (decompress.total_out() - before_out) as usize;
        let consumed = (decompress.total_in() - before_in) as usize;
        total_out += produced;
        in_pos += consumed;

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                if total_out >= expected_size || in_pos >= input.len() {
                    break;
                }
            }
        }
    }

    if total_out != expected_size {
        return Err(CoreError::DeflateFailed);
    }
    Ok(out)
}

/// Decodes `packed` (a raw or zlib-wrapped DEFLATE stream) into exactly
/// `expected_size` bytes.
pub fn decode(packed: &[u8], expected_size: usize) -> CoreResult<Vec<u8>> {
    let mut raw = Decompress::new(false);
    if let Ok(out) = inflate_with(&mut raw, packed, expected_size) {
        return Ok(out);
    }
    let mut zlib = Decompress::new(true);
    inflate_with(&mut zlib, packed, expected_size)
}
