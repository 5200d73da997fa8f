//! Byte primitives: fixed-endian bounds-checked reads over a borrowed slice,
//! plus the small helpers every container/validator needs (sha256 digest,
//! filesystem-safe name sanitizing).

use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};

/// A cursor over a borrowed byte slice with bounds-checked little-endian
/// reads. `label` identifies the format being parsed for error context;
/// it is never allocated, just a `&'static str` supplied by the caller.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    label: &'static str,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], label: &'static str) -> Self {
        Self { data, pos: 0, label }
    }

    pub fn at(data: &'a [u8], pos: usize, label: &'static str) -> Self {
        Self { data, pos, label }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn need(&self, n: usize) -> CoreResult<()> {
        if self.pos + n > self.data.len() {
            return Err(CoreError::Truncated {
                where_: self.label,
                need: n,
                have: self.data.len().saturating_sub(self.pos),
            });
        }
        Ok(())
    }

    pub fn slice(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        self.need(len)?;
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn peek_slice(&self, len: usize) -> CoreResult<&'a [u8]> {
        self.need(len)?;
        Ok(&self.data[self.pos..self.pos + len])
    }

    pub fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.slice(1)?[0])
    }

    pub fn u16(&mut self) -> CoreResult<u16> {
        let s = self.slice(2)?;
        Ok(u16::from_le_bytes([s[0], s[1]]))
    }

    pub fn i16(&mut self) -> CoreResult<i16> {
        Ok(self.u16()? as i16)
    }

    pub fn u32(&mut self) -> CoreResult<u32> {
        let s = self.slice(4)?;
        Ok(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
    }

    pub fn i32(&mut self) -> CoreResult<i32> {
        Ok(self.u32()? as i32)
    }

    pub fn f32(&mut self) -> CoreResult<f32> {
        Ok(f32::from_bits(self.u32()?))
    }
}

/// Reads a little-endian `u32` out of `data` at `offset` without a cursor,
/// for call sites that already validated bounds (e.g. a stride-checked
/// record array) and just want a terse accessor.
pub fn read_u32_at(data: &[u8], offset: usize) -> CoreResult<u32> {
    let s = data
        .get(offset..offset + 4)
        .ok_or(CoreError::Truncated { where_: "read_u32_at", need: 4, have: data.len().saturating_sub(offset) })?;
    Ok(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

pub fn read_u16_at(data: &[u8], offset: usize) -> CoreResult<u16> {
    let s = data
        .get(offset..offset + 2)
        .ok_or(CoreError::Truncated { where_: "read_u16_at", need: 2, have: data.len().saturating_sub(offset) })?;
    Ok(u16::from_le_bytes([s[0], s[1]]))
}

pub fn read_f32_at(data: &[u8], offset: usize) -> CoreResult<f32> {
    Ok(f32::from_bits(read_u32_at(data, offset)?))
}

/// SHA-256 of `data`, lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Maps arbitrary bytes to a filesystem-safe path component: runs of
/// anything outside `[A-Za-z0-9._-]` collapse to a single `_`, leading and
/// trailing `._-` are trimmed, and an empty result falls back to
/// `fallback`, truncated to `max_len` bytes.
pub fn safe_component(name: &str, fallback: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sub = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || ch == '-' {
            out.push(ch);
            last_was_sub = false;
        } else if !last_was_sub {
            out.push('_');
            last_was_sub = true;
        }
    }
    let trimmed = out.trim_matches(|c| c == '.' || c == '_' || c == '-');
    let mut result = if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    };
    result.truncate(max_len);
    if result.is_empty() {
        result = fallback.to_string();
    }
    result
}

/// Decodes a raw byte buffer the way the original tooling does: every byte
/// maps 1:1 to a Unicode scalar (Latin-1 superset), so this never fails and
/// never loses information — used for archive entry names, which are not
/// guaranteed to be valid UTF-8.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Splits `raw` at the first NUL byte (or its full length if none), the
/// convention used by every fixed-width name field in these containers.
pub fn name_bytes(raw: &[u8]) -> &[u8] {
    match raw.iter().position(|&b| b == 0) {
        Some(idx) => &raw[..idx],
        None => raw,
    }
}
