//! FXID effect validator: an opcode-driven fixed-size command stream
//! starting at offset `0x3C`, per spec.md §3.5 / §4.F.

use std::collections::BTreeMap;
use std::io::Cursor;

use binrw::{binrw, BinRead};
use serde::{Deserialize, Serialize};

use crate::bytes::read_u32_at;
use crate::error::{CoreError, CoreResult, Issue, ValidationReport};

const COMMANDS_START: usize = 0x3C;

#[binrw]
#[derive(Debug, Clone)]
struct CommandHeaderRaw {
    word: u32,
}

/// The opcode-1 command body: a fixed 224-byte record once past the
/// shared 4-byte header. `unk` is read but not interpreted; `tail6` and
/// the optional archive/name pair are the only fields the audit samples.
#[binrw]
#[derive(Debug, Clone)]
struct Op1CommandRaw {
    header: u32,
    unk: [u8; 132],
    tail6: [u32; 6],
    opt_archive: [u8; 32],
    opt_name: [u8; 32],
}

fn cmd_size(opcode: u8) -> Option<usize> {
    match opcode {
        1 => Some(224),
        2 => Some(148),
        3 => Some(200),
        4 => Some(204),
        5 => Some(112),
        6 => Some(4),
        7 => Some(208),
        8 => Some(248),
        9 => Some(208),
        10 => Some(208),
        _ => None,
    }
}

/// A sampled non-empty opcode-1 tail/optional-reference occurrence,
/// capped at 16 entries like the reference audit tool — this is
/// instrumentation, not a correctness check, so the fields whose meaning
/// is unknown upstream stay as opaque extras rather than typed data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Op1Tail6Sample {
    pub cmd_index: usize,
    pub tail6_u32_hex: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Op1OptRefSample {
    pub cmd_index: usize,
    pub opt_archive: String,
    pub opt_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FxidExtras {
    pub opcode_histogram: BTreeMap<u8, u64>,
    pub op1_tail6_samples: Vec<Op1Tail6Sample>,
    pub op1_optref_samples: Vec<Op1OptRefSample>,
}

fn cstr32(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    crate::bytes::decode_latin1(&field[..end])
}

/// Validates an FXID payload's command stream, counting opcode
/// occurrences and sampling opcode-1 extras along the way.
pub fn validate(payload: &[u8]) -> CoreResult<ValidationReport<FxidExtras>> {
    if payload.len() < 60 {
        return Err(CoreError::Truncated {
            where_: "fxid.payload",
            need: 60,
            have: payload.len(),
        });
    }

    let mut issues = Vec::new();
    let mut extras = FxidExtras::default();
    let cmd_count = read_u32_at(payload, 0)?;
    let mut ptr = COMMANDS_START;

    for idx in 0..cmd_count as usize {
        if ptr + 4 > payload.len() {
            issues.push(Issue::error("fxid.command", "effect", format!("command {idx}: missing header at offset={ptr}")));
            break;
        }
        let header = CommandHeaderRaw::read_le(&mut Cursor::new(&payload[ptr..ptr + 4]))?;
        let opcode = (header.word & 0xFF) as u8;
        let Some(size) = cmd_size(opcode) else {
            return Err(CoreError::UnknownFxidOpcode(opcode));
        };
        if ptr + size > payload.len() {
            issues.push(Issue::error("fxid.command", "effect", format!("command {idx}: truncated end={}, payload={}", ptr + size, payload.len())));
            break;
        }

        *extras.opcode_histogram.entry(opcode).or_insert(0) += 1;

        if opcode == 1 {
            let cmd = Op1CommandRaw::read_le(&mut Cursor::new(&payload[ptr..ptr + size]))?;
            if cmd.tail6.iter().any(|&w| w != 0) && extras.op1_tail6_samples.len() < 16 {
                let dwords: Vec<String> = cmd.tail6.iter().map(|w| format!("0x{w:08X}")).collect();
                extras.op1_tail6_samples.push(Op1Tail6Sample { cmd_index: idx, tail6_u32_hex: dwords });
            }

            let archive_s = cstr32(&cmd.opt_archive);
            let name_s = cstr32(&cmd.opt_name);
            if (!archive_s.is_empty() || !name_s.is_empty()) && extras.op1_optref_samples.len() < 16 {
                extras.op1_optref_samples.push(Op1OptRefSample {
                    cmd_index: idx,
                    opt_archive: archive_s,
                    opt_name: name_s,
                });
            }
        }

        ptr += size;
    }

    if ptr != payload.len() && issues.is_empty() {
        issues.push(Issue::error("fxid.command", "effect", format!("tail bytes after command stream: parsed_end={ptr}, payload={}", payload.len())));
    }

    let mut summary = BTreeMap::new();
    summary.insert("commands".to_string(), cmd_count as u64);

    Ok(ValidationReport { summary, issues, extras })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(cmds: &[(u8, usize)]) -> Vec<u8> {
        let total: usize = cmds.iter().map(|(_, s)| s).sum();
        let mut out = vec![0u8; COMMANDS_START + total];
        out[0..4].copy_from_slice(&(cmds.len() as u32).to_le_bytes());
        let mut ptr = COMMANDS_START;
        for &(opcode, size) in cmds {
            out[ptr..ptr + 4].copy_from_slice(&(opcode as u32).to_le_bytes());
            ptr += size;
        }
        out
    }

    #[test]
    fn opcode_6_stream_is_clean() {
        let data = build(&[(6, 4), (6, 4), (6, 4)]);
        let report = validate(&data).unwrap();
        assert!(!report.has_errors());
        assert_eq!(report.extras.opcode_histogram.get(&6), Some(&3));
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let data = build(&[(77, 224)]);
        assert!(matches!(validate(&data), Err(CoreError::UnknownFxidOpcode(77))));
    }

    #[test]
    fn trailing_bytes_after_stream_is_an_error() {
        let mut data = build(&[(6, 4)]);
        data.extend_from_slice(&[0u8; 8]);
        let report = validate(&data).unwrap();
        assert!(report.has_errors());
    }
}
