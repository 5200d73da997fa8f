//! Crate-wide error and issue types.
//!
//! Two tiers, matching the failure model of the formats this crate parses:
//! structural errors abort the current container or payload ([`CoreError`]);
//! spec-deviation issues accumulate without aborting ([`Issue`]).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A structural parse/pack failure. Carries enough context to report the
/// offending location without walking back through the call stack.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{where_}: bad magic (expected {expected:?}, found {found:?})")]
    BadMagic {
        where_: &'static str,
        expected: Vec<u8>,
        found: Vec<u8>,
    },

    #[error("{where_}: truncated (need {need} bytes, have {have})")]
    Truncated {
        where_: &'static str,
        need: usize,
        have: usize,
    },

    #[error("directory out of bounds: offset={offset}, entry_count={entry_count}, file_size={file_size}")]
    DirectoryBounds {
        offset: i64,
        entry_count: u32,
        file_size: usize,
    },

    #[error("LZSS size mismatch: expected {expected}, got {got}")]
    LzssSizeMismatch { expected: usize, got: usize },

    #[error("unpacked_size mismatch: expected {expected}, got {got}")]
    UnpackedSizeMismatch { expected: usize, got: usize },

    #[error("unsupported RsLi method 0x{0:03X}")]
    UnknownRsliMethod(u16),

    #[error("unknown FXID opcode {0}")]
    UnknownFxidOpcode(u8),

    #[error("unsupported Texm format code {0}")]
    UnsupportedTexmFormat(u32),

    #[error("pack overflow writing {what} at {at}: value {value} does not fit")]
    PackOverflow {
        what: &'static str,
        at: usize,
        value: i64,
    },

    #[error("packed data conflict at offset {offset}: bytes differ from a prior write")]
    PackConflict { offset: usize },

    #[error("requested allocation of {requested} bytes exceeds limit of {limit}")]
    AllocationTooLarge { requested: usize, limit: usize },

    #[error("deflate stream could not be decoded as raw or zlib-wrapped")]
    DeflateFailed,

    #[error(transparent)]
    BinRw(#[from] binrw::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Severity of an accumulated, non-aborting deviation from the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single accumulated issue, per spec.md §6.3 / §7 tier 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub category: &'static str,
    pub resource: String,
    pub entry: Option<String>,
    pub message: String,
}

impl Issue {
    pub fn error(category: &'static str, resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category,
            resource: resource.into(),
            entry: None,
            message: message.into(),
        }
    }

    pub fn warning(category: &'static str, resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category,
            resource: resource.into(),
            entry: None,
            message: message.into(),
        }
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }
}

/// `{summary, issues, extras}` shape used by the semantic validators (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationReport<Extras> {
    pub summary: std::collections::BTreeMap<String, u64>,
    pub issues: Vec<Issue>,
    pub extras: Extras,
}

impl<Extras> ValidationReport<Extras> {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }
}
