//! # relicpack
//! `relicpack` is the codec layer for the `NRes`/`RsLi` asset archive
//! containers used by a late-1990s 3D engine, plus validators for the
//! model (`MSH`), texture (`Texm`), effect (`FXID`), and terrain
//! (`Land.map`) payloads those archives carry.
//!
//! The crate is pure and synchronous: every entry point takes a borrowed
//! byte slice and returns an owned, `serde`-serializable result. Nothing
//! here touches the filesystem, spawns a thread, or walks a directory —
//! that is a host concern, not this crate's.
//!
//! # Getting started
//! Detect a container's format from its first four bytes with
//! [`Signature::detect`], then hand the whole blob to [`nres::unpack`] or
//! [`rsli::unpack`] to get a manifest plus every entry payload:
//!
//! ```rust no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("characters.nres")?;
//! match relicpack::Signature::detect(&data) {
//!     Some(relicpack::Signature::NRes) => {
//!         let manifest = relicpack::nres::unpack(&data, "characters.nres")?;
//!         println!("{} entries", manifest.entries.len());
//!     }
//!     Some(relicpack::Signature::RsLi) => {
//!         let manifest = relicpack::rsli::unpack(&data, "characters.rsl")?;
//!         println!("{} entries", manifest.entries.len());
//!     }
//!     None => eprintln!("not a recognized container"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Once an entry's payload is sliced out of a manifest, hand it to the
//! matching semantic validator ([`msh::validate`], [`texm::validate`],
//! [`fxid::validate`], [`terrain::validate_map_nres`]) to check it against
//! the format's cross-table invariants.

pub mod bytes;
pub mod codec;
pub mod error;
pub mod fxid;
pub mod msh;
pub mod nres;
pub mod rng;
pub mod rsli;
pub mod terrain;
pub mod texm;
mod write;

/// Upper bound on any single allocation driven by an untrusted
/// length/count field (`unpacked_size`, `rect_count`, a terrain cell's
/// `hit_count`, ...). Callers working with archives from an unknown or
/// adversarial source should treat [`error::CoreError::AllocationTooLarge`]
/// as expected, not exceptional.
pub(crate) const MAX_ALLOC: usize = 64 * 1024 * 1024;

/// The two archive container formats this crate recognizes by their
/// leading magic bytes, per spec.md §6.1. File extensions are advisory
/// only — this is the authoritative check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    NRes,
    RsLi,
}

impl Signature {
    /// Inspects the first four bytes of `data` and returns the container
    /// format they name, or `None` if neither magic matches.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }
        match &data[0..4] {
            b"NRes" => Some(Signature::NRes),
            b"NL\x00\x01" => Some(Signature::RsLi),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_nres_magic() {
        assert_eq!(Signature::detect(b"NRes\0\0\0\0"), Some(Signature::NRes));
    }

    #[test]
    fn detects_rsli_magic() {
        assert_eq!(Signature::detect(b"NL\x00\x01\0\0\0\0"), Some(Signature::RsLi));
    }

    #[test]
    fn unknown_magic_is_none() {
        assert_eq!(Signature::detect(b"xxxx"), None);
    }

    #[test]
    fn short_input_is_none() {
        assert_eq!(Signature::detect(b"NR"), None);
    }
}
