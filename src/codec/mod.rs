//! Payload codecs used by the RsLi container: the obfuscation keystream,
//! the LZSS variant, and DEFLATE, plus the method dispatch that picks
//! among them per spec.md §3.2.

pub mod deflate;
pub mod lzss;
pub mod xor;

use crate::error::{CoreError, CoreResult};

/// The five RsLi payload methods, keyed by the masked bits of
/// `flags_signed` (`flags & 0x1E0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Identity,
    Xor,
    Lzss,
    XorLzss,
    Deflate,
}

impl Method {
    pub fn from_tag(tag: u16) -> CoreResult<Self> {
        match tag {
            0x000 => Ok(Method::Identity),
            0x020 => Ok(Method::Xor),
            0x040 => Ok(Method::Lzss),
            0x060 => Ok(Method::XorLzss),
            0x100 => Ok(Method::Deflate),
            other => Err(CoreError::UnknownRsliMethod(other)),
        }
    }
}

/// Decodes `packed` per `method`, using `key16` for the methods that need
/// the keystream and `unpacked_size` to size (and, for raw/xor, validate)
/// the output.
pub fn decode(packed: &[u8], method: Method, key16: u16, unpacked_size: usize) -> CoreResult<Vec<u8>> {
    let out = match method {
        Method::Identity => packed.to_vec(),
        Method::Xor => {
            if packed.len() < unpacked_size {
                return Err(CoreError::Truncated {
                    where_: "rsli.xor_payload",
                    need: unpacked_size,
                    have: packed.len(),
                });
            }
            xor::apply(&packed[..unpacked_size], key16)
        }
        Method::Lzss => lzss::decode(packed, unpacked_size)?,
        Method::XorLzss => {
            let unxored = xor::apply(packed, key16);
            lzss::decode(&unxored, unpacked_size)?
        }
        Method::Deflate => deflate::decode(packed, unpacked_size)?,
    };

    if out.len() != unpacked_size {
        return Err(CoreError::UnpackedSizeMismatch {
            expected: unpacked_size,
            got: out.len(),
        });
    }
    Ok(out)
}
