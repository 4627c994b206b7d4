//! Entry path text encodings

use crate::error::{BinderError, Result};
use encoding_rs::SHIFT_JIS;

/// Text encoding of the path table
///
/// BND3 always uses Shift-JIS. BND4 uses UTF-16 in the binder's byte order
/// when its `utf16_paths` flag is set, Shift-JIS otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathEncoding {
    /// Shift-JIS, single NUL terminator
    ShiftJis,
    /// UTF-16 little-endian, two-byte NUL terminator
    Utf16Le,
    /// UTF-16 big-endian, two-byte NUL terminator
    Utf16Be,
}

impl PathEncoding {
    /// Select the BND4 path encoding from its header flags
    pub const fn for_bnd4(utf16_paths: bool, big_endian: bool) -> Self {
        match (utf16_paths, big_endian) {
            (false, _) => Self::ShiftJis,
            (true, false) => Self::Utf16Le,
            (true, true) => Self::Utf16Be,
        }
    }

    /// Encode a path and append its NUL terminator
    pub fn encode(self, path: &str) -> Result<Vec<u8>> {
        match self {
            Self::ShiftJis => {
                let (bytes, _, had_errors) = SHIFT_JIS.encode(path);
                if had_errors {
                    return Err(BinderError::PathEncoding(format!(
                        "{path:?} cannot be represented in Shift-JIS"
                    )));
                }
                let mut encoded = bytes.into_owned();
                encoded.push(0);
                Ok(encoded)
            }
            Self::Utf16Le | Self::Utf16Be => {
                let mut encoded = Vec::with_capacity(path.len() * 2 + 2);
                for unit in path.encode_utf16().chain(std::iter::once(0)) {
                    let bytes = if self == Self::Utf16Le {
                        unit.to_le_bytes()
                    } else {
                        unit.to_be_bytes()
                    };
                    encoded.extend_from_slice(&bytes);
                }
                Ok(encoded)
            }
        }
    }

    /// Decode the NUL-terminated path starting at `offset` in `buffer`
    pub fn decode_at(self, buffer: &[u8], offset: usize) -> Result<String> {
        let tail = buffer.get(offset..).ok_or(BinderError::Truncated {
            what: "entry path",
            offset: offset as u64,
            length: 1,
        })?;

        match self {
            Self::ShiftJis => {
                let end = tail
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| unterminated(offset))?;
                let (text, had_errors) =
                    SHIFT_JIS.decode_without_bom_handling(&tail[..end]);
                if had_errors {
                    return Err(BinderError::PathEncoding(format!(
                        "invalid Shift-JIS path at offset {offset}"
                    )));
                }
                Ok(text.into_owned())
            }
            Self::Utf16Le | Self::Utf16Be => {
                let mut units = Vec::new();
                let mut terminated = false;
                for pair in tail.chunks_exact(2) {
                    let bytes = [pair[0], pair[1]];
                    let unit = if self == Self::Utf16Le {
                        u16::from_le_bytes(bytes)
                    } else {
                        u16::from_be_bytes(bytes)
                    };
                    if unit == 0 {
                        terminated = true;
                        break;
                    }
                    units.push(unit);
                }
                if !terminated {
                    return Err(unterminated(offset));
                }
                String::from_utf16(&units).map_err(|e| {
                    BinderError::PathEncoding(format!(
                        "invalid UTF-16 path at offset {offset}: {e}"
                    ))
                })
            }
        }
    }
}

fn unterminated(offset: usize) -> BinderError {
    BinderError::PathEncoding(format!("unterminated path at offset {offset}"))
}
