//! DCX envelope seam
//!
//! Binders are often shipped wrapped in a DCX compression envelope. The
//! envelope codecs live outside this crate; callers plug one in through
//! [`DcxCodec`] and the binder remembers which [`DcxMagic`] to restore.

use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// First four bytes of every DCX envelope
pub const DCX_TAG: [u8; 4] = *b"DCX\0";

/// Pair of magic values identifying a DCX compression family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DcxMagic(pub i32, pub i32);

/// True when `data` starts with a DCX envelope tag
pub fn is_dcx(data: &[u8]) -> bool {
    data.starts_with(&DCX_TAG)
}

/// DCX envelope codec supplied by the caller
pub trait DcxCodec {
    /// Unwrap an envelope, returning the inner bytes and its magic
    fn decompress(&self, data: &[u8]) -> Result<(Vec<u8>, DcxMagic)>;

    /// Wrap `data` in an envelope of the given family
    fn compress(&self, data: &[u8], magic: DcxMagic) -> Result<Vec<u8>>;
}

/// Manifest form of an optional [`DcxMagic`]: `[]` or `[a, b]`
pub(crate) mod manifest_form {
    use super::{DcxMagic, Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        magic: &Option<DcxMagic>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let values: Vec<i32> = magic.map(|DcxMagic(a, b)| vec![a, b]).unwrap_or_default();
        values.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DcxMagic>, D::Error> {
        let values = Vec::<i32>::deserialize(deserializer)?;
        match values.as_slice() {
            [] => Ok(None),
            [a, b] => Ok(Some(DcxMagic(*a, *b))),
            other => Err(serde::de::Error::invalid_length(
                other.len(),
                &"an empty list or two DCX magic values",
            )),
        }
    }
}
