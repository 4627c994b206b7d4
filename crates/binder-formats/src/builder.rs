//! Builder pattern for creating binders

use crate::binder::{
    Binder, BinderFields, BinderVariant, Bnd3Fields, Bnd4Fields, DEFAULT_BINDER_MAGIC,
};
use crate::dcx::DcxMagic;
use crate::entry::BinderEntry;
use crate::entry_header::BinderVersion;
use crate::error::{BinderError, Result};

/// Builder for creating binders
///
/// # Example
///
/// ```rust
/// use binder_formats::{BinderBuilder, BinderEntry, BinderVersion};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut binder = BinderBuilder::new(BinderVersion::V4)
///     .signature("07D7R6")
///     .magic(0x74)
///     .utf16_paths(true)
///     .hash_table(true)
///     .add_entry(BinderEntry::new(
///         b"payload".to_vec(),
///         Some(0),
///         Some("N:\\data\\file.bin".to_string()),
///     ))
///     .build()?;
/// let bytes = binder.pack()?;
/// assert_eq!(&bytes[..4], b"BND4");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BinderBuilder {
    version: BinderVersion,
    signature: String,
    magic: u8,
    big_endian: bool,
    dcx_magic: Option<DcxMagic>,
    unknown: bool,
    flag1: bool,
    flag2: bool,
    utf16_paths: bool,
    hash_table: bool,
    entries: Vec<BinderEntry>,
}

impl BinderBuilder {
    /// Create a builder for an empty little-endian binder
    pub fn new(version: BinderVersion) -> Self {
        Self {
            version,
            signature: String::new(),
            magic: DEFAULT_BINDER_MAGIC,
            big_endian: false,
            dcx_magic: None,
            unknown: false,
            flag1: false,
            flag2: false,
            utf16_paths: false,
            hash_table: false,
            entries: Vec::new(),
        }
    }

    /// Set the signature (at most 8 bytes)
    #[must_use]
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Set the binder magic
    #[must_use]
    pub const fn magic(mut self, magic: u8) -> Self {
        self.magic = magic;
        self
    }

    /// Use big-endian entry records
    #[must_use]
    pub const fn big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    /// Wrap in a DCX envelope of this family when written to a file
    #[must_use]
    pub const fn dcx_magic(mut self, dcx_magic: DcxMagic) -> Self {
        self.dcx_magic = Some(dcx_magic);
        self
    }

    /// Set the BND3 unknown flag; ignored for BND4
    #[must_use]
    pub const fn unknown(mut self, unknown: bool) -> Self {
        self.unknown = unknown;
        self
    }

    /// Set the BND4 unknown flags; ignored for BND3
    #[must_use]
    pub const fn bnd4_flags(mut self, flag1: bool, flag2: bool) -> Self {
        self.flag1 = flag1;
        self.flag2 = flag2;
        self
    }

    /// Store BND4 paths as UTF-16; ignored for BND3
    #[must_use]
    pub const fn utf16_paths(mut self, utf16_paths: bool) -> Self {
        self.utf16_paths = utf16_paths;
        self
    }

    /// Emit a BND4 path hash table; ignored for BND3
    #[must_use]
    pub const fn hash_table(mut self, hash_table: bool) -> Self {
        self.hash_table = hash_table;
        self
    }

    /// Add an entry
    #[must_use]
    pub fn add_entry(mut self, entry: BinderEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Build the binder
    ///
    /// Fails on an over-long signature or a bit-identical duplicate entry.
    pub fn build(self) -> Result<Binder> {
        if self.signature.len() > 8 {
            return Err(BinderError::SignatureTooLong(self.signature));
        }

        let variant = match self.version {
            BinderVersion::V3 => BinderVariant::V3(Bnd3Fields {
                unknown: self.unknown,
            }),
            BinderVersion::V4 => BinderVariant::V4(Bnd4Fields {
                flag1: self.flag1,
                flag2: self.flag2,
                utf16_paths: self.utf16_paths,
                hash_table_type: if self.hash_table {
                    crate::bnd4::HASH_TABLE_TYPE_PRESENT
                } else {
                    0
                },
                hash_table_offset: 0,
                hash_table_cache: None,
            }),
        };

        let mut binder = Binder::from_fields(
            BinderFields {
                signature: self.signature,
                magic: self.magic,
                big_endian: self.big_endian,
                dcx_magic: self.dcx_magic,
            },
            variant,
        );
        for entry in self.entries {
            binder.add_entry(entry)?;
        }
        Ok(binder)
    }
}

impl Default for BinderBuilder {
    fn default() -> Self {
        Self::new(BinderVersion::V4)
    }
}
