//! Per-entry header records
//!
//! The record shape is a function of the binder version and its magic byte;
//! [`EntryLayout`] captures both and is passed to the binrw implementations
//! as arguments.

use crate::flags;
use binrw::{BinRead, BinResult, BinWrite, Endian};
use std::io::{Read, Seek, Write};

/// Binder container version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinderVersion {
    /// `BND3`, used before Dark Souls II
    V3,
    /// `BND4`, used since Dark Souls II
    V4,
}

impl BinderVersion {
    /// Leading tag bytes
    pub const fn tag(self) -> [u8; 4] {
        match self {
            Self::V3 => *b"BND3",
            Self::V4 => *b"BND4",
        }
    }

    /// Version string used in tags and manifests
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V3 => "BND3",
            Self::V4 => "BND4",
        }
    }

    /// Parse a manifest version string
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "BND3" => Some(Self::V3),
            "BND4" => Some(Self::V4),
            _ => None,
        }
    }
}

impl std::fmt::Display for BinderVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the entry header records of one binder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLayout {
    /// Binder version
    pub version: BinderVersion,
    /// Binder magic byte
    pub magic: u8,
}

impl EntryLayout {
    /// Create a layout for the given version and binder magic
    pub const fn new(version: BinderVersion, magic: u8) -> Self {
        Self { version, magic }
    }

    /// Size in bytes of one record
    pub const fn size(&self) -> usize {
        match self.version {
            BinderVersion::V3 => flags::bnd3_header_size(self.magic),
            BinderVersion::V4 => flags::header_size(self.magic),
        }
    }

    /// Whether records carry an entry ID
    pub const fn has_id(&self) -> bool {
        flags::has_id(self.magic)
    }

    /// Whether records carry a path offset
    pub const fn has_path(&self) -> bool {
        flags::has_path(self.magic)
    }

    /// Whether records carry an uncompressed size
    pub const fn has_uncompressed_size(&self) -> bool {
        flags::has_uncompressed_size(self.magic)
    }
}

/// One entry header record
///
/// Offsets are absolute file offsets once read; the packers fill them in
/// after laying out the path and data regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Per-entry magic byte
    pub entry_magic: u8,
    /// Stored (possibly compressed) payload size
    pub compressed_size: u64,
    /// Uncompressed payload size, when the layout carries one
    pub uncompressed_size: Option<u64>,
    /// Absolute payload offset
    pub data_offset: u64,
    /// Entry ID, when the layout carries one
    pub entry_id: Option<i32>,
    /// Absolute path offset, when the layout carries one
    pub path_offset: Option<u32>,
}

/// BND4 record sentinel
const SENTINEL: i32 = -1;

fn custom_error<S: Seek>(stream: &mut S, message: String) -> binrw::Error {
    binrw::Error::AssertFail {
        pos: stream.stream_position().unwrap_or(0),
        message,
    }
}

fn read_size<R: Read + Seek>(reader: &mut R, value: i64, field: &str) -> BinResult<u64> {
    u64::try_from(value).map_err(|_| custom_error(reader, format!("negative {field}: {value}")))
}

fn write_size<W: Write + Seek>(writer: &mut W, value: u64, field: &str) -> BinResult<i32> {
    i32::try_from(value)
        .map_err(|_| custom_error(writer, format!("{field} {value} does not fit in 32 bits")))
}

impl BinRead for EntryHeader {
    type Args<'a> = EntryLayout;

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        layout: Self::Args<'_>,
    ) -> BinResult<Self> {
        let entry_magic = u8::read_options(reader, endian, ())?;
        let _pad = <[u8; 3]>::read_options(reader, endian, ())?;

        match layout.version {
            BinderVersion::V3 => {
                let compressed = i32::read_options(reader, endian, ())?;
                let compressed_size = read_size(reader, i64::from(compressed), "compressed size")?;
                let offset = i32::read_options(reader, endian, ())?;
                let data_offset = read_size(reader, i64::from(offset), "data offset")?;

                let entry_id = if layout.has_id() {
                    Some(i32::read_options(reader, endian, ())?)
                } else {
                    None
                };
                let path_offset = if layout.has_path() {
                    Some(u32::read_options(reader, endian, ())?)
                } else {
                    None
                };
                let uncompressed_size = if layout.has_uncompressed_size() {
                    let size = i32::read_options(reader, endian, ())?;
                    Some(read_size(reader, i64::from(size), "uncompressed size")?)
                } else {
                    None
                };

                Ok(Self {
                    entry_magic,
                    compressed_size,
                    uncompressed_size,
                    data_offset,
                    entry_id,
                    path_offset,
                })
            }
            BinderVersion::V4 => {
                let sentinel = i32::read_options(reader, endian, ())?;
                if sentinel != SENTINEL {
                    return Err(custom_error(
                        reader,
                        format!("entry header sentinel is {sentinel}, expected -1"),
                    ));
                }
                let compressed = i64::read_options(reader, endian, ())?;
                let compressed_size = read_size(reader, compressed, "compressed size")?;

                let uncompressed_size = if layout.has_uncompressed_size() {
                    let size = i64::read_options(reader, endian, ())?;
                    Some(read_size(reader, size, "uncompressed size")?)
                } else {
                    None
                };
                let data_offset = if flags::has_long_offsets(layout.magic) {
                    u64::read_options(reader, endian, ())?
                } else {
                    u64::from(u32::read_options(reader, endian, ())?)
                };
                let entry_id = if layout.has_id() {
                    Some(i32::read_options(reader, endian, ())?)
                } else {
                    None
                };
                let path_offset = if layout.has_path() {
                    Some(u32::read_options(reader, endian, ())?)
                } else {
                    None
                };
                if layout.magic == flags::NAMES1_ONLY {
                    let _pad = <[u8; 8]>::read_options(reader, endian, ())?;
                }

                Ok(Self {
                    entry_magic,
                    compressed_size,
                    uncompressed_size,
                    data_offset,
                    entry_id,
                    path_offset,
                })
            }
        }
    }
}

impl BinWrite for EntryHeader {
    type Args<'a> = EntryLayout;

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        layout: Self::Args<'_>,
    ) -> BinResult<()> {
        self.entry_magic.write_options(writer, endian, ())?;
        [0u8; 3].write_options(writer, endian, ())?;

        let entry_id = if layout.has_id() {
            Some(
                self.entry_id
                    .ok_or_else(|| custom_error(writer, "missing entry ID".to_string()))?,
            )
        } else {
            None
        };
        let path_offset = if layout.has_path() {
            Some(
                self.path_offset
                    .ok_or_else(|| custom_error(writer, "missing path offset".to_string()))?,
            )
        } else {
            None
        };
        let uncompressed_size = if layout.has_uncompressed_size() {
            Some(self.uncompressed_size.ok_or_else(|| {
                custom_error(writer, "missing uncompressed size".to_string())
            })?)
        } else {
            None
        };

        match layout.version {
            BinderVersion::V3 => {
                write_size(writer, self.compressed_size, "compressed size")?
                    .write_options(writer, endian, ())?;
                write_size(writer, self.data_offset, "data offset")?
                    .write_options(writer, endian, ())?;
                if let Some(id) = entry_id {
                    id.write_options(writer, endian, ())?;
                }
                if let Some(offset) = path_offset {
                    offset.write_options(writer, endian, ())?;
                }
                if let Some(size) = uncompressed_size {
                    write_size(writer, size, "uncompressed size")?
                        .write_options(writer, endian, ())?;
                }
            }
            BinderVersion::V4 => {
                SENTINEL.write_options(writer, endian, ())?;
                self.compressed_size.write_options(writer, endian, ())?;
                if let Some(size) = uncompressed_size {
                    size.write_options(writer, endian, ())?;
                }
                if flags::has_long_offsets(layout.magic) {
                    self.data_offset.write_options(writer, endian, ())?;
                } else {
                    let offset = u32::try_from(self.data_offset).map_err(|_| {
                        custom_error(
                            writer,
                            format!("data offset {} does not fit in 32 bits", self.data_offset),
                        )
                    })?;
                    offset.write_options(writer, endian, ())?;
                }
                if let Some(id) = entry_id {
                    id.write_options(writer, endian, ())?;
                }
                if let Some(offset) = path_offset {
                    offset.write_options(writer, endian, ())?;
                }
                if layout.magic == flags::NAMES1_ONLY {
                    [0u8; 8].write_options(writer, endian, ())?;
                }
            }
        }

        Ok(())
    }
}
