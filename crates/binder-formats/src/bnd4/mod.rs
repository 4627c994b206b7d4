//! BND4 binders, used since Dark Souls II
//!
//! ```text
//! header (64 bytes):
//!   "BND4", flag1: u8, flag2: u8, pad[2], endian marker: i32 (little-endian)
//!   entry_count: i32, header_size: i64 = 64, signature[8],
//!   entry_header_size: i64, data_offset: i64, utf16_paths: u8, magic: u8,
//!   hash_table_type: u8, pad[5], hash_table_offset: i64
//! entry headers: see [`EntryLayout`]
//! path table:    Shift-JIS or UTF-16, NUL-terminated
//! hash table:    only when hash_table_type == 4
//! entry data:    each payload preceded by ten zero bytes
//! ```

pub mod hash_table;

use crate::binder::{Binder, BinderFields, BinderVariant, Bnd4Fields, HashTableCache};
use crate::bnd3::{
    absolute_path_offset, decode_signature, encode_signature, path_offset_overflow,
};
use crate::entry::BinderEntry;
use crate::entry_header::{BinderVersion, EntryHeader, EntryLayout};
use crate::error::{BinderError, Result};
use crate::flags;
use crate::path_encoding::PathEncoding;
use binrw::{BinRead, BinResult, BinWrite, Endian, io::Cursor};
use std::io::{Read, Seek, Write};
use tracing::{debug, warn};

pub use hash_table::{HashTable, build_hash_table, path_hash};

/// BND4 header size in bytes
pub const BND4_HEADER_SIZE: u64 = 64;

/// Hash table type that places a path hash table before the entry data
pub const HASH_TABLE_TYPE_PRESENT: u8 = 4;

/// Zero bytes written before each entry payload
pub const ENTRY_DATA_PADDING: usize = 10;

/// Endian marker for little-endian binders
const LITTLE_ENDIAN_MARKER: i32 = 0x0001_0000;

/// Endian marker for big-endian binders
const BIG_ENDIAN_MARKER: i32 = 0x0000_0100;

/// BND4 file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bnd4Header {
    /// Unknown flag
    pub flag1: bool,
    /// Unknown flag
    pub flag2: bool,
    /// Byte order of everything after the fixed prefix
    pub big_endian: bool,
    /// Number of entries
    pub entry_count: u32,
    /// Free-form signature, NUL padding stripped
    pub signature: String,
    /// Declared size of one entry header
    pub entry_header_size: u64,
    /// Offset of the first byte after the hash table
    pub data_offset: u64,
    /// Paths are UTF-16 instead of Shift-JIS
    pub utf16_paths: bool,
    /// Binder magic
    pub magic: u8,
    /// 0 for none, 4 for a hash table; 1 and 128 also appear
    pub hash_table_type: u8,
    /// Hash table offset, zero without a table
    pub hash_table_offset: u64,
}

impl Bnd4Header {
    /// binrw endian for everything after the fixed prefix
    pub const fn endian(&self) -> Endian {
        if self.big_endian {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

impl BinRead for Bnd4Header {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let tag = <[u8; 4]>::read_options(reader, Endian::Little, ())?;
        if tag != BinderVersion::V4.tag() {
            return Err(binrw::Error::BadMagic {
                pos: 0,
                found: Box::new(tag),
            });
        }
        let flag1 = u8::read_options(reader, Endian::Little, ())? != 0;
        let flag2 = u8::read_options(reader, Endian::Little, ())? != 0;
        let _pad = <[u8; 2]>::read_options(reader, Endian::Little, ())?;
        let big_endian = i32::read_options(reader, Endian::Little, ())? == BIG_ENDIAN_MARKER;

        let endian = if big_endian { Endian::Big } else { Endian::Little };
        let entry_count = u32::read_options(reader, endian, ())?;
        let header_size = u64::read_options(reader, endian, ())?;
        if header_size != BND4_HEADER_SIZE {
            return Err(binrw::Error::AssertFail {
                pos: reader.stream_position().unwrap_or(0),
                message: format!("BND4 header size is {header_size}, expected 64"),
            });
        }
        let signature_bytes = <[u8; 8]>::read_options(reader, endian, ())?;
        let signature = decode_signature(reader, &signature_bytes)?;
        let entry_header_size = u64::read_options(reader, endian, ())?;
        let data_offset = u64::read_options(reader, endian, ())?;
        let utf16_paths = u8::read_options(reader, endian, ())? != 0;
        let magic = u8::read_options(reader, endian, ())?;
        let hash_table_type = u8::read_options(reader, endian, ())?;
        let _pad = <[u8; 5]>::read_options(reader, endian, ())?;
        let hash_table_offset = u64::read_options(reader, endian, ())?;

        Ok(Self {
            flag1,
            flag2,
            big_endian,
            entry_count,
            signature,
            entry_header_size,
            data_offset,
            utf16_paths,
            magic,
            hash_table_type,
            hash_table_offset,
        })
    }
}

impl BinWrite for Bnd4Header {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        BinderVersion::V4
            .tag()
            .write_options(writer, Endian::Little, ())?;
        u8::from(self.flag1).write_options(writer, Endian::Little, ())?;
        u8::from(self.flag2).write_options(writer, Endian::Little, ())?;
        [0u8; 2].write_options(writer, Endian::Little, ())?;
        let marker = if self.big_endian {
            BIG_ENDIAN_MARKER
        } else {
            LITTLE_ENDIAN_MARKER
        };
        marker.write_options(writer, Endian::Little, ())?;

        let endian = self.endian();
        self.entry_count.write_options(writer, endian, ())?;
        BND4_HEADER_SIZE.write_options(writer, endian, ())?;
        encode_signature(writer, &self.signature)?.write_options(writer, endian, ())?;
        self.entry_header_size.write_options(writer, endian, ())?;
        self.data_offset.write_options(writer, endian, ())?;
        u8::from(self.utf16_paths).write_options(writer, endian, ())?;
        self.magic.write_options(writer, endian, ())?;
        self.hash_table_type.write_options(writer, endian, ())?;
        [0u8; 5].write_options(writer, endian, ())?;
        self.hash_table_offset.write_options(writer, endian, ())?;
        Ok(())
    }
}

// Byte order is chosen by the header itself
impl binrw::meta::ReadEndian for Bnd4Header {
    const ENDIAN: binrw::meta::EndianKind = binrw::meta::EndianKind::None;
}

impl binrw::meta::WriteEndian for Bnd4Header {
    const ENDIAN: binrw::meta::EndianKind = binrw::meta::EndianKind::None;
}

/// Unpack a BND4 binder
pub fn unpack(data: &[u8]) -> Result<Binder> {
    let tag = data.get(..4).unwrap_or(data);
    if tag != BinderVersion::V4.tag() {
        return Err(BinderError::FormatMismatch {
            expected: BinderVersion::V4.as_str(),
            found: String::from_utf8_lossy(tag).into_owned(),
        });
    }

    let mut cursor = Cursor::new(data);
    let header = Bnd4Header::read(&mut cursor)?;

    let expected = flags::header_size(header.magic) as u64;
    if header.entry_header_size != expected {
        return Err(BinderError::HeaderSizeMismatch {
            magic: header.magic,
            expected,
            actual: header.entry_header_size,
        });
    }
    if header.hash_table_type != HASH_TABLE_TYPE_PRESENT && header.hash_table_offset != 0 {
        warn!(
            hash_table_offset = header.hash_table_offset,
            hash_table_type = header.hash_table_type,
            "Found non-zero hash table offset, but header says this BND has no hash table"
        );
    }

    let layout = EntryLayout::new(BinderVersion::V4, header.magic);
    let path_encoding = PathEncoding::for_bnd4(header.utf16_paths, header.big_endian);
    let entries = BinderEntry::unpack_many(
        &mut cursor,
        header.endian(),
        layout,
        path_encoding,
        header.entry_count as usize,
    )?;

    let hash_table_cache = if header.hash_table_type == HASH_TABLE_TYPE_PRESENT {
        let bytes = usize::try_from(header.hash_table_offset)
            .ok()
            .zip(usize::try_from(header.data_offset).ok())
            .and_then(|(start, end)| data.get(start..end))
            .ok_or(BinderError::Truncated {
                what: "hash table",
                offset: header.hash_table_offset,
                length: header.data_offset.saturating_sub(header.hash_table_offset),
            })?;
        Some(HashTableCache::capture(bytes.to_vec(), &entries))
    } else {
        None
    };

    let mut binder = Binder::from_fields(
        BinderFields {
            signature: header.signature.clone(),
            magic: header.magic,
            big_endian: header.big_endian,
            dcx_magic: None,
        },
        BinderVariant::V4(Bnd4Fields {
            flag1: header.flag1,
            flag2: header.flag2,
            utf16_paths: header.utf16_paths,
            hash_table_type: header.hash_table_type,
            hash_table_offset: header.hash_table_offset,
            hash_table_cache,
        }),
    );
    for entry in entries {
        binder.add_entry(entry)?;
    }
    Ok(binder)
}

/// Pack a BND4 binder
///
/// Entries keep their binder order. The cached hash table is reused when the
/// entry count and every path still match its snapshot; otherwise it is
/// rebuilt. Either way the cache afterwards describes the emitted table.
pub fn pack(fields: &BinderFields, v4: &mut Bnd4Fields, entries: &[BinderEntry]) -> Result<Vec<u8>> {
    let endian = if fields.big_endian {
        Endian::Big
    } else {
        Endian::Little
    };
    let layout = EntryLayout::new(BinderVersion::V4, fields.magic);
    let path_encoding = PathEncoding::for_bnd4(v4.utf16_paths, fields.big_endian);

    let mut headers = Vec::with_capacity(entries.len());
    let mut packed_paths = Vec::new();
    let mut packed_data = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        packed_data.extend_from_slice(&[0u8; ENTRY_DATA_PADDING]);

        let entry_id = if layout.has_id() {
            Some(entry.id.ok_or(BinderError::MissingEntryId(index))?)
        } else {
            None
        };
        let path_offset = if layout.has_path() {
            let offset = u32::try_from(packed_paths.len())
                .map_err(|_| path_offset_overflow(packed_paths.len() as u64))?;
            packed_paths.extend(entry.packed_path(path_encoding)?);
            Some(offset)
        } else {
            None
        };

        let data_offset = packed_data.len() as u64;
        let (data, _) = entry.data_for_pack()?;
        headers.push(EntryHeader {
            entry_magic: entry.magic,
            compressed_size: data.len() as u64,
            uncompressed_size: layout
                .has_uncompressed_size()
                .then_some(entry.data_size() as u64),
            data_offset,
            entry_id,
            path_offset,
        });
        packed_data.extend(data);
    }

    let entry_header_table_offset = BND4_HEADER_SIZE;
    let path_table_offset =
        entry_header_table_offset + (layout.size() * headers.len()) as u64;
    let after_paths = path_table_offset + packed_paths.len() as u64;

    let (hash_table_offset, packed_hash_table) = if v4.hash_table_type == HASH_TABLE_TYPE_PRESENT
    {
        let table = match v4.hash_table_cache.as_ref() {
            Some(cache) if !cache.is_stale(entries) => {
                debug!("reusing cached BND4 hash table");
                cache.bytes.clone()
            }
            _ => build_hash_table(entries)?,
        };
        v4.hash_table_cache = Some(HashTableCache::capture(table.clone(), entries));
        (after_paths, table)
    } else {
        (0, Vec::new())
    };
    let data_offset = after_paths + packed_hash_table.len() as u64;

    let header = Bnd4Header {
        flag1: v4.flag1,
        flag2: v4.flag2,
        big_endian: fields.big_endian,
        entry_count: headers.len() as u32,
        signature: fields.signature.clone(),
        entry_header_size: layout.size() as u64,
        data_offset,
        utf16_paths: v4.utf16_paths,
        magic: fields.magic,
        hash_table_type: v4.hash_table_type,
        hash_table_offset,
    };
    v4.hash_table_offset = hash_table_offset;

    let mut cursor = Cursor::new(Vec::new());
    header.write(&mut cursor)?;
    for mut entry_header in headers {
        entry_header.data_offset += data_offset;
        if let Some(offset) = entry_header.path_offset.as_mut() {
            *offset = absolute_path_offset(path_table_offset, *offset)?;
        }
        entry_header.write_options(&mut cursor, endian, layout)?;
    }

    let mut output = cursor.into_inner();
    output.extend(packed_paths);
    output.extend(packed_hash_table);
    output.extend(packed_data);
    Ok(output)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_header() -> Bnd4Header {
        Bnd4Header {
            flag1: false,
            flag2: true,
            big_endian: false,
            entry_count: 3,
            signature: "00000000".to_string(),
            entry_header_size: flags::header_size(0x74) as u64,
            data_offset: 0x200,
            utf16_paths: true,
            magic: 0x74,
            hash_table_type: HASH_TABLE_TYPE_PRESENT,
            hash_table_offset: 0x180,
        }
    }

    #[test]
    fn test_header_layout() {
        let header = sample_header();
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).unwrap();
        let bytes = cursor.into_inner();

        assert_eq!(bytes.len() as u64, BND4_HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"BND4");
        assert_eq!(&bytes[4..8], &[0, 1, 0, 0]);
        assert_eq!(&bytes[8..12], &LITTLE_ENDIAN_MARKER.to_le_bytes());
        assert_eq!(&bytes[12..16], &3u32.to_le_bytes());
        assert_eq!(&bytes[16..24], &64u64.to_le_bytes());
        assert_eq!(&bytes[24..32], b"00000000");
        assert_eq!(&bytes[32..40], &0x24u64.to_le_bytes());
        assert_eq!(&bytes[40..48], &0x200u64.to_le_bytes());
        assert_eq!(&bytes[48..51], &[1, 0x74, 4]);
        assert_eq!(&bytes[56..64], &0x180u64.to_le_bytes());

        let parsed = Bnd4Header::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_big_endian_marker() {
        let mut header = sample_header();
        header.big_endian = true;
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).unwrap();
        let bytes = cursor.into_inner();

        assert_eq!(&bytes[8..12], &[0, 1, 0, 0]);
        assert_eq!(&bytes[12..16], &3u32.to_be_bytes());

        let parsed = Bnd4Header::read(&mut Cursor::new(&bytes)).unwrap();
        assert!(parsed.big_endian);
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_entry_header_size_mismatch_is_fatal() {
        let mut header = sample_header();
        header.hash_table_type = 0;
        header.hash_table_offset = 0;
        header.entry_count = 0;
        header.entry_header_size = 0x20;
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).unwrap();

        let result = unpack(&cursor.into_inner());
        assert!(matches!(
            result,
            Err(BinderError::HeaderSizeMismatch {
                magic: 0x74,
                expected: 0x24,
                actual: 0x20
            })
        ));
    }

    #[test]
    fn test_stray_hash_table_offset_is_tolerated() {
        let mut header = sample_header();
        header.hash_table_type = 0;
        header.entry_count = 0;
        header.data_offset = BND4_HEADER_SIZE;
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).unwrap();

        let binder = unpack(&cursor.into_inner()).expect("stray offset only warns");
        assert_eq!(binder.entry_count(), 0);
    }

    #[test]
    fn test_oversized_entry_count_is_truncated() {
        let header = Bnd4Header {
            entry_count: u32::MAX,
            entry_header_size: flags::header_size(0) as u64,
            data_offset: BND4_HEADER_SIZE,
            magic: 0,
            hash_table_type: 0,
            hash_table_offset: 0,
            ..sample_header()
        };
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).unwrap();
        let bytes = cursor.into_inner();

        assert!(matches!(
            unpack(&bytes),
            Err(BinderError::Truncated {
                what: "entry headers",
                offset: BND4_HEADER_SIZE,
                ..
            })
        ));
        assert!(Binder::parse(&bytes).is_err());
    }

    #[test]
    fn test_pack_layout_with_hash_table() {
        let fields = BinderFields {
            signature: "07D7R6".to_string(),
            magic: 0x74,
            big_endian: false,
            dcx_magic: None,
        };
        let mut v4 = Bnd4Fields {
            hash_table_type: HASH_TABLE_TYPE_PRESENT,
            ..Bnd4Fields::default()
        };
        let entries = vec![
            BinderEntry::new(b"one".to_vec(), Some(0), Some("a\\one.bin".into())),
            BinderEntry::new(b"two".to_vec(), Some(1), Some("a\\two.bin".into())),
        ];

        let bytes = pack(&fields, &mut v4, &entries).unwrap();
        let header = Bnd4Header::read(&mut Cursor::new(&bytes)).unwrap();

        let record = flags::header_size(0x74) as u64;
        let paths_start = BND4_HEADER_SIZE + 2 * record;
        // Two Shift-JIS paths, one NUL each
        let paths_len = 2 * ("a\\one.bin".len() as u64 + 1);
        assert_eq!(header.hash_table_offset, paths_start + paths_len);

        let table = build_hash_table(&entries).unwrap();
        let table_start = header.hash_table_offset as usize;
        assert_eq!(&bytes[table_start..header.data_offset as usize], table.as_slice());

        // Ten pad bytes precede each payload
        let data_start = header.data_offset as usize;
        assert_eq!(&bytes[data_start..data_start + 10], &[0u8; 10]);
        assert_eq!(&bytes[data_start + 10..data_start + 13], b"one");
        assert_eq!(&bytes[data_start + 13..data_start + 23], &[0u8; 10]);
        assert_eq!(&bytes[data_start + 23..], b"two");

        assert_eq!(v4.hash_table_offset, header.hash_table_offset);
        assert_eq!(v4.hash_table_cache.as_ref().unwrap().bytes, table);
    }
}
