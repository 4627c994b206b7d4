//! BND3 binders, used before Dark Souls II
//!
//! ```text
//! header (32 bytes):
//!   "BND3", signature[8], magic: u8, big_endian: u8   (always little-endian)
//!   unknown: u8, 0: u8, entry_count: i32, file_size: i32, reserved[8]
//! entry headers: 12-24 bytes each, see [`EntryLayout`]
//! path table:    Shift-JIS, NUL-terminated
//! entry data
//! ```
//!
//! Entries are written in ascending ID order with contiguous payloads.

use crate::binder::{Binder, BinderFields, BinderVariant, Bnd3Fields};
use crate::entry::BinderEntry;
use crate::entry_header::{BinderVersion, EntryHeader, EntryLayout};
use crate::error::{BinderError, Result};
use crate::flags;
use crate::path_encoding::PathEncoding;
use binrw::{BinRead, BinResult, BinWrite, Endian, io::Cursor};
use std::io::{Read, Seek, Write};

/// BND3 header size in bytes
pub const BND3_HEADER_SIZE: usize = 32;

/// BND3 paths are always Shift-JIS
pub const BND3_PATH_ENCODING: PathEncoding = PathEncoding::ShiftJis;

/// BND3 file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bnd3Header {
    /// Free-form signature, NUL padding stripped
    pub signature: String,
    /// Binder magic
    pub magic: u8,
    /// Raw big-endian flag byte from the header
    pub big_endian_flag: bool,
    /// Unknown flag, usually false
    pub unknown: bool,
    /// Number of entries
    pub entry_count: u32,
    /// Total file size
    pub file_size: u32,
}

impl Bnd3Header {
    /// Effective byte order: the header flag or the magic hint
    pub const fn big_endian(&self) -> bool {
        self.big_endian_flag || flags::is_big_endian_hint(self.magic)
    }

    /// binrw endian for everything after the fixed prefix
    pub const fn endian(&self) -> Endian {
        if self.big_endian() {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

impl BinRead for Bnd3Header {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let tag = <[u8; 4]>::read_options(reader, Endian::Little, ())?;
        if tag != BinderVersion::V3.tag() {
            return Err(binrw::Error::BadMagic {
                pos: 0,
                found: Box::new(tag),
            });
        }
        let signature_bytes = <[u8; 8]>::read_options(reader, Endian::Little, ())?;
        let signature = decode_signature(reader, &signature_bytes)?;
        let magic = u8::read_options(reader, Endian::Little, ())?;
        let big_endian_flag = u8::read_options(reader, Endian::Little, ())? != 0;

        let endian = if big_endian_flag || flags::is_big_endian_hint(magic) {
            Endian::Big
        } else {
            Endian::Little
        };

        let unknown = u8::read_options(reader, endian, ())? != 0;
        let zero = u8::read_options(reader, endian, ())?;
        if zero != 0 {
            return Err(binrw::Error::AssertFail {
                pos: reader.stream_position().unwrap_or(0),
                message: format!("BND3 header byte 0x0F is {zero}, expected 0"),
            });
        }
        let entry_count = u32::read_options(reader, endian, ())?;
        let file_size = u32::read_options(reader, endian, ())?;
        let _reserved = <[u8; 8]>::read_options(reader, endian, ())?;

        Ok(Self {
            signature,
            magic,
            big_endian_flag,
            unknown,
            entry_count,
            file_size,
        })
    }
}

impl BinWrite for Bnd3Header {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _endian: Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        BinderVersion::V3
            .tag()
            .write_options(writer, Endian::Little, ())?;
        encode_signature(writer, &self.signature)?.write_options(writer, Endian::Little, ())?;
        self.magic.write_options(writer, Endian::Little, ())?;
        u8::from(self.big_endian_flag).write_options(writer, Endian::Little, ())?;

        let endian = self.endian();
        u8::from(self.unknown).write_options(writer, endian, ())?;
        0u8.write_options(writer, endian, ())?;
        self.entry_count.write_options(writer, endian, ())?;
        self.file_size.write_options(writer, endian, ())?;
        [0u8; 8].write_options(writer, endian, ())?;
        Ok(())
    }
}

// Byte order is chosen by the header itself
impl binrw::meta::ReadEndian for Bnd3Header {
    const ENDIAN: binrw::meta::EndianKind = binrw::meta::EndianKind::None;
}

impl binrw::meta::WriteEndian for Bnd3Header {
    const ENDIAN: binrw::meta::EndianKind = binrw::meta::EndianKind::None;
}

/// Strip NUL padding and decode an 8-byte signature field
pub(crate) fn decode_signature<S: Seek>(stream: &mut S, bytes: &[u8; 8]) -> BinResult<String> {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |pos| pos + 1);
    String::from_utf8(bytes[..end].to_vec()).map_err(|e| binrw::Error::Custom {
        pos: stream.stream_position().unwrap_or(0),
        err: Box::new(e),
    })
}

/// Pad a signature out to its 8-byte field
pub(crate) fn encode_signature<S: Seek>(stream: &mut S, signature: &str) -> BinResult<[u8; 8]> {
    let bytes = signature.as_bytes();
    if bytes.len() > 8 {
        return Err(binrw::Error::Custom {
            pos: stream.stream_position().unwrap_or(0),
            err: Box::new(BinderError::SignatureTooLong(signature.to_string())),
        });
    }
    let mut field = [0u8; 8];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Path offsets are stored as `u32` in both binder versions
pub(crate) fn path_offset_overflow(offset: u64) -> BinderError {
    BinderError::StructuralInconsistency(format!("path offset {offset} exceeds 32 bits"))
}

/// Absolute path offset from the path table start and an offset into it
pub(crate) fn absolute_path_offset(path_table_offset: u64, relative: u32) -> Result<u32> {
    let offset = path_table_offset.saturating_add(u64::from(relative));
    u32::try_from(offset).map_err(|_| path_offset_overflow(offset))
}

/// Unpack a BND3 binder
pub fn unpack(data: &[u8]) -> Result<Binder> {
    let tag = data.get(..4).unwrap_or(data);
    if tag != BinderVersion::V3.tag() {
        return Err(BinderError::FormatMismatch {
            expected: BinderVersion::V3.as_str(),
            found: String::from_utf8_lossy(tag).into_owned(),
        });
    }

    let mut cursor = Cursor::new(data);
    let header = Bnd3Header::read(&mut cursor)?;
    let layout = EntryLayout::new(BinderVersion::V3, header.magic);

    let entries = BinderEntry::unpack_many(
        &mut cursor,
        header.endian(),
        layout,
        BND3_PATH_ENCODING,
        header.entry_count as usize,
    )?;

    let mut binder = Binder::from_fields(
        BinderFields {
            signature: header.signature.clone(),
            magic: header.magic,
            big_endian: header.big_endian(),
            dcx_magic: None,
        },
        BinderVariant::V3(Bnd3Fields {
            unknown: header.unknown,
        }),
    );
    for entry in entries {
        binder.add_entry(entry)?;
    }
    Ok(binder)
}

/// Pack a BND3 binder
///
/// Entries are emitted sorted by ID; the binder itself is not reordered.
pub fn pack(fields: &BinderFields, v3: &Bnd3Fields, entries: &[BinderEntry]) -> Result<Vec<u8>> {
    let big_endian = fields.big_endian || flags::is_big_endian_hint(fields.magic);
    let endian = if big_endian { Endian::Big } else { Endian::Little };
    let layout = EntryLayout::new(BinderVersion::V3, fields.magic);

    let mut sorted: Vec<&BinderEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| entry.id);

    let mut headers = Vec::with_capacity(sorted.len());
    let mut packed_paths = Vec::new();
    let mut packed_data = Vec::new();

    for (index, entry) in sorted.iter().enumerate() {
        let entry_id = if layout.has_id() {
            Some(entry.id.ok_or(BinderError::MissingEntryId(index))?)
        } else {
            None
        };
        let path_offset = if layout.has_path() {
            let offset = u32::try_from(packed_paths.len())
                .map_err(|_| path_offset_overflow(packed_paths.len() as u64))?;
            packed_paths.extend(entry.packed_path(BND3_PATH_ENCODING)?);
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

    let entry_header_table_offset = BND3_HEADER_SIZE;
    let path_table_offset = entry_header_table_offset + layout.size() * headers.len();
    let data_offset = path_table_offset + packed_paths.len();
    let file_size = data_offset + packed_data.len();

    let header = Bnd3Header {
        signature: fields.signature.clone(),
        magic: fields.magic,
        big_endian_flag: big_endian,
        unknown: v3.unknown,
        entry_count: headers.len() as u32,
        file_size: u32::try_from(file_size).map_err(|_| {
            BinderError::StructuralInconsistency(format!(
                "BND3 file size {file_size} exceeds 32 bits"
            ))
        })?,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(file_size));
    header.write(&mut cursor)?;
    for mut entry_header in headers {
        entry_header.data_offset += data_offset as u64;
        if let Some(offset) = entry_header.path_offset.as_mut() {
            *offset = absolute_path_offset(path_table_offset as u64, *offset)?;
        }
        entry_header.write_options(&mut cursor, endian, layout)?;
    }

    let mut output = cursor.into_inner();
    output.extend(packed_paths);
    output.extend(packed_data);
    Ok(output)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header_bytes(header: &Bnd3Header) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).expect("header should write");
        cursor.into_inner()
    }

    #[test]
    fn test_header_layout() {
        let header = Bnd3Header {
            signature: "07D7R6".to_string(),
            magic: 0x74,
            big_endian_flag: false,
            unknown: false,
            entry_count: 2,
            file_size: 0x1234,
        };
        let bytes = header_bytes(&header);
        assert_eq!(bytes.len(), BND3_HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"BND3");
        assert_eq!(&bytes[4..12], b"07D7R6\0\0");
        assert_eq!(bytes[12], 0x74);
        assert_eq!(bytes[13], 0);
        assert_eq!(&bytes[16..20], &2u32.to_le_bytes());
        assert_eq!(&bytes[20..24], &0x1234u32.to_le_bytes());

        let parsed = Bnd3Header::read(&mut Cursor::new(&bytes)).expect("header should parse");
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_magic_hint_selects_big_endian() {
        let header = Bnd3Header {
            signature: String::new(),
            magic: 0x74 | flags::BIG_ENDIAN,
            big_endian_flag: false,
            unknown: true,
            entry_count: 1,
            file_size: 64,
        };
        let bytes = header_bytes(&header);
        assert_eq!(&bytes[16..20], &1u32.to_be_bytes());

        let parsed = Bnd3Header::read(&mut Cursor::new(&bytes)).expect("header should parse");
        assert!(parsed.big_endian());
        assert!(!parsed.big_endian_flag);
        assert_eq!(parsed.entry_count, 1);
    }

    #[test]
    fn test_signature_too_long() {
        let header = Bnd3Header {
            signature: "far too long".to_string(),
            magic: 0,
            big_endian_flag: false,
            unknown: false,
            entry_count: 0,
            file_size: 32,
        };
        assert!(header.write(&mut Cursor::new(Vec::new())).is_err());
    }

    #[test]
    fn test_unpack_rejects_other_tags() {
        let mut data = b"BND4".to_vec();
        data.resize(64, 0);
        assert!(matches!(
            unpack(&data),
            Err(BinderError::FormatMismatch { expected: "BND3", .. })
        ));
    }

    #[test]
    fn test_oversized_entry_count_is_truncated() {
        let header = Bnd3Header {
            signature: String::new(),
            magic: flags::IDS,
            big_endian_flag: false,
            unknown: false,
            entry_count: u32::MAX,
            file_size: BND3_HEADER_SIZE as u32,
        };
        assert!(matches!(
            unpack(&header_bytes(&header)),
            Err(BinderError::Truncated {
                what: "entry headers",
                ..
            })
        ));
    }

    #[test]
    fn test_path_offsets_must_fit_u32() {
        assert_eq!(absolute_path_offset(32, 8).unwrap(), 40);
        assert_eq!(
            absolute_path_offset(u64::from(u32::MAX) - 1, 1).unwrap(),
            u32::MAX
        );
        assert!(matches!(
            absolute_path_offset(u64::from(u32::MAX), 1),
            Err(BinderError::StructuralInconsistency(_))
        ));
        assert!(matches!(
            absolute_path_offset(1 << 40, 0),
            Err(BinderError::StructuralInconsistency(_))
        ));
    }

    #[test]
    fn test_pack_offsets() {
        let fields = BinderFields {
            signature: "sig".to_string(),
            magic: 0x74,
            big_endian: false,
            dcx_magic: None,
        };
        let entries = vec![
            BinderEntry::new(b"second".to_vec(), Some(2), Some("b.bin".into())),
            BinderEntry::new(b"first".to_vec(), Some(1), Some("a.bin".into())),
        ];
        let bytes = pack(&fields, &Bnd3Fields::default(), &entries).expect("pack should succeed");

        let record = flags::bnd3_header_size(0x74);
        let paths_start = BND3_HEADER_SIZE + 2 * record;
        let data_start = paths_start + "a.bin\0b.bin\0".len();
        assert_eq!(bytes.len(), data_start + "firstsecond".len());
        assert_eq!(&bytes[paths_start..data_start], b"a.bin\0b.bin\0");
        assert_eq!(&bytes[data_start..], b"firstsecond");
        assert_eq!(&bytes[20..24], &(bytes.len() as u32).to_le_bytes());

        // First record is the lowest ID, offsets are absolute
        let first = &bytes[BND3_HEADER_SIZE..BND3_HEADER_SIZE + record];
        assert_eq!(&first[8..12], &(data_start as u32).to_le_bytes());
        assert_eq!(&first[12..16], &1i32.to_le_bytes());
        assert_eq!(&first[16..20], &(paths_start as u32).to_le_bytes());
    }
}
