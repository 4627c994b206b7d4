//! Binder entries

use crate::compression::{compress_entry, decompress_entry};
use crate::entry_header::{EntryHeader, EntryLayout};
use crate::error::{BinderError, Result};
use crate::flags;
use crate::path_encoding::PathEncoding;
use binrw::{BinRead, Endian, io::Cursor};

/// Entry magic used by most files in DS1 and DS3 binders
pub const DEFAULT_ENTRY_MAGIC: u8 = 0x40;

/// One packed file inside a binder
///
/// `data` always holds the uncompressed payload; compression is applied when
/// packing, according to the entry `magic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderEntry {
    /// Uncompressed payload
    pub data: Vec<u8>,
    /// Index used by the game engine to find the payload
    pub id: Option<i32>,
    /// Full internal path, backslash-separated
    pub path: Option<String>,
    /// Per-entry flag byte
    pub magic: u8,
}

impl BinderEntry {
    /// Create an entry with the default entry magic
    pub fn new(data: Vec<u8>, id: Option<i32>, path: Option<String>) -> Self {
        Self {
            data,
            id,
            path,
            magic: DEFAULT_ENTRY_MAGIC,
        }
    }

    /// Create an entry with an explicit entry magic
    pub fn with_magic(data: Vec<u8>, id: Option<i32>, path: Option<String>, magic: u8) -> Self {
        Self {
            data,
            id,
            path,
            magic,
        }
    }

    /// Read `count` entry headers from the current cursor position, then
    /// load each entry's path and payload from the whole buffer.
    pub fn unpack_many(
        cursor: &mut Cursor<&[u8]>,
        endian: Endian,
        layout: EntryLayout,
        path_encoding: PathEncoding,
        count: usize,
    ) -> Result<Vec<Self>> {
        let start = cursor.position();
        let table_len = count.saturating_mul(layout.size());
        let remaining = usize::try_from(start)
            .map_or(0, |start| cursor.get_ref().len().saturating_sub(start));
        if table_len > remaining {
            return Err(BinderError::Truncated {
                what: "entry headers",
                offset: start,
                length: table_len as u64,
            });
        }

        let mut headers = Vec::with_capacity(count);
        for _ in 0..count {
            headers.push(EntryHeader::read_options(cursor, endian, layout)?);
        }

        let buffer: &[u8] = cursor.get_ref();
        headers
            .iter()
            .map(|header| Self::from_header(buffer, header, path_encoding))
            .collect()
    }

    fn from_header(
        buffer: &[u8],
        header: &EntryHeader,
        path_encoding: PathEncoding,
    ) -> Result<Self> {
        let path = header
            .path_offset
            .map(|offset| path_encoding.decode_at(buffer, offset as usize))
            .transpose()?;

        let stored = usize::try_from(header.data_offset)
            .ok()
            .zip(usize::try_from(header.compressed_size).ok())
            .and_then(|(start, len)| buffer.get(start..start.checked_add(len)?))
            .ok_or(BinderError::Truncated {
                what: "entry data",
                offset: header.data_offset,
                length: header.compressed_size,
            })?;

        let data = if flags::is_entry_compressed(header.entry_magic) {
            decompress_entry(stored)?
        } else {
            stored.to_vec()
        };

        Ok(Self {
            data,
            id: header.entry_id,
            path,
            magic: header.entry_magic,
        })
    }

    /// Payload as it will be stored, plus whether it was compressed
    pub fn data_for_pack(&self) -> Result<(Vec<u8>, bool)> {
        if flags::is_entry_compressed(self.magic) {
            Ok((compress_entry(&self.data)?, true))
        } else {
            Ok((self.data.clone(), false))
        }
    }

    /// Uncompressed payload size
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Path encoded for the path table, terminator included
    pub fn packed_path(&self, encoding: PathEncoding) -> Result<Vec<u8>> {
        encoding.encode(self.path()?)
    }

    /// Entry path, or [`BinderError::MissingPath`]
    pub fn path(&self) -> Result<&str> {
        self.path.as_deref().ok_or(BinderError::MissingPath)
    }

    /// Final path component
    pub fn name(&self) -> Result<&str> {
        let path = self.path()?;
        Ok(path.rsplit(['\\', '/']).next().unwrap_or(path))
    }

    /// Final path component without its extension
    pub fn stem(&self) -> Result<&str> {
        let name = self.name()?;
        Ok(match name.rfind('.') {
            Some(pos) if pos > 0 => &name[..pos],
            _ => name,
        })
    }

    /// Path with forward-slash separators
    pub fn path_with_forward_slashes(&self) -> Result<String> {
        Ok(self.path()?.replace('\\', "/"))
    }

    /// Parent directory with backslash separators, empty for a bare name
    pub fn directory(&self) -> Result<&str> {
        let path = self.path()?;
        Ok(path.rfind(['\\', '/']).map_or("", |pos| &path[..pos]))
    }

    /// Parent directory with forward-slash separators
    pub fn directory_with_forward_slashes(&self) -> Result<String> {
        Ok(self.directory()?.replace('\\', "/"))
    }
}
