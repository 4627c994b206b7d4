//! Binder format detection and file I/O
//!
//! Detection never fails: a source that cannot be read simply does not match.

use crate::binder::Binder;
use crate::dcx::{DcxCodec, is_dcx};
use crate::entry_header::BinderVersion;
use crate::error::{BinderError, Result};
use crate::manifest::{manifest_dir, manifest_version};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Something a binder can be opened from
#[derive(Debug, Clone, Copy)]
pub enum BinderSource<'a> {
    /// Raw binder or DCX bytes
    Bytes(&'a [u8]),
    /// Binder file, unpacked directory, or its manifest file
    Path(&'a Path),
}

impl<'a> From<&'a [u8]> for BinderSource<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::Bytes(data)
    }
}

impl<'a> From<&'a Path> for BinderSource<'a> {
    fn from(path: &'a Path) -> Self {
        Self::Path(path)
    }
}

/// True when `source` looks like a BND3 binder
pub fn detect_v3<'a>(source: impl Into<BinderSource<'a>>) -> bool {
    detect_version(source.into()) == Some(BinderVersion::V3)
}

/// True when `source` looks like a BND4 binder
pub fn detect_v4<'a>(source: impl Into<BinderSource<'a>>) -> bool {
    detect_version(source.into()) == Some(BinderVersion::V4)
}

/// Version of a binder source, if it is one
///
/// Unpacked directories are identified by their manifest `version`; files and
/// bytes by their first four bytes. DCX envelopes are not looked through.
pub fn detect_version(source: BinderSource<'_>) -> Option<BinderVersion> {
    match source {
        BinderSource::Bytes(data) => version_from_tag(data.get(..4)?),
        BinderSource::Path(path) => {
            if let Some(dir) = manifest_dir(path) {
                return manifest_version(&dir).ok();
            }
            if path.is_file() {
                let mut file = File::open(path).ok()?;
                return detect_reader(&mut file);
            }
            None
        }
    }
}

/// Version of the binder in a stream, leaving the stream position unchanged
pub fn detect_reader<R: Read + Seek>(reader: &mut R) -> Option<BinderVersion> {
    let position = reader.stream_position().ok()?;
    let mut tag = [0u8; 4];
    let read = reader
        .seek(SeekFrom::Start(0))
        .and_then(|_| reader.read_exact(&mut tag));
    reader.seek(SeekFrom::Start(position)).ok()?;
    read.ok()?;
    version_from_tag(&tag)
}

fn version_from_tag(tag: &[u8]) -> Option<BinderVersion> {
    [BinderVersion::V3, BinderVersion::V4]
        .into_iter()
        .find(|version| tag == version.tag())
}

/// Open a binder from bytes, a file, or an unpacked directory
///
/// DCX envelopes are unwrapped with `dcx` and their magic is kept on the
/// binder so [`Binder::write_to_path`] can restore it.
pub fn open<'a>(source: impl Into<BinderSource<'a>>, dcx: Option<&dyn DcxCodec>) -> Result<Binder> {
    match source.into() {
        BinderSource::Bytes(data) => open_bytes(data, dcx),
        BinderSource::Path(path) => {
            if manifest_dir(path).is_some() {
                return Binder::load_unpacked_dir(path);
            }
            let data = std::fs::read(path)?;
            open_bytes(&data, dcx)
        }
    }
}

fn open_bytes(data: &[u8], dcx: Option<&dyn DcxCodec>) -> Result<Binder> {
    if !is_dcx(data) {
        return Binder::parse(data);
    }
    let codec = dcx.ok_or_else(|| {
        BinderError::UnsupportedOperation("data is DCX-compressed but no DCX codec was given".into())
    })?;
    let (inner, magic) = codec.decompress(data)?;
    debug!(?magic, size = inner.len(), "unwrapped DCX binder");

    let mut binder = Binder::parse(&inner)?;
    binder.fields.dcx_magic = Some(magic);
    Ok(binder)
}

impl Binder {
    /// Pack the binder and write it to `path`
    ///
    /// When the binder has a DCX magic the packed bytes are wrapped with
    /// `dcx` first.
    pub fn write_to_path(&mut self, path: impl AsRef<Path>, dcx: Option<&dyn DcxCodec>) -> Result<()> {
        let packed = self.pack()?;
        let output = match self.fields.dcx_magic {
            Some(magic) => {
                let codec = dcx.ok_or_else(|| {
                    BinderError::UnsupportedOperation(format!(
                        "binder has DCX magic {magic:?} but no DCX codec was given"
                    ))
                })?;
                codec.compress(&packed, magic)?
            }
            None => packed,
        };
        std::fs::write(path, output)?;
        Ok(())
    }
}
