//! Zlib compression for entry payloads

use crate::error::{BinderError, Result};
use flate2::Compression;
use flate2::read::{ZlibDecoder, ZlibEncoder};
use std::io::Read;

/// Compression level used for every compressed entry
pub const COMPRESSION_LEVEL: u32 = 7;

/// Maximum allowed decompression size (1 GB)
///
/// Limits decompression output so a corrupt or hostile entry cannot exhaust
/// memory. Individual binder entries are far smaller in practice.
pub const MAX_DECOMPRESSION_SIZE: usize = 1024 * 1024 * 1024;

/// Compress an entry payload with zlib
pub fn compress_entry(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(data, Compression::new(COMPRESSION_LEVEL));
    let mut compressed = Vec::new();
    encoder
        .read_to_end(&mut compressed)
        .map_err(|e| BinderError::Compression(format!("ZLib compression failed: {e}")))?;
    Ok(compressed)
}

/// Decompress a zlib entry payload
pub fn decompress_entry(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = decoder
            .read(&mut buffer)
            .map_err(|e| BinderError::Compression(format!("ZLib decompression failed: {e}")))?;

        if bytes_read == 0 {
            break;
        }

        if decompressed.len() + bytes_read > MAX_DECOMPRESSION_SIZE {
            return Err(BinderError::Compression(format!(
                "Decompressed size exceeds limit of {MAX_DECOMPRESSION_SIZE} bytes"
            )));
        }

        decompressed.extend_from_slice(&buffer[..bytes_read]);
    }

    Ok(decompressed)
}
