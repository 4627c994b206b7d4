//! Format flag rules shared by both binder variants
//!
//! Every structural difference between binders of the same version derives
//! from the binder `magic` byte (and, for payload compression, the per-entry
//! magic byte). Bits are tested in their raw on-disk orientation.

/// Big-endian hint (bit 7)
pub const BIG_ENDIAN: u8 = 0b1000_0000;

/// Entry IDs present (bit 6)
pub const IDS: u8 = 0b0100_0000;

/// Path offsets present, first variant (bit 5)
pub const NAMES1: u8 = 0b0010_0000;

/// Path offsets present, second variant (bit 4)
pub const NAMES2: u8 = 0b0001_0000;

/// 64-bit entry data offsets in BND4 entry headers (bit 3)
pub const LONG_OFFSETS: u8 = 0b0000_1000;

/// Compression supported, entry headers carry an uncompressed size (bit 2)
pub const COMPRESSION: u8 = 0b0000_0100;

/// Per-entry flag marking a zlib-compressed payload
pub const ENTRY_COMPRESSED: u8 = 0b1000_0000;

/// Binder magic that carries eight extra pad bytes per BND4 entry header
pub const NAMES1_ONLY: u8 = NAMES1;

/// Whether the magic hints at big-endian fields (BND3 only consults this)
pub const fn is_big_endian_hint(magic: u8) -> bool {
    magic & BIG_ENDIAN != 0
}

/// Whether entry headers carry an entry ID
pub const fn has_id(magic: u8) -> bool {
    magic & IDS != 0
}

/// Whether entry headers carry a path offset
pub const fn has_path(magic: u8) -> bool {
    magic & (NAMES1 | NAMES2) != 0
}

/// Whether entry headers carry an uncompressed data size
pub const fn has_uncompressed_size(magic: u8) -> bool {
    magic & COMPRESSION != 0
}

/// Whether BND4 entry data offsets are 64-bit
pub const fn has_long_offsets(magic: u8) -> bool {
    magic & LONG_OFFSETS != 0
}

/// Whether an entry with this entry magic stores compressed data
pub const fn is_entry_compressed(entry_magic: u8) -> bool {
    entry_magic & ENTRY_COMPRESSED != 0
}

/// Size in bytes of one BND4 entry header for the given binder magic
pub const fn header_size(magic: u8) -> usize {
    let mut size = 16;
    size += if has_long_offsets(magic) { 8 } else { 4 };
    if has_uncompressed_size(magic) {
        size += 8;
    }
    if has_id(magic) {
        size += 4;
    }
    if has_path(magic) {
        size += 4;
    }
    if magic == NAMES1_ONLY {
        size += 8;
    }
    size
}

/// Size in bytes of one BND3 entry header for the given binder magic
pub const fn bnd3_header_size(magic: u8) -> usize {
    let mut size = 12;
    if has_id(magic) {
        size += 4;
    }
    if has_path(magic) {
        size += 4;
    }
    if has_uncompressed_size(magic) {
        size += 4;
    }
    size
}
