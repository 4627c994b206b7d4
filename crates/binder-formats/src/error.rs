//! Error types for binder parsing and building

use thiserror::Error;

/// Errors that can occur when parsing, building or exporting binders
#[derive(Error, Debug)]
pub enum BinderError {
    /// Leading tag or manifest version does not match the expected variant
    #[error("Binder version mismatch: expected {expected}, found {found:?}")]
    FormatMismatch {
        /// Expected version tag (`BND3` or `BND4`)
        expected: &'static str,
        /// Tag or version string actually found
        found: String,
    },

    /// Data is neither a BND3 nor a BND4 binder
    #[error("Data could not be interpreted as a BND3 or BND4 binder")]
    UnknownFormat,

    /// Declared entry header size disagrees with the size implied by the magic
    #[error(
        "Expected entry header size {expected} based on magic 0x{magic:02x}, but binder header says {actual}"
    )]
    HeaderSizeMismatch {
        /// Binder magic byte
        magic: u8,
        /// Size computed from the format flags
        expected: u64,
        /// Size declared in the binder header
        actual: u64,
    },

    /// Fixed header field holds an unexpected value
    #[error("Structural inconsistency: {0}")]
    StructuralInconsistency(String),

    /// Adding a bit-identical entry, or looking up an ambiguous ID/path/basename
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// No entry matches the given ID, path or basename
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Entry has no path but a path-derived property or a path field was required
    #[error("Entry has no path")]
    MissingPath,

    /// Binder magic declares entry IDs but an entry has none
    #[error("Entry at index {0} has no ID, but the binder magic requires one")]
    MissingEntryId(usize),

    /// Malformed or oversized compressed entry payload
    #[error("Compression error: {0}")]
    Compression(String),

    /// Path cannot be encoded or decoded in the binder's path encoding
    #[error("Path encoding error: {0}")]
    PathEncoding(String),

    /// Signature longer than the fixed on-disk field
    #[error("Binder signature {0:?} is longer than 8 bytes")]
    SignatureTooLong(String),

    /// A table or payload extends past the end of the buffer
    #[error("Truncated binder: {what} at offset {offset} needs {length} bytes")]
    Truncated {
        /// Region being read
        what: &'static str,
        /// Absolute offset of the region
        offset: u64,
        /// Length of the region
        length: u64,
    },

    /// Operation not available for this variant or flag combination
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `BinRW` parsing/writing error
    #[error("Binary format error: {0}")]
    BinRw(#[from] binrw::Error),

    /// Manifest JSON error
    #[error("Manifest error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for binder operation results
pub type Result<T> = std::result::Result<T, BinderError>;
