//! Parser and builder for FromSoftware BND3/BND4 binder archives
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // Format names don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::redundant_clone)] // Binary format handling
#![allow(clippy::missing_errors_doc)] // Every fallible call returns BinderError
//! A binder packs many game files into one container. Each entry has an
//! optional integer ID, an optional backslash-separated path, a flag byte,
//! and its payload. The binder's `magic` byte decides which of those fields
//! are stored and whether payload sizes and offsets are 32 or 64 bits wide.
//!
//! # Supported Formats
//!
//! - **BND3**: Demon's Souls and Dark Souls, Shift-JIS paths
//! - **BND4**: Dark Souls II onwards, Shift-JIS or UTF-16 paths and an
//!   optional path hash table
//! - **Unpacked directories**: one file per entry plus `bnd_manifest.json`
//!
//! DCX envelopes are unwrapped and restored through the [`DcxCodec`] trait;
//! no DCX codec ships with this crate.
//!
//! # Example
//!
//! ```rust
//! use binder_formats::{Binder, BinderEntry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut binder = Binder::new_v3("07D7R6", 0x74);
//! binder.add_entry(BinderEntry::new(
//!     b"hello".to_vec(),
//!     Some(100),
//!     Some("N:\\FRPG\\data\\hello.txt".to_string()),
//! ))?;
//!
//! let bytes = binder.pack()?;
//! let parsed = Binder::parse(&bytes)?;
//! assert_eq!(parsed.get("hello.txt")?.data, b"hello");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Binder archive and entry collection
pub mod binder;

/// BND3 header and packing
pub mod bnd3;

/// BND4 header, packing and path hash table
pub mod bnd4;

/// Builder for new binders
pub mod builder;

/// Zlib entry compression
pub mod compression;

/// DCX envelope seam
pub mod dcx;

/// Format detection and file I/O
pub mod detect;

/// Binder entries
pub mod entry;

/// Per-entry header records
pub mod entry_header;

/// Error types
pub mod error;

/// Binder magic flag rules
pub mod flags;

/// Unpacked directory manifests
pub mod manifest;

/// Entry path text encodings
pub mod path_encoding;

pub use binder::{
    Binder, BinderFields, BinderVariant, Bnd3Fields, Bnd4Fields, EntryKey, HashTableCache,
};
pub use builder::BinderBuilder;
pub use dcx::{DcxCodec, DcxMagic};
pub use detect::{BinderSource, detect_v3, detect_v4, open};
pub use entry::BinderEntry;
pub use entry_header::{BinderVersion, EntryLayout};
pub use error::{BinderError, Result};
pub use manifest::MANIFEST_FILE_NAME;
pub use path_encoding::PathEncoding;
