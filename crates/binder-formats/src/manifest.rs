//! Unpacked binder directories
//!
//! An unpacked binder is a directory holding one file per entry plus a JSON
//! manifest, [`MANIFEST_FILE_NAME`], that records the binder header fields and
//! where each entry belongs. Entry files hold uncompressed payloads; the entry
//! magic decides whether they are compressed again on the next pack.
//!
//! The manifest is UTF-8 JSON and `magic` is an unsigned byte. Manifests
//! written as Shift-JIS, or holding a negative BND3 magic, do not load.
//!
//! ```json
//! {
//!     "version": "BND4",
//!     "signature": "07D7R6",
//!     "magic": 116,
//!     "big_endian": false,
//!     "utf16_paths": true,
//!     "hash_table_type": 4,
//!     "flag1": false,
//!     "flag2": false,
//!     "use_id_prefix": false,
//!     "dcx_magic": [],
//!     "entries": {
//!         "N:\\FRPG\\data\\INTERROOT_win64\\chr\\c0000": [
//!             { "id": 200, "magic": 64, "name": "c0000.flver" }
//!         ]
//!     }
//! }
//! ```

use crate::binder::{Binder, BinderFields, BinderVariant, Bnd3Fields, Bnd4Fields};
use crate::dcx::{DcxMagic, manifest_form};
use crate::entry::BinderEntry;
use crate::entry_header::BinderVersion;
use crate::error::{BinderError, Result};
use crate::flags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the manifest inside an unpacked binder directory
pub const MANIFEST_FILE_NAME: &str = "bnd_manifest.json";

/// Binder header fields as stored in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestHeader {
    /// "BND3" or "BND4"
    pub version: String,
    /// Binder signature
    pub signature: String,
    /// Binder magic
    pub magic: u8,
    /// Byte order
    pub big_endian: bool,
    /// BND3 unknown flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown: Option<bool>,
    /// BND4 UTF-16 path flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utf16_paths: Option<bool>,
    /// BND4 hash table type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_table_type: Option<u8>,
    /// BND4 unknown flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag1: Option<bool>,
    /// BND4 unknown flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag2: Option<bool>,
    /// Entry files are named `__{id}__{name}`
    pub use_id_prefix: bool,
    /// DCX family, `[]` when not compressed
    #[serde(default, with = "manifest_form")]
    pub dcx_magic: Option<DcxMagic>,
}

/// One entry file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Entry ID, or the entry index when the binder magic has no IDs
    pub id: i32,
    /// Entry magic
    pub magic: u8,
    /// Entry basename
    pub name: String,
}

/// Full manifest document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinderManifest {
    /// Header fields
    #[serde(flatten)]
    pub header: ManifestHeader,
    /// Entries grouped by parent directory
    pub entries: BTreeMap<String, Vec<ManifestEntry>>,
}

#[derive(Deserialize)]
struct ManifestVersion {
    version: String,
}

/// Directory holding the manifest, for a directory or manifest file path
pub fn manifest_dir(path: &Path) -> Option<PathBuf> {
    if path.is_dir() && path.join(MANIFEST_FILE_NAME).is_file() {
        Some(path.to_path_buf())
    } else if path.is_file() && path.file_name().is_some_and(|name| name == MANIFEST_FILE_NAME) {
        path.parent().map(Path::to_path_buf)
    } else {
        None
    }
}

/// Version recorded in the manifest of an unpacked directory
pub fn manifest_version(dir: &Path) -> Result<BinderVersion> {
    let text = std::fs::read_to_string(dir.join(MANIFEST_FILE_NAME))?;
    let ManifestVersion { version } = serde_json::from_str(&text)?;
    BinderVersion::from_name(&version).ok_or(BinderError::FormatMismatch {
        expected: "BND3 or BND4",
        found: version,
    })
}

/// Entry names must be a single plain path component
fn check_entry_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['\\', '/']) {
        return Err(BinderError::StructuralInconsistency(format!(
            "entry name {name:?} is not a usable file name"
        )));
    }
    Ok(())
}

fn entry_file_name(use_id_prefix: bool, id: i32, name: &str) -> String {
    if use_id_prefix {
        format!("__{id}__{name}")
    } else {
        name.to_string()
    }
}

impl Binder {
    /// Header fields in manifest form
    pub fn manifest_header(&self) -> ManifestHeader {
        let mut header = ManifestHeader {
            version: self.version().as_str().to_string(),
            signature: self.fields.signature.clone(),
            magic: self.fields.magic,
            big_endian: self.fields.big_endian,
            unknown: None,
            utf16_paths: None,
            hash_table_type: None,
            flag1: None,
            flag2: None,
            use_id_prefix: self.has_repeated_entry_names(),
            dcx_magic: self.fields.dcx_magic,
        };
        match &self.variant {
            BinderVariant::V3(v3) => header.unknown = Some(v3.unknown),
            BinderVariant::V4(v4) => {
                header.utf16_paths = Some(v4.utf16_paths);
                header.hash_table_type = Some(v4.hash_table_type);
                header.flag1 = Some(v4.flag1);
                header.flag2 = Some(v4.flag2);
            }
        }
        header
    }

    /// Write every entry and a manifest into `dir`, creating it if needed
    ///
    /// Only binders whose magic stores entry paths can be unpacked.
    pub fn write_unpacked_dir(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        if !flags::has_path(self.fields.magic) {
            return Err(BinderError::UnsupportedOperation(format!(
                "binder magic 0x{:02x} has no entry paths to unpack",
                self.fields.magic
            )));
        }

        let header = self.manifest_header();
        let mut entries: BTreeMap<String, Vec<ManifestEntry>> = BTreeMap::new();
        let mut files = Vec::with_capacity(self.entry_count());
        for (index, entry) in self.entries().iter().enumerate() {
            let id = if flags::has_id(self.fields.magic) {
                entry.id.ok_or(BinderError::MissingEntryId(index))?
            } else {
                i32::try_from(index).map_err(|_| {
                    BinderError::StructuralInconsistency(format!(
                        "entry index {index} does not fit in a manifest ID"
                    ))
                })?
            };
            let name = entry.name()?;
            check_entry_name(name)?;

            files.push((entry_file_name(header.use_id_prefix, id, name), &entry.data));
            entries
                .entry(entry.directory()?.to_string())
                .or_default()
                .push(ManifestEntry {
                    id,
                    magic: entry.magic,
                    name: name.to_string(),
                });
        }

        let manifest = BinderManifest { header, entries };
        let mut json = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut json, formatter);
        manifest.serialize(&mut serializer)?;

        std::fs::create_dir_all(dir)?;
        for (file_name, data) in files {
            std::fs::write(dir.join(file_name), data)?;
        }
        std::fs::write(dir.join(MANIFEST_FILE_NAME), json)?;

        debug!(
            dir = %dir.display(),
            entry_count = self.entry_count(),
            "wrote unpacked binder"
        );
        Ok(())
    }

    /// Load a binder from an unpacked directory or its manifest file
    ///
    /// Entries are added in ascending manifest ID order. BND4 binders start
    /// without a cached hash table.
    pub fn load_unpacked_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let dir = manifest_dir(path).ok_or_else(|| {
            BinderError::UnsupportedOperation(format!(
                "{} is not an unpacked binder directory",
                path.display()
            ))
        })?;

        let text = std::fs::read_to_string(dir.join(MANIFEST_FILE_NAME))?;
        let manifest: BinderManifest = serde_json::from_str(&text)?;
        let header = manifest.header;

        let version = BinderVersion::from_name(&header.version).ok_or_else(|| {
            BinderError::FormatMismatch {
                expected: "BND3 or BND4",
                found: header.version.clone(),
            }
        })?;
        let variant = match version {
            BinderVersion::V3 => BinderVariant::V3(Bnd3Fields {
                unknown: header.unknown.unwrap_or_default(),
            }),
            BinderVersion::V4 => BinderVariant::V4(Bnd4Fields {
                flag1: header.flag1.unwrap_or_default(),
                flag2: header.flag2.unwrap_or_default(),
                utf16_paths: header.utf16_paths.unwrap_or_default(),
                hash_table_type: header.hash_table_type.unwrap_or_default(),
                hash_table_offset: 0,
                hash_table_cache: None,
            }),
        };

        let mut unsorted = Vec::new();
        for (parent, manifest_entries) in &manifest.entries {
            for manifest_entry in manifest_entries {
                check_entry_name(&manifest_entry.name)?;
                let file_name =
                    entry_file_name(header.use_id_prefix, manifest_entry.id, &manifest_entry.name);
                let data = std::fs::read(dir.join(&file_name))?;
                let path = if parent.is_empty() {
                    manifest_entry.name.clone()
                } else {
                    format!("{parent}\\{}", manifest_entry.name)
                };
                unsorted.push((manifest_entry.id, path, data, manifest_entry.magic));
            }
        }
        unsorted.sort_by_key(|(id, ..)| *id);

        let has_id = flags::has_id(header.magic);
        let mut binder = Self::from_fields(
            BinderFields {
                signature: header.signature,
                magic: header.magic,
                big_endian: header.big_endian,
                dcx_magic: header.dcx_magic,
            },
            variant,
        );
        for (id, path, data, magic) in unsorted {
            let id = has_id.then_some(id);
            binder.add_entry(BinderEntry::with_magic(data, id, Some(path), magic))?;
        }

        debug!(
            dir = %dir.display(),
            entry_count = binder.entry_count(),
            "loaded unpacked binder"
        );
        Ok(binder)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_v4() -> Binder {
        let mut binder = Binder::new_v4("07D7R6", 0x74);
        if let BinderVariant::V4(v4) = &mut binder.variant {
            v4.utf16_paths = true;
            v4.hash_table_type = 4;
        }
        binder.fields.dcx_magic = Some(DcxMagic(36, 68));
        binder
            .add_entry(BinderEntry::new(
                b"model".to_vec(),
                Some(200),
                Some("N:\\chr\\c0000\\c0000.flver".into()),
            ))
            .unwrap();
        binder
            .add_entry(BinderEntry::with_magic(
                b"anims".to_vec(),
                Some(100),
                Some("N:\\chr\\c0000\\c0000.anibnd".into()),
                0xC0,
            ))
            .unwrap();
        binder
    }

    #[test]
    fn test_manifest_header_v3() {
        let binder = Binder::new_v3("sig", 0x54);
        let header = binder.manifest_header();
        assert_eq!(header.version, "BND3");
        assert_eq!(header.unknown, Some(false));
        assert_eq!(header.utf16_paths, None);

        let json = serde_json::to_value(&header).unwrap();
        assert!(json.get("flag1").is_none());
        assert_eq!(json["dcx_magic"], serde_json::json!([]));
    }

    #[test]
    fn test_round_trip_through_directory() {
        let temp = TempDir::new().unwrap();
        let binder = sample_v4();
        binder.write_unpacked_dir(temp.path()).unwrap();

        assert_eq!(std::fs::read(temp.path().join("c0000.flver")).unwrap(), b"model");
        assert_eq!(manifest_version(temp.path()).unwrap(), BinderVersion::V4);

        let loaded = Binder::load_unpacked_dir(temp.path()).unwrap();
        assert_eq!(loaded.fields, binder.fields);
        assert_eq!(loaded.variant, binder.variant);

        // Entries come back in ID order
        let ids: Vec<_> = loaded.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![Some(100), Some(200)]);
        assert_eq!(loaded.get(100).unwrap(), binder.get(100).unwrap());
        assert_eq!(loaded.get(200).unwrap(), binder.get(200).unwrap());
    }

    #[test]
    fn test_load_from_manifest_file() {
        let temp = TempDir::new().unwrap();
        sample_v4().write_unpacked_dir(temp.path()).unwrap();
        let loaded = Binder::load_unpacked_dir(temp.path().join(MANIFEST_FILE_NAME)).unwrap();
        assert_eq!(loaded.entry_count(), 2);
    }

    #[test]
    fn test_repeated_names_use_id_prefix() {
        let temp = TempDir::new().unwrap();
        let mut binder = Binder::new_v3("", 0x74);
        binder
            .add_entry(BinderEntry::new(b"a".to_vec(), Some(1), Some("x\\item.fmg".into())))
            .unwrap();
        binder
            .add_entry(BinderEntry::new(b"b".to_vec(), Some(2), Some("y\\item.fmg".into())))
            .unwrap();
        binder.write_unpacked_dir(temp.path()).unwrap();

        assert_eq!(std::fs::read(temp.path().join("__1__item.fmg")).unwrap(), b"a");
        assert_eq!(std::fs::read(temp.path().join("__2__item.fmg")).unwrap(), b"b");

        let loaded = Binder::load_unpacked_dir(temp.path()).unwrap();
        assert_eq!(loaded.entries(), binder.entries());
    }

    #[test]
    fn test_index_used_as_id_without_id_flag() {
        let temp = TempDir::new().unwrap();
        let mut binder = Binder::new_v4("", 0x30);
        binder
            .add_entry(BinderEntry::new(b"z".to_vec(), None, Some("dir\\z.bin".into())))
            .unwrap();
        binder
            .add_entry(BinderEntry::new(b"a".to_vec(), None, Some("a.bin".into())))
            .unwrap();
        binder.write_unpacked_dir(temp.path()).unwrap();

        let text = std::fs::read_to_string(temp.path().join(MANIFEST_FILE_NAME)).unwrap();
        let manifest: BinderManifest = serde_json::from_str(&text).unwrap();
        assert_eq!(manifest.entries["dir"][0].id, 0);
        assert_eq!(manifest.entries[""][0].id, 1);

        let loaded = Binder::load_unpacked_dir(temp.path()).unwrap();
        assert_eq!(loaded.entries(), binder.entries());
    }

    #[test]
    fn test_unpack_requires_paths() {
        let temp = TempDir::new().unwrap();
        let mut binder = Binder::new_v3("", flags::IDS);
        binder
            .add_entry(BinderEntry::new(b"x".to_vec(), Some(0), None))
            .unwrap();
        assert!(matches!(
            binder.write_unpacked_dir(temp.path()),
            Err(BinderError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_bad_entry_leaves_no_files() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let mut binder = Binder::new_v3("", 0x74);
        binder
            .add_entry(BinderEntry::new(b"a".to_vec(), Some(1), Some("x\\a.bin".into())))
            .unwrap();
        binder
            .add_entry(BinderEntry::new(b"b".to_vec(), None, Some("x\\b.bin".into())))
            .unwrap();
        assert!(matches!(
            binder.write_unpacked_dir(&out),
            Err(BinderError::MissingEntryId(1))
        ));
        assert!(!out.exists());

        binder.remove_entry("b.bin").unwrap();
        binder
            .add_entry(BinderEntry::new(b"c".to_vec(), Some(3), Some("x\\..".into())))
            .unwrap();
        assert!(matches!(
            binder.write_unpacked_dir(&out),
            Err(BinderError::StructuralInconsistency(_))
        ));
        assert!(!out.exists());
    }

    #[test]
    fn test_load_rejects_escaping_names() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("secret.bin"), b"outside").unwrap();
        let dir = temp.path().join("unpacked");
        std::fs::create_dir(&dir).unwrap();

        for name in ["../secret.bin", "..", "sub\\x.bin"] {
            let manifest = serde_json::json!({
                "version": "BND3", "signature": "", "magic": 0x74, "big_endian": false,
                "unknown": false, "use_id_prefix": false, "dcx_magic": [],
                "entries": { "x": [{ "id": 0, "magic": 64, "name": name }] }
            });
            std::fs::write(dir.join(MANIFEST_FILE_NAME), manifest.to_string()).unwrap();
            assert!(matches!(
                Binder::load_unpacked_dir(&dir),
                Err(BinderError::StructuralInconsistency(_))
            ));
        }
    }

    #[test]
    fn test_negative_magic_is_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(MANIFEST_FILE_NAME),
            r#"{"version": "BND3", "signature": "", "magic": -116, "big_endian": false,
                "use_id_prefix": false, "dcx_magic": [], "entries": {}}"#,
        )
        .unwrap();
        assert!(matches!(
            Binder::load_unpacked_dir(temp.path()),
            Err(BinderError::Json(_))
        ));
    }

    #[test]
    fn test_bad_manifest_version() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(MANIFEST_FILE_NAME),
            r#"{"version": "BND5", "signature": "", "magic": 0, "big_endian": false,
                "use_id_prefix": false, "dcx_magic": [], "entries": {}}"#,
        )
        .unwrap();
        assert!(matches!(
            Binder::load_unpacked_dir(temp.path()),
            Err(BinderError::FormatMismatch { .. })
        ));
    }
}
