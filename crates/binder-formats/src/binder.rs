//! Binder archive and its entry collection

use crate::bnd3;
use crate::bnd4;
use crate::dcx::DcxMagic;
use crate::entry::BinderEntry;
use crate::entry_header::BinderVersion;
use crate::error::{BinderError, Result};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Binder magic used when none is given: IDs, both name flags and
/// uncompressed sizes
pub const DEFAULT_BINDER_MAGIC: u8 = 0x74;

/// Fields shared by every binder version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderFields {
    /// Free-form signature, at most 8 bytes on disk
    pub signature: String,
    /// Binder magic, see [`crate::flags`]
    pub magic: u8,
    /// Byte order of the header tail and entry records
    pub big_endian: bool,
    /// DCX compression family to restore when writing to a file
    pub dcx_magic: Option<DcxMagic>,
}

/// BND3-specific header fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bnd3Fields {
    /// Unknown header flag
    pub unknown: bool,
}

/// BND4-specific header fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bnd4Fields {
    /// Unknown header flag
    pub flag1: bool,
    /// Unknown header flag
    pub flag2: bool,
    /// Paths are UTF-16 in the binder's byte order
    pub utf16_paths: bool,
    /// 4 when the binder carries a path hash table
    pub hash_table_type: u8,
    /// Offset of the hash table as last read or written
    pub hash_table_offset: u64,
    /// Hash table bytes and the entry snapshot they were built from
    pub hash_table_cache: Option<HashTableCache>,
}

/// Raw hash table bytes remembered between unpack and pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTableCache {
    /// Serialized hash table
    pub bytes: Vec<u8>,
    /// Entry count when the bytes were produced
    pub entry_count: usize,
    /// Entry paths, in binder order, when the bytes were produced
    pub paths: Vec<Option<String>>,
}

impl HashTableCache {
    /// Remember `bytes` as the table for `entries`
    pub fn capture(bytes: Vec<u8>, entries: &[BinderEntry]) -> Self {
        Self {
            bytes,
            entry_count: entries.len(),
            paths: entries.iter().map(|entry| entry.path.clone()).collect(),
        }
    }

    /// True when the entry count or any path differs from the snapshot
    pub fn is_stale(&self, entries: &[BinderEntry]) -> bool {
        self.entry_count != entries.len()
            || self
                .paths
                .iter()
                .zip(entries)
                .any(|(cached, entry)| cached.as_deref() != entry.path.as_deref())
    }
}

/// Version-specific part of a binder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinderVariant {
    /// BND3
    V3(Bnd3Fields),
    /// BND4
    V4(Bnd4Fields),
}

impl BinderVariant {
    /// Binder version of this variant
    pub const fn version(&self) -> BinderVersion {
        match self {
            Self::V3(_) => BinderVersion::V3,
            Self::V4(_) => BinderVersion::V4,
        }
    }
}

/// Key for entry lookup: an entry ID, or a path or basename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKey<'a> {
    /// Entry ID
    Id(i32),
    /// Full path, falling back to basename
    Name(&'a str),
}

impl From<i32> for EntryKey<'_> {
    fn from(id: i32) -> Self {
        Self::Id(id)
    }
}

impl<'a> From<&'a str> for EntryKey<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

/// A BND3 or BND4 binder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binder {
    /// Shared header fields
    pub fields: BinderFields,
    /// Version-specific header fields
    pub variant: BinderVariant,
    entries: Vec<BinderEntry>,
}

impl Default for Binder {
    /// Empty BND4 binder
    fn default() -> Self {
        Self::new_v4(String::new(), DEFAULT_BINDER_MAGIC)
    }
}

impl Binder {
    /// Binder with the given header fields and no entries
    pub const fn from_fields(fields: BinderFields, variant: BinderVariant) -> Self {
        Self {
            fields,
            variant,
            entries: Vec::new(),
        }
    }

    /// Empty little-endian BND3 binder
    pub fn new_v3(signature: impl Into<String>, magic: u8) -> Self {
        Self::from_fields(
            Self::default_fields(signature.into(), magic),
            BinderVariant::V3(Bnd3Fields::default()),
        )
    }

    /// Empty little-endian BND4 binder without a hash table
    pub fn new_v4(signature: impl Into<String>, magic: u8) -> Self {
        Self::from_fields(
            Self::default_fields(signature.into(), magic),
            BinderVariant::V4(Bnd4Fields::default()),
        )
    }

    const fn default_fields(signature: String, magic: u8) -> BinderFields {
        BinderFields {
            signature,
            magic,
            big_endian: false,
            dcx_magic: None,
        }
    }

    /// Parse a BND3 or BND4 binder from raw (non-DCX) bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        match data.get(..4) {
            Some(tag) if tag == BinderVersion::V3.tag() => bnd3::unpack(data),
            Some(tag) if tag == BinderVersion::V4.tag() => bnd4::unpack(data),
            _ => Err(BinderError::UnknownFormat),
        }
    }

    /// Pack the binder into raw (non-DCX) bytes
    ///
    /// A BND4 hash table cache is refreshed as a side effect.
    pub fn pack(&mut self) -> Result<Vec<u8>> {
        if self.fields.signature.len() > 8 {
            return Err(BinderError::SignatureTooLong(self.fields.signature.clone()));
        }
        match &mut self.variant {
            BinderVariant::V3(v3) => bnd3::pack(&self.fields, v3, &self.entries),
            BinderVariant::V4(v4) => bnd4::pack(&self.fields, v4, &self.entries),
        }
    }

    /// Binder version
    pub const fn version(&self) -> BinderVersion {
        self.variant.version()
    }

    /// Append an entry
    ///
    /// An entry equal to one already present is rejected. A repeated ID is
    /// allowed but logged, and makes [`Self::entries_by_id`] fail until fixed.
    pub fn add_entry(&mut self, entry: BinderEntry) -> Result<()> {
        if self.entries.contains(&entry) {
            return Err(BinderError::DuplicateEntry(format!(
                "entry with ID {:?} and path {:?} is already in this binder",
                entry.id, entry.path
            )));
        }
        if let Some(id) = entry.id
            && self.entries.iter().any(|existing| existing.id == Some(id))
        {
            warn!(
                entry_id = id,
                "Entry ID appears more than once in this binder"
            );
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Remove and return the entry selected by `key`
    pub fn remove_entry<'a>(&mut self, key: impl Into<EntryKey<'a>>) -> Result<BinderEntry> {
        let key = key.into();
        let target = self.get(key)?;
        let index = self
            .entries
            .iter()
            .position(|entry| std::ptr::eq(entry, target))
            .ok_or_else(|| BinderError::EntryNotFound(format!("{key:?}")))?;
        Ok(self.entries.remove(index))
    }

    /// Remove every entry
    pub fn clear_entries(&mut self) {
        self.entries.clear();
    }

    /// Entries in binder order
    pub fn entries(&self) -> &[BinderEntry] {
        &self.entries
    }

    /// Mutable entries; the count cannot change through this view
    pub fn entries_mut(&mut self) -> &mut [BinderEntry] {
        &mut self.entries
    }

    /// Number of entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Entries keyed by ID; entries without an ID are skipped
    pub fn entries_by_id(&self) -> Result<HashMap<i32, &BinderEntry>> {
        let mut by_id = HashMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            if let Some(id) = entry.id
                && by_id.insert(id, entry).is_some()
            {
                return Err(BinderError::DuplicateEntry(format!(
                    "there are multiple entries with ID {id}"
                )));
            }
        }
        Ok(by_id)
    }

    /// Entries keyed by full path; entries without a path are skipped
    pub fn entries_by_path(&self) -> Result<HashMap<&str, &BinderEntry>> {
        let mut by_path = HashMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            if let Some(path) = entry.path.as_deref()
                && by_path.insert(path, entry).is_some()
            {
                return Err(BinderError::DuplicateEntry(format!(
                    "path {path:?} appears in multiple entries"
                )));
            }
        }
        Ok(by_path)
    }

    /// Entries keyed by basename; entries without a path are skipped
    pub fn entries_by_basename(&self) -> Result<HashMap<&str, &BinderEntry>> {
        let mut by_name = HashMap::with_capacity(self.entries.len());
        for entry in self.entries.iter().filter(|entry| entry.path.is_some()) {
            let name = entry.name()?;
            if by_name.insert(name, entry).is_some() {
                return Err(BinderError::DuplicateEntry(format!(
                    "basename {name:?} appears in multiple entry paths"
                )));
            }
        }
        Ok(by_name)
    }

    /// Entry by ID, or by path and then basename
    pub fn get<'a>(&self, key: impl Into<EntryKey<'a>>) -> Result<&BinderEntry> {
        let key = key.into();
        let found = match key {
            EntryKey::Id(id) => self.entries_by_id()?.get(&id).copied(),
            EntryKey::Name(name) => match self.entries_by_path()?.get(name).copied() {
                Some(entry) => Some(entry),
                None => self.entries_by_basename()?.get(name).copied(),
            },
        };
        found.ok_or_else(|| BinderError::EntryNotFound(format!("{key:?}")))
    }

    /// True when two entries share a basename
    pub fn has_repeated_entry_names(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.entries.len());
        self.entries
            .iter()
            .filter_map(|entry| entry.name().ok())
            .any(|name| !seen.insert(name))
    }
}
