//! BND4 path hash table
//!
//! Some BND4 binders carry a table of hashed entry paths that the engine uses
//! for lookups. It is not needed to read entries, but it must be rebuilt when
//! the entry count or any path changes.
//!
//! Layout (always little-endian):
//!
//! ```text
//! header:  pad[8], path_hashes_offset: i64, group_count: u32, tag: i32
//! groups:  { length: i32, start_index: i32 } x group_count
//! hashes:  { hashed_value: u32, entry_index: i32 } x entry_count
//! ```

use crate::entry::BinderEntry;
use crate::error::{BinderError, Result};
use binrw::{BinRead, BinWrite, io::Cursor};
use tracing::debug;

/// Fixed tag stored in the hash table header
pub const HASH_TABLE_TAG: i32 = 0x0008_0810;

/// Size in bytes of the hash table header
pub const HASH_TABLE_HEADER_SIZE: usize = 24;

/// Size in bytes of one group or path hash record
const HASH_RECORD_SIZE: usize = 8;

/// Hash table header record
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct HashTableHeader {
    /// Offset of the path hash array, relative to the start of the table
    #[brw(pad_before = 8)]
    pub path_hashes_offset: i64,
    /// Number of hash groups
    pub group_count: u32,
    /// Always [`HASH_TABLE_TAG`]
    #[br(assert(tag == HASH_TABLE_TAG, "unexpected hash table tag 0x{:08x}", tag))]
    pub tag: i32,
}

/// Contiguous range of the path hash array belonging to one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct HashGroup {
    /// Number of hashes in the group
    pub length: i32,
    /// Index of the group's first hash
    pub start_index: i32,
}

/// Hashed path and the index of its entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct PathHash {
    /// Path hash value
    pub hashed_value: u32,
    /// Entry index in binder order
    pub entry_index: i32,
}

/// Decoded hash table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTable {
    /// Groups, one per bucket
    pub groups: Vec<HashGroup>,
    /// Flattened bucket-ordered hashes
    pub path_hashes: Vec<PathHash>,
}

impl HashTable {
    /// Build the table for the given entries, in binder order
    pub fn build(entries: &[BinderEntry]) -> Result<Self> {
        let group_count = group_count_for(entries.len());
        debug!(
            entry_count = entries.len(),
            group_count, "building BND4 path hash table"
        );

        let mut buckets: Vec<Vec<PathHash>> = vec![Vec::new(); group_count as usize];
        for (entry_index, entry) in entries.iter().enumerate() {
            let hashed_value = path_hash(entry.path()?);
            let entry_index = i32::try_from(entry_index).map_err(|_| {
                BinderError::StructuralInconsistency(format!(
                    "entry index {entry_index} does not fit in the hash table"
                ))
            })?;
            buckets[(hashed_value % group_count) as usize].push(PathHash {
                hashed_value,
                entry_index,
            });
        }

        let mut groups = Vec::with_capacity(buckets.len());
        let mut path_hashes = Vec::with_capacity(entries.len());
        for mut bucket in buckets {
            bucket.sort_by_key(|hash| hash.hashed_value);
            groups.push(HashGroup {
                length: bucket.len() as i32,
                start_index: path_hashes.len() as i32,
            });
            path_hashes.extend(bucket);
        }

        Ok(Self {
            groups,
            path_hashes,
        })
    }

    /// Parse a table previously captured from a binder
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let header = HashTableHeader::read(&mut cursor)?;

        let group_count = header.group_count as usize;
        let groups_len = group_count.saturating_mul(HASH_RECORD_SIZE);
        if groups_len > data.len().saturating_sub(HASH_TABLE_HEADER_SIZE) {
            return Err(BinderError::Truncated {
                what: "hash groups",
                offset: HASH_TABLE_HEADER_SIZE as u64,
                length: groups_len as u64,
            });
        }

        let mut groups = Vec::with_capacity(group_count);
        let mut hash_count = 0usize;
        for _ in 0..header.group_count {
            let group = HashGroup::read(&mut cursor)?;
            let length = usize::try_from(group.length).map_err(|_| {
                BinderError::StructuralInconsistency(format!(
                    "negative hash group length {}",
                    group.length
                ))
            })?;
            hash_count = hash_count.saturating_add(length);
            groups.push(group);
        }

        let path_hashes_offset = u64::try_from(header.path_hashes_offset).map_err(|_| {
            BinderError::StructuralInconsistency(format!(
                "negative path hash offset {}",
                header.path_hashes_offset
            ))
        })?;
        let hashes_len = hash_count.saturating_mul(HASH_RECORD_SIZE);
        let available = usize::try_from(path_hashes_offset)
            .map_or(0, |offset| data.len().saturating_sub(offset));
        if hashes_len > available {
            return Err(BinderError::Truncated {
                what: "path hashes",
                offset: path_hashes_offset,
                length: hashes_len as u64,
            });
        }
        cursor.set_position(path_hashes_offset);
        let mut path_hashes = Vec::with_capacity(hash_count);
        for _ in 0..hash_count {
            path_hashes.push(PathHash::read(&mut cursor)?);
        }

        Ok(Self {
            groups,
            path_hashes,
        })
    }

    /// Serialize the table
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = HashTableHeader {
            path_hashes_offset: (HASH_TABLE_HEADER_SIZE + self.groups.len() * HASH_RECORD_SIZE) as i64,
            group_count: self.groups.len() as u32,
            tag: HASH_TABLE_TAG,
        };

        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor)?;
        for group in &self.groups {
            group.write(&mut cursor)?;
        }
        for hash in &self.path_hashes {
            hash.write(&mut cursor)?;
        }
        Ok(cursor.into_inner())
    }

    /// Entry index for a path, if the table contains it
    pub fn lookup(&self, path: &str) -> Option<usize> {
        let hashed_value = path_hash(path);
        let group_count = u32::try_from(self.groups.len()).ok().filter(|&n| n > 0)?;
        let group = self.groups[(hashed_value % group_count) as usize];
        let start = usize::try_from(group.start_index).ok()?;
        let length = usize::try_from(group.length).ok()?;
        self.path_hashes
            .get(start..start + length)?
            .iter()
            .find(|hash| hash.hashed_value == hashed_value)
            .and_then(|hash| usize::try_from(hash.entry_index).ok())
    }
}

/// Build and serialize the hash table for the given entries
pub fn build_hash_table(entries: &[BinderEntry]) -> Result<Vec<u8>> {
    HashTable::build(entries)?.to_bytes()
}

/// Hash an entry path
///
/// Separators are normalized to `/` and a leading `/` is ensured, then
/// `sum(i * 37 + c_i)` is accumulated over the characters with `u32`
/// wrap-around.
pub fn path_hash(path: &str) -> u32 {
    let normalized = path.replace('\\', "/");
    let prefix = (!normalized.starts_with('/')).then_some('/');
    prefix
        .into_iter()
        .chain(normalized.chars())
        .enumerate()
        .fold(0u32, |hash, (i, c)| {
            hash.wrapping_add((i as u32).wrapping_mul(37))
                .wrapping_add(u32::from(c))
        })
}

/// Smallest prime that is at least `entry_count / 7`
pub fn group_count_for(entry_count: usize) -> u32 {
    let start = u32::try_from(entry_count / 7).unwrap_or(u32::MAX);
    (start..=u32::MAX).find(|&p| is_prime(p)).unwrap_or(start)
}

/// Trial division by odd numbers up to the square root
pub fn is_prime(p: u32) -> bool {
    if p < 2 {
        return false;
    }
    if p == 2 {
        return true;
    }
    if p % 2 == 0 {
        return false;
    }
    let p = u64::from(p);
    let mut i = 3u64;
    while i * i <= p {
        if p % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}
