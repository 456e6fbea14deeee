//! Log-structured ordered collection.
//!
//! Every `set` and `delete` is appended to a [`StorageBackend`] as one
//! self-checking record; the ordered index lives in memory and is rebuilt by
//! replaying the log on open.
//!
//! # Record format
//!
//! ```text
//! ┌─────┬──────────┬────────────┬─────┬───────┬───────┐
//! │ tag │ key_len  │ value_len  │ key │ value │ crc32 │
//! │ u8  │ u32 (LE) │ u32 (LE)   │     │       │ (LE)  │
//! └─────┴──────────┴────────────┴─────┴───────┴───────┘
//! ```
//!
//! The CRC covers every byte before it. A record that fails to decode during
//! replay marks a torn tail: the log is truncated at that offset.

use crate::backend::StorageBackend;
use crate::btree::visit_range;
use crate::collection::{Collection, CollectionFactory, Visitor};
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TAG_SET: u8 = 1;
const TAG_DELETE: u8 = 2;
const HEADER_LEN: usize = 9;
const CRC_LEN: usize = 4;

/// Largest key or value a log record can carry.
pub const MAX_FIELD_LEN: usize = u32::MAX as usize;

struct DecodedRecord<'a> {
    tag: u8,
    key: &'a [u8],
    value: &'a [u8],
}

fn encode_record(tag: u8, key: &[u8], value: &[u8]) -> StorageResult<Vec<u8>> {
    for field in [key, value] {
        if field.len() > MAX_FIELD_LEN {
            return Err(StorageError::RecordTooLarge {
                len: field.len(),
                max: MAX_FIELD_LEN,
            });
        }
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + key.len() + value.len() + CRC_LEN);
    buf.push(tag);
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    let crc = compute_crc32(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

/// Decodes the record at the start of `buf`, returning it and its length.
fn decode_record(buf: &[u8], offset: u64) -> StorageResult<(DecodedRecord<'_>, usize)> {
    if buf.len() < HEADER_LEN {
        return Err(StorageError::corrupted(offset, "truncated header"));
    }
    let tag = buf[0];
    if tag != TAG_SET && tag != TAG_DELETE {
        return Err(StorageError::corrupted(offset, format!("unknown tag {tag}")));
    }

    let key_len = read_u32(buf, 1) as usize;
    let value_len = read_u32(buf, 5) as usize;
    let body_end = HEADER_LEN
        .checked_add(key_len)
        .and_then(|n| n.checked_add(value_len))
        .ok_or_else(|| StorageError::corrupted(offset, "length overflow"))?;
    let total = body_end + CRC_LEN;
    if buf.len() < total {
        return Err(StorageError::corrupted(offset, "truncated record"));
    }

    let expected = read_u32(buf, body_end);
    let actual = compute_crc32(&buf[..body_end]);
    if expected != actual {
        return Err(StorageError::corrupted(
            offset,
            format!("checksum mismatch: expected {expected:08x}, got {actual:08x}"),
        ));
    }

    let key_end = HEADER_LEN + key_len;
    Ok((
        DecodedRecord {
            tag,
            key: &buf[HEADER_LEN..key_end],
            value: &buf[key_end..body_end],
        },
        total,
    ))
}

/// Computes the IEEE CRC32 of `data`.
fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}

/// An ordered collection persisted as an append log.
///
/// Writes are serialized on the backend lock; the index lock is taken after
/// the record is in the log, so the index never runs ahead of it.
///
/// # Example
///
/// ```rust
/// use vbkv_storage::{Collection, InMemoryBackend, LogCollection};
///
/// let coll = LogCollection::open(InMemoryBackend::new(), false).unwrap();
/// coll.set(b"k", b"v").unwrap();
///
/// let reopened = LogCollection::open(coll.into_backend(), false).unwrap();
/// assert_eq!(reopened.get(b"k").unwrap(), Some(b"v".to_vec()));
/// ```
pub struct LogCollection<B: StorageBackend> {
    backend: Mutex<B>,
    index: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    sync_on_write: bool,
}

impl<B: StorageBackend> LogCollection<B> {
    /// Opens a collection over `backend`, replaying any records it holds.
    ///
    /// A torn or corrupt tail is cut off and logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or truncated.
    pub fn open(mut backend: B, sync_on_write: bool) -> StorageResult<Self> {
        let size = backend.size()?;
        let data = backend.read_at(0, size as usize)?;

        let mut index = BTreeMap::new();
        let mut offset = 0usize;
        let mut records = 0usize;
        while offset < data.len() {
            match decode_record(&data[offset..], offset as u64) {
                Ok((record, len)) => {
                    if record.tag == TAG_SET {
                        index.insert(record.key.to_vec(), record.value.to_vec());
                    } else {
                        index.remove(record.key);
                    }
                    offset += len;
                    records += 1;
                }
                Err(err) => {
                    warn!(%err, offset, size, "truncating torn log tail");
                    backend.truncate(offset as u64)?;
                    break;
                }
            }
        }
        debug!(records, keys = index.len(), "log replayed");

        Ok(Self {
            backend: Mutex::new(backend),
            index: RwLock::new(index),
            sync_on_write,
        })
    }

    /// Returns the size of the log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn log_size(&self) -> StorageResult<u64> {
        self.backend.lock().size()
    }

    /// Consumes the collection, returning its backend.
    pub fn into_backend(self) -> B {
        self.backend.into_inner()
    }

    fn append(&self, backend: &mut B, record: &[u8]) -> StorageResult<()> {
        backend.append(record)?;
        if self.sync_on_write {
            backend.sync()?;
        }
        Ok(())
    }
}

impl LogCollection<InMemoryBackend> {
    /// Opens an empty log over an in-memory backend.
    pub fn in_memory() -> Self {
        Self {
            backend: Mutex::new(InMemoryBackend::new()),
            index: RwLock::new(BTreeMap::new()),
            sync_on_write: false,
        }
    }
}

impl<B: StorageBackend> Collection for LogCollection<B> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.index.read().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let record = encode_record(TAG_SET, key, value)?;
        let mut backend = self.backend.lock();
        self.append(&mut backend, &record)?;
        self.index.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> StorageResult<bool> {
        let mut backend = self.backend.lock();
        if !self.index.read().contains_key(key) {
            return Ok(false);
        }
        let record = encode_record(TAG_DELETE, key, &[])?;
        self.append(&mut backend, &record)?;
        self.index.write().remove(key);
        Ok(true)
    }

    fn visit_ascend(&self, start: &[u8], visitor: &mut Visitor<'_>) -> StorageResult<()> {
        visit_range(&self.index.read(), start, visitor);
        Ok(())
    }

    fn len(&self) -> usize {
        self.index.read().len()
    }
}

impl<B: StorageBackend> std::fmt::Debug for LogCollection<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCollection")
            .field("keys", &self.len())
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

/// Factory placing one log file per partition instance under a directory.
#[derive(Debug, Clone)]
pub struct LogFileFactory {
    dir: PathBuf,
    sync_on_write: bool,
}

impl LogFileFactory {
    /// Creates a factory writing `<name>.log` files under `dir`.
    pub fn new(dir: impl Into<PathBuf>, sync_on_write: bool) -> Self {
        Self {
            dir: dir.into(),
            sync_on_write,
        }
    }

    /// Returns the directory holding the log files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CollectionFactory for LogFileFactory {
    fn open(&self, name: &str) -> StorageResult<Box<dyn Collection>> {
        let path = self.dir.join(format!("{name}.log"));
        let backend = FileBackend::open_with_create_dirs(&path)?;
        debug!(path = %path.display(), "opening log collection");
        Ok(Box::new(LogCollection::open(backend, self.sync_on_write)?))
    }

    fn existing(&self) -> StorageResult<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("log") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        let path = self.dir.join(format!("{name}.log"));
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed log collection");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn remove_all(&self) -> StorageResult<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                debug!(dir = %self.dir.display(), "removed log directory");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
