//! Generic fixed-slot record store

use super::paged_file::PagedFile;
use super::records::{NO_ID, StoreRecord};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// A store of fixed-size records of one type
///
/// Reads never fail for ids past the end of the file: such slots read as
/// an empty, unused record. Reading [`NO_ID`] is a caller bug and errors.
pub struct RecordStore<R: StoreRecord> {
    name: String,
    file: RwLock<PagedFile>,
    /// One past the highest slot ever written; readers and scans stop here
    high_id: AtomicU64,
    /// One past the highest slot handed out by `next_id`
    allocated: AtomicU64,
    /// Ids released by deletions, reused LIFO by `next_id`
    free_ids: Mutex<Vec<u64>>,
    _record: PhantomData<fn() -> R>,
}

impl<R: StoreRecord> RecordStore<R> {
    /// Open or create a store file
    ///
    /// On an existing file the high id is recovered from the highest
    /// in-use slot.
    pub fn open<P: AsRef<Path>>(path: P, initial_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = PagedFile::open(path, initial_size.max(R::RECORD_SIZE))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| R::STORE_NAME.to_string());

        let high_id = Self::recover_high_id(&file);
        tracing::debug!(store = %name, high_id, "record store opened");

        Ok(Self {
            name,
            file: RwLock::new(file),
            high_id: AtomicU64::new(high_id),
            allocated: AtomicU64::new(high_id),
            free_ids: Mutex::new(Vec::new()),
            _record: PhantomData,
        })
    }

    fn recover_high_id(file: &PagedFile) -> u64 {
        let slots = file.size() / R::RECORD_SIZE;
        for slot in (0..slots).rev() {
            if let Some(bytes) = file.slice(slot * R::RECORD_SIZE, R::RECORD_SIZE) {
                let record: R = bytemuck::pod_read_unaligned(bytes);
                if record.in_use() {
                    return slot as u64 + 1;
                }
            }
        }
        0
    }

    /// File name of this store
    pub fn name(&self) -> &str {
        &self.name
    }

    fn offset(&self, id: u64) -> Result<usize> {
        if id == NO_ID {
            return Err(Error::storage(format!("{}: read of the null id", self.name)));
        }
        usize::try_from(id)
            .ok()
            .and_then(|slot| slot.checked_mul(R::RECORD_SIZE))
            .ok_or_else(|| Error::storage(format!("{}: id {} out of range", self.name, id)))
    }

    /// Fill `record` with slot `id`, returning whether it is in use
    ///
    /// Unused slots are copied as they are, so a deleted record still
    /// exposes the pointers it had when it was deleted.
    pub fn read_into(&self, id: u64, record: &mut R) -> Result<bool> {
        let offset = self.offset(id)?;
        let file = self.file.read();
        match file.slice(offset, R::RECORD_SIZE) {
            Some(bytes) if id < self.high_id.load(Ordering::Acquire) => {
                *record = bytemuck::pod_read_unaligned(bytes);
            }
            _ => *record = R::empty(),
        }
        Ok(record.in_use())
    }

    /// Read slot `id`, in use or not
    pub fn read_raw(&self, id: u64) -> Result<R> {
        let mut record = R::empty();
        self.read_into(id, &mut record)?;
        Ok(record)
    }

    /// Read slot `id` if it is in use
    pub fn read_slot(&self, id: u64) -> Result<Option<R>> {
        let mut record = R::empty();
        Ok(self.read_into(id, &mut record)?.then_some(record))
    }

    /// Whether slot `id` holds an in-use record
    pub fn is_in_use(&self, id: u64) -> Result<bool> {
        let mut record = R::empty();
        self.read_into(id, &mut record)
    }

    /// Write `record` to slot `id`, growing the file when needed
    pub fn write(&self, id: u64, record: &R) -> Result<()> {
        let offset = self.offset(id)?;
        let mut file = self.file.write();
        file.ensure_capacity(offset + R::RECORD_SIZE)?;
        file.slice_mut(offset, R::RECORD_SIZE)?
            .copy_from_slice(bytemuck::bytes_of(record));
        self.allocated.fetch_max(id + 1, Ordering::AcqRel);
        // published only once the slot holds the record
        self.high_id.fetch_max(id + 1, Ordering::AcqRel);
        tracing::trace!(store = %self.name, id, in_use = record.in_use(), "record written");
        Ok(())
    }

    /// Allocate an id, reusing freed ids first
    ///
    /// The slot stays invisible to readers until it is written.
    pub fn next_id(&self) -> u64 {
        if let Some(id) = self.free_ids.lock().pop() {
            return id;
        }
        self.allocated.fetch_add(1, Ordering::AcqRel)
    }

    /// Return an id to the free list
    pub fn free_id(&self, id: u64) {
        self.free_ids.lock().push(id);
    }

    /// One past the highest id ever written; scans stop here
    pub fn high_id(&self) -> u64 {
        self.high_id.load(Ordering::Acquire)
    }

    /// Highest id that may be in use, or `None` for an empty store
    pub fn highest_id_in_use(&self) -> Option<u64> {
        self.high_id().checked_sub(1)
    }

    /// Current file size in bytes
    pub fn file_size(&self) -> usize {
        self.file.read().size()
    }

    /// Flush to disk
    pub fn flush(&self) -> Result<()> {
        self.file.write().flush()
    }
}

impl<R: StoreRecord> std::fmt::Debug for RecordStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("name", &self.name)
            .field("high_id", &self.high_id())
            .finish()
    }
}
