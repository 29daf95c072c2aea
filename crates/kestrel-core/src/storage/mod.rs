//! Record storage layer
//!
//! Seven memory-mapped store files, one record type each:
//!
//! - nodes.store: [`NodeRecord`]
//! - rels.store: [`RelationshipRecord`]
//! - groups.store: [`RelationshipGroupRecord`]
//! - props.store: [`PropertyRecord`]
//! - strings.store, arrays.store, labels.store: [`DynamicRecord`]

mod paged_file;
pub mod record_store;
pub mod records;
pub mod row_lock;

pub use record_store::RecordStore;
pub use records::{
    DYNAMIC_DATA_SIZE, DynamicRecord, NO_ID, NodeRecord, PropertyRecord, RelationshipDirection,
    RelationshipGroupRecord, RelationshipRecord, StoreRecord,
};
pub use row_lock::{EntityLockGuard, LockService, LockStats, NoOpLockService, ResourceId, RowLockService};

use crate::Result;
use crate::config::StoreConfig;
use std::path::{Path, PathBuf};

/// Every store file of one database directory
#[derive(Debug)]
pub struct RecordStores {
    data_dir: PathBuf,
    /// Node store (nodes.store)
    pub nodes: RecordStore<NodeRecord>,
    /// Relationship store (rels.store)
    pub relationships: RecordStore<RelationshipRecord>,
    /// Relationship group store (groups.store)
    pub groups: RecordStore<RelationshipGroupRecord>,
    /// Property store (props.store)
    pub properties: RecordStore<PropertyRecord>,
    /// Long string payloads (strings.store)
    pub strings: RecordStore<DynamicRecord>,
    /// Array payloads (arrays.store)
    pub arrays: RecordStore<DynamicRecord>,
    /// Overflowed node label sets (labels.store)
    pub labels: RecordStore<DynamicRecord>,
}

impl RecordStores {
    /// Open or create all stores under `data_dir`
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use kestrel_core::config::StoreConfig;
    /// use kestrel_core::storage::RecordStores;
    ///
    /// let stores = RecordStores::open("./data", &StoreConfig::default()).unwrap();
    /// assert_eq!(stores.stats().node_high_id, 0);
    /// ```
    pub fn open<P: AsRef<Path>>(data_dir: P, config: &StoreConfig) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        let size = config.initial_file_size;

        let stores = Self {
            nodes: RecordStore::open(data_dir.join("nodes.store"), size)?,
            relationships: RecordStore::open(data_dir.join("rels.store"), size)?,
            groups: RecordStore::open(data_dir.join("groups.store"), size)?,
            properties: RecordStore::open(data_dir.join("props.store"), size)?,
            strings: RecordStore::open(data_dir.join("strings.store"), size)?,
            arrays: RecordStore::open(data_dir.join("arrays.store"), size)?,
            labels: RecordStore::open(data_dir.join("labels.store"), size)?,
            data_dir,
        };
        tracing::info!(dir = %stores.data_dir.display(), "record stores opened");
        Ok(stores)
    }

    /// Directory holding the store files
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Flush all stores to disk
    pub fn flush(&self) -> Result<()> {
        self.nodes.flush()?;
        self.relationships.flush()?;
        self.groups.flush()?;
        self.properties.flush()?;
        self.strings.flush()?;
        self.arrays.flush()?;
        self.labels.flush()?;
        Ok(())
    }

    /// High ids and file sizes of every store
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            node_high_id: self.nodes.high_id(),
            relationship_high_id: self.relationships.high_id(),
            group_high_id: self.groups.high_id(),
            property_high_id: self.properties.high_id(),
            total_file_size: self.nodes.file_size()
                + self.relationships.file_size()
                + self.groups.file_size()
                + self.properties.file_size()
                + self.strings.file_size()
                + self.arrays.file_size()
                + self.labels.file_size(),
        }
    }
}

/// Record store statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// One past the highest node id
    pub node_high_id: u64,
    /// One past the highest relationship id
    pub relationship_high_id: u64,
    /// One past the highest relationship group id
    pub group_high_id: u64,
    /// One past the highest property record id
    pub property_high_id: u64,
    /// Combined size of all store files in bytes
    pub total_file_size: usize,
}
