//! Node cursor

use super::CursorState;
use super::pool::PoolableCursor;
use super::progression::Progression;
use crate::property::dynamic::decode_label_buffer;
use crate::property::{DynamicChainReader, DynamicStoreKind};
use crate::storage::records::{NO_ID, NodeRecord, StoreRecord};
use crate::storage::RecordStores;
use crate::txstate::{EntityId, TransactionState};
use crate::Result;
use std::collections::VecDeque;
use std::sync::Arc;

const NAME: &str = "NodeCursor";

/// Cursor over node records
///
/// Bound to a single id with [`init_single`](Self::init_single) or to every
/// node with [`init_scan`](Self::init_scan). With a transaction attached,
/// nodes deleted in it are skipped and nodes created in it are yielded after
/// the committed ones.
#[derive(Debug, Default)]
pub struct NodeCursor {
    stores: Option<Arc<RecordStores>>,
    tx: Option<Arc<dyn TransactionState>>,
    progression: Progression,
    state: CursorState,
    record: NodeRecord,
    id: u64,
    added: VecDeque<u64>,
    transient: bool,
    label_buffer: Vec<u8>,
}

impl NodeCursor {
    /// Unbound cursor
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to node `id`
    pub fn init_single(
        &mut self,
        stores: Arc<RecordStores>,
        id: u64,
        tx: Option<Arc<dyn TransactionState>>,
    ) {
        self.bind(stores, tx);
        if id == NO_ID {
            self.progression = Progression::Done;
            return;
        }
        if self
            .tx
            .as_ref()
            .is_some_and(|tx| tx.is_added(EntityId::Node(id)))
        {
            self.progression = Progression::Done;
            self.added.push_back(id);
            return;
        }
        self.progression = Progression::SingleId { id };
    }

    /// Bind to every node in the store
    pub fn init_scan(&mut self, stores: Arc<RecordStores>, tx: Option<Arc<dyn TransactionState>>) {
        let high_id = stores.nodes.high_id();
        self.bind(stores, tx);
        self.progression = Progression::all_ids(high_id);
        if let Some(tx) = &self.tx {
            self.added.extend(tx.added_nodes());
        }
    }

    fn bind(&mut self, stores: Arc<RecordStores>, tx: Option<Arc<dyn TransactionState>>) {
        self.reset();
        self.stores = Some(stores);
        self.tx = tx;
        self.state = CursorState::Initialized;
    }

    /// Advance to the next node; false when the selection is exhausted
    pub fn next(&mut self) -> Result<bool> {
        self.state.check_bound(NAME)?;
        if self.state == CursorState::Exhausted {
            return Ok(false);
        }
        let Some(stores) = self.stores.clone() else {
            return Ok(false);
        };

        while let Some(id) = self.progression.next_scan_id(|| stores.nodes.high_id()) {
            if !stores.nodes.read_into(id, &mut self.record)? {
                continue;
            }
            if self
                .tx
                .as_ref()
                .is_some_and(|tx| tx.is_deleted(EntityId::Node(id)))
            {
                continue;
            }
            self.id = id;
            self.transient = false;
            self.state = CursorState::Positioned;
            return Ok(true);
        }

        if let Some(id) = self.added.pop_front() {
            self.record = NodeRecord::empty();
            self.record.set_in_use(true);
            self.id = id;
            self.transient = true;
            self.state = CursorState::Positioned;
            return Ok(true);
        }

        self.state = CursorState::Exhausted;
        Ok(false)
    }

    /// Id of the current node
    pub fn id(&self) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        Ok(self.id)
    }

    /// Whether the current node exists only in the attached transaction
    pub fn is_transient(&self) -> Result<bool> {
        self.state.check_positioned(NAME)?;
        Ok(self.transient)
    }

    /// Whether the current node stores relationships in groups
    pub fn is_dense(&self) -> Result<bool> {
        self.state.check_positioned(NAME)?;
        Ok(self.record.is_dense())
    }

    /// Head of the relationship chain (sparse) or group chain (dense)
    pub fn relationships_reference(&self) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        Ok(self.record.next_rel)
    }

    /// Head of the property chain
    pub fn properties_reference(&self) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        Ok(self.record.next_prop)
    }

    /// Label ids of the current node, ascending
    ///
    /// Overflowed label sets are read from the label store on each call.
    /// Label changes in the attached transaction are applied.
    pub fn labels(&mut self) -> Result<Vec<u32>> {
        self.state.check_positioned(NAME)?;
        let stored = if self.record.has_label_overflow() {
            let stores = self
                .stores
                .as_ref()
                .ok_or_else(|| crate::Error::invalid_state("NodeCursor has no store binding"))?;
            self.label_buffer.clear();
            stores.read_chain(DynamicStoreKind::Labels, self.record.labels, &mut self.label_buffer)?;
            let mut labels = decode_label_buffer(&self.label_buffer)?;
            labels.sort_unstable();
            labels
        } else {
            self.record.inline_labels()
        };
        Ok(match &self.tx {
            Some(tx) => tx.label_diff(self.id).apply(&stored),
            None => stored,
        })
    }

    /// Whether the current node carries `label`
    pub fn has_label(&mut self, label: u32) -> Result<bool> {
        Ok(self.labels()?.binary_search(&label).is_ok())
    }

    /// Release the store binding; safe to call in any state
    pub fn close(&mut self) {
        self.reset();
    }
}

impl PoolableCursor for NodeCursor {
    fn reset(&mut self) {
        self.stores = None;
        self.tx = None;
        self.progression = Progression::Done;
        self.state = CursorState::Closed;
        self.record = NodeRecord::empty();
        self.id = NO_ID;
        self.added.clear();
        self.transient = false;
        self.label_buffer.clear();
    }
}
