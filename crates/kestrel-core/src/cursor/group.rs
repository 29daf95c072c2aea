//! Relationship group cursor

use super::CursorState;
use super::pool::PoolableCursor;
use crate::storage::records::{
    NO_ID, NodeRecord, RelationshipDirection, RelationshipGroupRecord, RelationshipRecord,
    StoreRecord,
};
use crate::storage::{RecordStore, RecordStores};
use crate::{Error, Result};
use std::sync::Arc;

const NAME: &str = "RelationshipGroupCursor";

/// Cursor over the relationship groups of a dense node
///
/// Sparse nodes have no groups and yield nothing. Unused groups are skipped
/// but their `next` pointer is still followed.
#[derive(Debug, Default)]
pub struct RelationshipGroupCursor {
    stores: Option<Arc<RecordStores>>,
    state: CursorState,
    record: RelationshipGroupRecord,
    scratch: RelationshipRecord,
    id: u64,
    origin: u64,
    next: u64,
    visited: u64,
}

impl RelationshipGroupCursor {
    /// Unbound cursor
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the groups of `node`
    pub fn init(&mut self, stores: Arc<RecordStores>, node: u64) -> Result<()> {
        let mut node_record = NodeRecord::empty();
        let in_use = node != NO_ID && stores.nodes.read_into(node, &mut node_record)?;
        self.reset();
        self.next = if in_use { node_record.first_group() } else { NO_ID };
        self.origin = node;
        self.stores = Some(stores);
        self.state = CursorState::Initialized;
        Ok(())
    }

    /// Advance to the next group
    pub fn next(&mut self) -> Result<bool> {
        self.state.check_bound(NAME)?;
        let Some(stores) = self.stores.clone() else {
            return Ok(false);
        };
        while self.next != NO_ID {
            self.visited += 1;
            if self.visited > stores.groups.high_id() {
                return Err(Error::invalid_record(format!(
                    "Cycle detected in relationship group chain of node {}",
                    self.origin
                )));
            }
            let id = self.next;
            let in_use = stores.groups.read_into(id, &mut self.record)?;
            if self.record.owning_node != self.origin {
                tracing::warn!(group_id = id, node = self.origin, owner = self.record.owning_node, "foreign group in chain");
                return Err(Error::invalid_record(format!(
                    "Relationship group {} belongs to node {}, reached from node {}",
                    id, self.record.owning_node, self.origin
                )));
            }
            self.next = self.record.next;
            if in_use {
                self.id = id;
                self.state = CursorState::Positioned;
                return Ok(true);
            }
        }
        self.state = CursorState::Exhausted;
        Ok(false)
    }

    /// Id of the current group record
    pub fn id(&self) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        Ok(self.id)
    }

    /// Relationship type of the current group
    pub fn type_id(&self) -> Result<u32> {
        self.state.check_positioned(NAME)?;
        Ok(self.record.type_id)
    }

    /// Head of the outgoing chain
    pub fn outgoing_reference(&self) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        Ok(self.record.first_out)
    }

    /// Head of the incoming chain
    pub fn incoming_reference(&self) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        Ok(self.record.first_in)
    }

    /// Head of the loop chain
    pub fn loop_reference(&self) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        Ok(self.record.first_loop)
    }

    /// Length of the outgoing chain, read from its head
    pub fn outgoing_count(&mut self) -> Result<u64> {
        self.count(RelationshipDirection::Outgoing)
    }

    /// Length of the incoming chain, read from its head
    pub fn incoming_count(&mut self) -> Result<u64> {
        self.count(RelationshipDirection::Incoming)
    }

    /// Length of the loop chain, read from its head
    pub fn loop_count(&mut self) -> Result<u64> {
        self.count(RelationshipDirection::Loop)
    }

    /// Relationships of this type in any direction, loops counted once
    pub fn total_count(&mut self) -> Result<u64> {
        Ok(self.outgoing_count()? + self.incoming_count()? + self.loop_count()?)
    }

    fn count(&mut self, direction: RelationshipDirection) -> Result<u64> {
        self.state.check_positioned(NAME)?;
        let stores = self
            .stores
            .as_ref()
            .ok_or_else(|| Error::invalid_state("RelationshipGroupCursor has no store binding"))?;
        chain_count(
            &stores.relationships,
            self.record.head(direction),
            self.origin,
            &mut self.scratch,
        )
    }

    /// Release the store binding; safe to call in any state
    pub fn close(&mut self) {
        self.reset();
    }
}

impl PoolableCursor for RelationshipGroupCursor {
    fn reset(&mut self) {
        self.stores = None;
        self.state = CursorState::Closed;
        self.record = RelationshipGroupRecord::empty();
        self.scratch = RelationshipRecord::empty();
        self.id = NO_ID;
        self.origin = NO_ID;
        self.next = NO_ID;
        self.visited = 0;
    }
}

/// Length of the chain of `node` starting at `head`, read from the head's counter
///
/// One record read regardless of chain length.
pub(crate) fn chain_count(
    relationships: &RecordStore<RelationshipRecord>,
    head: u64,
    node: u64,
    scratch: &mut RelationshipRecord,
) -> Result<u64> {
    if head == NO_ID {
        return Ok(0);
    }
    relationships.read_into(head, scratch)?;
    scratch.chain_count_for(head, node)?.ok_or_else(|| {
        tracing::warn!(rel_id = head, node, "chain head is not flagged as first in chain");
        Error::invalid_record(format!(
            "Relationship {} heads a chain of node {} but is not marked first in chain",
            head, node
        ))
    })
}
