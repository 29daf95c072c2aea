//! Traversal state shared by node and relationship cursors
//!
//! One closed set of states covers every way a cursor walks the stores:
//!
//! - `SingleId`: one id, yielded at most once
//! - `AllIds`: every id below the store's high id, re-checking the high id
//!   when the scan catches up with it so records added mid-scan are seen
//! - `SparseChain`: the relationship chain hanging off a sparse node
//! - `DenseGroupChain`: the group chain of a dense node, and inside each
//!   matching group its outgoing, incoming and loop chains

use super::Direction;
use crate::storage::records::{NO_ID, RelationshipDirection, RelationshipGroupRecord};
use crate::storage::RecordStore;
use crate::{Error, Result};

/// Where a cursor is in its selection
#[derive(Debug, Clone, Default)]
pub(crate) enum Progression {
    /// Nothing left to visit
    #[default]
    Done,
    /// A single id
    SingleId {
        /// Id to visit
        id: u64,
    },
    /// Full store scan
    AllIds {
        /// Next id to visit
        next: u64,
        /// High id observed when the scan last caught up
        high_mark: u64,
    },
    /// Relationship chain of a sparse node
    SparseChain {
        /// Node whose chain is walked
        origin: u64,
        /// Next relationship to visit
        next: u64,
        /// Relationships visited so far
        hops: u64,
    },
    /// Group chain of a dense node
    DenseGroupChain(DenseGroupWalk),
}

impl Progression {
    /// Scan of every id currently below `high_id`
    pub(crate) fn all_ids(high_id: u64) -> Self {
        Progression::AllIds {
            next: 0,
            high_mark: high_id,
        }
    }

    /// Next id of a `SingleId` or `AllIds` progression
    ///
    /// `high_id` is consulted again whenever the scan reaches the last high
    /// id it saw. Chain progressions return `None`.
    pub(crate) fn next_scan_id(&mut self, high_id: impl Fn() -> u64) -> Option<u64> {
        match self {
            Progression::SingleId { id } => {
                let id = *id;
                *self = Progression::Done;
                Some(id)
            }
            Progression::AllIds { next, high_mark } => {
                if *next >= *high_mark {
                    let current = high_id();
                    if current <= *high_mark {
                        *self = Progression::Done;
                        return None;
                    }
                    tracing::trace!(from = *high_mark, to = current, "scan picked up store growth");
                    *high_mark = current;
                }
                let id = *next;
                *next += 1;
                Some(id)
            }
            _ => None,
        }
    }
}

/// Position inside the group chain of a dense node
#[derive(Debug, Clone)]
pub(crate) struct DenseGroupWalk {
    origin: u64,
    type_filter: Option<u32>,
    chains: &'static [RelationshipDirection],
    next_group: u64,
    group: Option<GroupPosition>,
    groups_visited: u64,
    hops: u64,
}

#[derive(Debug, Clone, Copy)]
struct GroupPosition {
    heads: [u64; 3],
    chain: usize,
    next: u64,
}

impl DenseGroupWalk {
    /// Walk the groups of `origin` starting at `first_group`
    pub(crate) fn new(
        origin: u64,
        first_group: u64,
        direction: Direction,
        type_filter: Option<u32>,
    ) -> Self {
        Self {
            origin,
            type_filter,
            chains: direction.group_chains(),
            next_group: first_group,
            group: None,
            groups_visited: 0,
            hops: 0,
        }
    }

    /// Node whose groups are walked
    pub(crate) fn origin(&self) -> u64 {
        self.origin
    }

    /// Next relationship id to read, moving across chains and groups
    ///
    /// `record` is scratch space for group reads.
    pub(crate) fn next_relationship(
        &mut self,
        groups: &RecordStore<RelationshipGroupRecord>,
        record: &mut RelationshipGroupRecord,
        rel_high_id: u64,
    ) -> Result<Option<u64>> {
        loop {
            if let Some(position) = self.group.as_mut() {
                if position.next != NO_ID {
                    self.hops += 1;
                    if self.hops > rel_high_id {
                        return Err(cycle(self.origin));
                    }
                    return Ok(Some(position.next));
                }
                position.chain += 1;
                if position.chain < self.chains.len() {
                    position.next = position.heads[position.chain];
                    continue;
                }
                self.group = None;
            }

            if self.next_group == NO_ID {
                return Ok(None);
            }
            self.groups_visited += 1;
            if self.groups_visited > groups.high_id() {
                return Err(Error::invalid_record(format!(
                    "Cycle detected in relationship group chain of node {}",
                    self.origin
                )));
            }

            let group_id = self.next_group;
            let in_use = groups.read_into(group_id, record)?;
            if record.owning_node != self.origin {
                tracing::warn!(
                    group_id,
                    node = self.origin,
                    owner = record.owning_node,
                    "group chain reaches a group owned by another node"
                );
                return Err(Error::invalid_record(format!(
                    "Relationship group {} belongs to node {}, reached from node {}",
                    group_id, record.owning_node, self.origin
                )));
            }
            self.next_group = record.next;
            if !in_use {
                tracing::trace!(group_id, node = self.origin, "skipping unused group");
                continue;
            }
            if self.type_filter.is_some_and(|t| t != record.type_id) {
                continue;
            }

            let mut heads = [NO_ID; 3];
            for (slot, direction) in heads.iter_mut().zip(self.chains) {
                *slot = record.head(*direction);
            }
            self.group = Some(GroupPosition {
                heads,
                chain: 0,
                next: heads[0],
            });
        }
    }

    /// Continue the current chain at `next`
    pub(crate) fn follow(&mut self, next: u64) {
        if let Some(position) = self.group.as_mut() {
            position.next = next;
        }
    }
}

pub(crate) fn cycle(origin: u64) -> Error {
    tracing::warn!(node = origin, "relationship chain longer than the store");
    Error::invalid_record(format!(
        "Cycle detected in relationship chain of node {}",
        origin
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_id_yields_once() {
        let mut progression = Progression::SingleId { id: 7 };
        assert_eq!(progression.next_scan_id(|| 0), Some(7));
        assert_eq!(progression.next_scan_id(|| 0), None);
    }

    #[test]
    fn test_all_ids_rechecks_high_id() {
        let high = std::cell::Cell::new(3u64);
        let mut progression = Progression::all_ids(high.get());
        let mut seen = Vec::new();
        while let Some(id) = progression.next_scan_id(|| high.get()) {
            seen.push(id);
            if id == 1 {
                high.set(5);
            }
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_scan() {
        let mut progression = Progression::all_ids(0);
        assert_eq!(progression.next_scan_id(|| 0), None);
        assert!(matches!(progression, Progression::Done));
    }

    #[test]
    fn test_chain_progression_has_no_scan_ids() {
        let mut progression = Progression::SparseChain {
            origin: 1,
            next: 4,
            hops: 0,
        };
        assert_eq!(progression.next_scan_id(|| 10), None);
    }
}
