//! Cursors over the record stores
//!
//! A cursor is a reusable, mutable view that is bound to a selection with one
//! of its `init*` methods, advanced with `next()` and finally closed. Closed
//! cursors go back to a [`CursorPool`] and are bound again later.
//!
//! ```text
//!   acquire ──► init*(…) ──► next() ... next() == false ──► close ──► pool
//!                  ▲                                           │
//!                  └───────────────── reuse ◄──────────────────┘
//! ```
//!
//! Accessors return [`Error::NotFound`](crate::Error::NotFound) before the
//! first `next()` and after `next()` returned false. A closed cursor reports
//! [`Error::InvalidState`](crate::Error::InvalidState).

pub mod group;
pub mod node;
pub mod pool;
pub mod progression;
pub mod property;
pub mod relationship;

pub use group::RelationshipGroupCursor;
pub use node::NodeCursor;
pub use pool::{CursorPool, PoolStats, Pooled, PoolableCursor};
pub use property::PropertyCursor;
pub use relationship::RelationshipCursor;

use crate::storage::RelationshipDirection;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Direction filter for relationship traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Relationships that start at the node
    Outgoing,
    /// Relationships that end at the node
    Incoming,
    /// Either way
    Both,
}

impl Direction {
    /// Whether a relationship seen as `direction` passes this filter
    ///
    /// Self-loops pass every filter.
    pub fn matches(self, direction: RelationshipDirection) -> bool {
        match (self, direction) {
            (Direction::Both, _) | (_, RelationshipDirection::Loop) => true,
            (Direction::Outgoing, RelationshipDirection::Outgoing) => true,
            (Direction::Incoming, RelationshipDirection::Incoming) => true,
            _ => false,
        }
    }

    /// Group chains to visit, in visiting order
    pub(crate) fn group_chains(self) -> &'static [RelationshipDirection] {
        match self {
            Direction::Outgoing => &[RelationshipDirection::Outgoing, RelationshipDirection::Loop],
            Direction::Incoming => &[RelationshipDirection::Incoming, RelationshipDirection::Loop],
            Direction::Both => &[
                RelationshipDirection::Outgoing,
                RelationshipDirection::Incoming,
                RelationshipDirection::Loop,
            ],
        }
    }
}

/// Lifecycle position shared by every cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum CursorState {
    /// Never bound, or reset after close
    #[default]
    Closed,
    /// Bound by `init*`, `next()` not yet called
    Initialized,
    /// On an entity
    Positioned,
    /// `next()` returned false
    Exhausted,
}

impl CursorState {
    /// Fail unless the cursor is on an entity
    pub(crate) fn check_positioned(self, cursor: &'static str) -> Result<()> {
        match self {
            CursorState::Positioned => Ok(()),
            CursorState::Closed => Err(Error::invalid_state(format!(
                "{} is closed or was never initialized",
                cursor
            ))),
            CursorState::Initialized => Err(Error::not_found(format!(
                "{} accessed before next()",
                cursor
            ))),
            CursorState::Exhausted => Err(Error::not_found(format!(
                "{} accessed after it was exhausted",
                cursor
            ))),
        }
    }

    /// Fail when `next()` is called on a cursor that was never bound
    pub(crate) fn check_bound(self, cursor: &'static str) -> Result<()> {
        if self == CursorState::Closed {
            return Err(Error::invalid_state(format!(
                "{}: next() called before init",
                cursor
            )));
        }
        Ok(())
    }
}
