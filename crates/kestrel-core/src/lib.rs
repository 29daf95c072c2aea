//! Kestrel Core - Record-Level Graph Storage Engine
//!
//! This crate provides the read path of a record-store property graph:
//! - Fixed-slot record stores (nodes, relationships, groups, properties, dynamic)
//! - Property block codec with inline short strings/arrays, points and temporals
//! - Sparse relationship chains and dense per-type relationship groups
//! - Degree counting from chain-head counters
//! - Pooled cursors with a thread-local tier in front of a shared tier
//! - Transaction-state overlay on top of committed records
//! - Copy-on-write schema rule cache
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 StoreReader                 │
//! │  (pooled cursors, short-lived entity locks) │
//! └──────┬──────────────┬───────────────┬───────┘
//!        │              │               │
//! ┌──────┴──────┐ ┌─────┴──────┐ ┌──────┴───────┐
//! │   Cursors   │ │  Degrees   │ │ Schema Cache │
//! │ node / rel  │ │ (counters, │ │   (ArcSwap   │
//! │ group / prop│ │ traversal) │ │  snapshots)  │
//! └──────┬──────┘ └─────┬──────┘ └──────────────┘
//!        │   TxState    │
//!        │   overlay    │
//! ┌──────┴──────────────┴───────────────────────┐
//! │       Property Codec / Dynamic Chains       │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │      Record Stores (memory-mapped files)    │
//! └─────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod cursor;
pub mod degree;
pub mod error;
pub mod property;
pub mod reader;
pub mod schema;
pub mod storage;
pub mod testing;
pub mod txstate;

pub use config::EngineConfig;
pub use cursor::{
    CursorPool, Direction, NodeCursor, PropertyCursor, RelationshipCursor,
    RelationshipGroupCursor,
};
pub use degree::DegreeCounter;
pub use error::{Error, Result};
pub use property::Value;
pub use reader::StoreReader;
pub use schema::SchemaCache;
pub use storage::{NO_ID, RecordStores};
pub use txstate::{TransactionState, TxState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types() {
        let err = Error::storage("test error");
        assert!(matches!(err, Error::Storage(_)));
        assert!(Error::invalid_record("bad chain").is_corruption());
        assert!(Error::invalid_state("closed").is_logic_error());
    }
}
