//! Shared helpers for integration tests

#![allow(dead_code)]

use kestrel_core::cursor::{Direction, RelationshipCursor};
use kestrel_core::storage::RecordStores;
use kestrel_core::txstate::TransactionState;
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Install a test subscriber once per test binary; `RUST_LOG` selects levels
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with_test_writer()
            .try_init();
    });
}

/// Ids yielded by a relationship traversal, sorted
pub fn traverse(
    stores: &Arc<RecordStores>,
    node: u64,
    direction: Direction,
    type_filter: Option<u32>,
    tx: Option<Arc<dyn TransactionState>>,
) -> Vec<u64> {
    let mut cursor = RelationshipCursor::new();
    cursor
        .init_node(Arc::clone(stores), node, direction, type_filter, tx)
        .unwrap();
    let mut ids = Vec::new();
    while cursor.next().unwrap() {
        ids.push(cursor.id().unwrap());
    }
    ids.sort_unstable();
    ids
}
