//! Testing infrastructure for Kestrel Core
//!
//! - **TestContext**: one temporary store directory per test, removed on drop
//! - **GraphFixture**: writes node, relationship, group and property records
//!   in the exact shapes the cursors read
//!
//! # Usage
//!
//! ```rust,no_run
//! use kestrel_core::testing::setup_test_reader;
//! use kestrel_core::Direction;
//!
//! let (reader, fixture, _ctx) = setup_test_reader().unwrap();
//! let a = fixture.create_node(&[]).unwrap();
//! let b = fixture.create_node(&[]).unwrap();
//! fixture.create_relationship(a, b, 0).unwrap();
//! assert_eq!(reader.degree(a, Direction::Outgoing, None, None).unwrap(), 1);
//! ```

mod context;
mod fixture;

pub use context::TestContext;
pub use fixture::GraphFixture;

use crate::Result;
use crate::config::EngineConfig;
use crate::reader::StoreReader;

/// Fixture plus reader over one fresh store directory
///
/// Keep the returned `TestContext` alive for the duration of the test.
pub fn setup_test_reader() -> Result<(StoreReader, GraphFixture, TestContext)> {
    setup_test_reader_with_config(&EngineConfig::default())
}

/// [`setup_test_reader`] with an explicit configuration
pub fn setup_test_reader_with_config(
    config: &EngineConfig,
) -> Result<(StoreReader, GraphFixture, TestContext)> {
    let ctx = TestContext::try_new()?;
    let fixture = GraphFixture::open_with_config(ctx.path(), config)?;
    let reader = StoreReader::new(fixture.stores(), config);
    Ok((reader, fixture, ctx))
}
