//! Property values and their on-disk encoding
//!
//! - [`value`]: the value model
//! - [`codec`]: block-level encode/decode, usable on its own with
//!   [`InMemoryDynamicStore`]
//! - [`dynamic`]: overflow chains for long strings, arrays and label sets
//!
//! # Examples
//!
//! ```rust
//! use kestrel_core::property::{InMemoryDynamicStore, Value, codec};
//!
//! let store = InMemoryDynamicStore::new();
//! let blocks = codec::encode(3, &Value::from("a string that is far too long to inline"), &store).unwrap();
//! let mut scratch = Vec::new();
//! let decoded = codec::decode(&blocks, &store, &mut scratch).unwrap();
//! assert_eq!(decoded.as_str(), Some("a string that is far too long to inline"));
//! ```

mod bits;
pub mod codec;
pub mod dynamic;
pub mod geometry;
pub mod short_array;
pub mod short_string;
pub mod temporal;
pub mod types;
pub mod value;

pub use dynamic::{
    CYCLE_DETECTION_THRESHOLD, DynamicAllocator, DynamicChainReader, DynamicStoreKind,
    InMemoryDynamicStore,
};
pub use types::PropertyType;
pub use value::{ArrayValue, CoordinateSystem, Point, TemporalValue, Value};
