//! graphcache record layer: the identity-addressed data model.
//!
//! This layer defines how normalized data is stored, independent of how it
//! is written or read:
//! - `DataId` / `StorageKey`: record identity and canonical field addressing
//! - `ScalarValue` / `FieldValue`: the closed set of storable value shapes
//! - `Record`: one identity's flattened fields
//! - `RecordSource`: the keyed collection, with explicit tombstones
//! - `RecordSourceMutator`: the copy-on-write overlay a single write
//!   operation stages its changes in
//!
//! # Example
//!
//! ```rust
//! use graphcache_record_store::{DataId, Record, RecordSource, RecordSourceMutator};
//!
//! let mut committed = RecordSource::new();
//! committed.set(Record::new(DataId::from("P1"), "Pokemon"));
//!
//! let mutator = RecordSourceMutator::new(&committed);
//! let staged = mutator.into_sink();
//! assert!(staged.is_empty());
//! ```

mod error;
mod key;
mod mutator;
mod record;
mod source;
mod value;

pub use error::RecordError;
pub use key::{DataId, StorageKey, ROOT_ID, ROOT_TYPE, UNKNOWN_TYPE};
pub use mutator::RecordSourceMutator;
pub use record::Record;
pub use source::{RecordSource, RecordStatus};
pub use value::{FieldValue, ScalarValue};
