//! Runtime layer of the normalized graph cache: normalization, reading,
//! subscriptions, and the publish protocol.
//!
//! The record layer ([`graphcache_record_store`]) defines what a record is;
//! this crate defines how payloads become records and how records become
//! typed snapshots that stay live:
//!
//! - [`ResponseNormalizer`] flattens a payload into records through a
//!   copy-on-write mutator.
//! - [`Reader`] materializes a [`Snapshot`] from a selector, tracking the
//!   exact (record, field) dependency set.
//! - [`Store`] owns the committed source and mediates publish, subscribe,
//!   notify, retain, and gc.
//! - [`PublishQueue`] serializes commits and batches notification.
//!
//! # Example
//!
//! ```rust
//! use graphcache_runtime::{
//!     DefaultHandlerProvider, LinkedField, NormalizationSelection, OperationDescriptor,
//!     PublishQueue, ReaderSelection, ScalarField, Store, variables,
//! };
//!
//! let operation = OperationDescriptor::new(
//!     "ViewerQuery",
//!     variables! {},
//!     vec![NormalizationSelection::Linked(
//!         LinkedField::new("viewer")
//!             .selection(NormalizationSelection::Scalar(ScalarField::new("id")))
//!             .selection(NormalizationSelection::Scalar(ScalarField::new("name"))),
//!     )],
//!     vec![ReaderSelection::Linked(
//!         LinkedField::new("viewer")
//!             .selection(ReaderSelection::Scalar(ScalarField::new("name"))),
//!     )],
//! );
//!
//! let store = Store::new();
//! let mut queue = PublishQueue::new(store.clone(), Box::new(DefaultHandlerProvider));
//! queue.commit_payload(
//!     operation.clone(),
//!     serde_json::json!({"viewer": {"id": "V1", "name": "Red"}}),
//! );
//! queue.run().unwrap();
//!
//! let snapshot = store.lookup(&operation.fragment);
//! assert!(!snapshot.is_missing_data);
//! ```

mod error;
pub mod normalizer;
pub mod proxy;
pub mod publish_queue;
pub mod reader;
pub mod selector;
pub mod store;

pub use error::Error;
pub use normalizer::{HandleFieldPayload, NormalizedPayload, ResponseNormalizer};
pub use proxy::{
    AppendHandler, DefaultHandlerProvider, Handler, HandlerProvider, MapHandlerProvider,
    RecordSourceProxy,
};
pub use publish_queue::{FlushResult, PublishQueue, Updater};
pub use reader::{read, DataValue, DependencySet, Reader, SelectorData, Snapshot};
pub use selector::{
    condition_passes, storage_key, Argument, ArgumentValue, FragmentPointer, LinkedField,
    LinkedHandle, NormalizationSelection, NormalizationSelector, OperationDescriptor,
    ReaderSelection, ReaderSelector, RequestDescriptor, ScalarField, Variables,
};
pub use store::{RetainToken, Store, SubscriptionCallback, SubscriptionToken};
