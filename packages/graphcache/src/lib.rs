//! Graphcache: a normalized, subscribable client-side cache for
//! graph-shaped data.
//!
//! Payloads are flattened into identity-addressed records; reads
//! materialize typed snapshots whose exact dependencies drive precise
//! invalidation. The record model lives in [`record_store`], the
//! normalize/read/publish machinery in [`runtime`].

pub use graphcache_record_store as record_store;
pub use graphcache_runtime as runtime;
