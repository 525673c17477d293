//! RecordSourceProxy - the imperative write surface handed to updaters and
//! field handlers.

use std::collections::BTreeMap;

use graphcache_record_store::{
    DataId, FieldValue, RecordError, RecordSourceMutator, RecordStatus, StorageKey,
};

use crate::normalizer::HandleFieldPayload;

/// Imperative access to a staged write, scoped to one commit.
///
/// Updaters and handlers receive a proxy instead of the mutator itself: the
/// proxy adds the root anchor and store-wide invalidation on top of the
/// mutator's record operations, and its lifetime ends with the commit, so
/// no staged write can leak past its publish.
pub struct RecordSourceProxy<'m, 'b> {
    mutator: &'m mut RecordSourceMutator<'b>,
    invalidated_store: bool,
}

impl<'m, 'b> RecordSourceProxy<'m, 'b> {
    /// Wrap a mutator for the duration of one commit.
    pub fn new(mutator: &'m mut RecordSourceMutator<'b>) -> Self {
        RecordSourceProxy {
            mutator,
            invalidated_store: false,
        }
    }

    /// The synthetic root record's id.
    pub fn root(&self) -> DataId {
        DataId::root()
    }

    /// Three-valued status of an id through the staged overlay.
    pub fn status(&self, id: &DataId) -> RecordStatus {
        self.mutator.status(id)
    }

    /// Typename of a record, if it exists through the overlay.
    pub fn get_type(&self, id: &DataId) -> Option<&str> {
        self.mutator.get_type(id)
    }

    /// Field value at a storage key.
    pub fn get_value(&self, id: &DataId, key: &StorageKey) -> Option<&FieldValue> {
        self.mutator.get_value(id, key)
    }

    /// Linked id at a storage key, if the field holds a singular link.
    pub fn get_linked_id(&self, id: &DataId, key: &StorageKey) -> Option<&DataId> {
        self.mutator.get_linked_id(id, key)
    }

    /// Linked ids at a storage key, if the field holds a link list.
    pub fn get_linked_ids(&self, id: &DataId, key: &StorageKey) -> Option<&[Option<DataId>]> {
        self.mutator.get_linked_ids(id, key)
    }

    /// Create a record. Identity is write-once.
    pub fn create(&mut self, id: DataId, typename: impl Into<String>) -> Result<(), RecordError> {
        self.mutator.create(id, typename)
    }

    /// Mark a record deleted.
    pub fn delete(&mut self, id: DataId) {
        self.mutator.delete(id);
    }

    /// Set a field value on an existing record.
    pub fn set_value(
        &mut self,
        id: &DataId,
        key: StorageKey,
        value: FieldValue,
    ) -> Result<(), RecordError> {
        self.mutator.set_value(id, key, value)
    }

    /// Set a singular linked reference.
    pub fn set_linked_id(
        &mut self,
        id: &DataId,
        key: StorageKey,
        linked: DataId,
    ) -> Result<(), RecordError> {
        self.mutator.set_linked_id(id, key, linked)
    }

    /// Set a linked reference list.
    pub fn set_linked_ids(
        &mut self,
        id: &DataId,
        key: StorageKey,
        linked: Vec<Option<DataId>>,
    ) -> Result<(), RecordError> {
        self.mutator.set_linked_ids(id, key, linked)
    }

    /// Overlay all fields of one record onto another.
    pub fn copy_fields(&mut self, from: &DataId, to: &DataId) -> Result<(), RecordError> {
        self.mutator.copy_fields(from, to)
    }

    /// Request redelivery to every subscriber at the next notify,
    /// regardless of dependency sets. For writes whose reach cannot be
    /// expressed field-by-field.
    pub fn invalidate_store(&mut self) {
        self.invalidated_store = true;
    }

    /// Whether store-wide invalidation was requested during this commit.
    pub fn store_invalidated(&self) -> bool {
        self.invalidated_store
    }
}

/// Post-processes one handle-decorated linked write.
///
/// Handlers run after normalization with the staged commit visible through
/// the proxy; the usual job is to merge the freshly written raw link set
/// into the accumulated value under the handle key.
pub trait Handler: Send + Sync {
    /// Apply the handle's semantics for one field occurrence.
    fn update(
        &self,
        proxy: &mut RecordSourceProxy<'_, '_>,
        payload: &HandleFieldPayload,
    ) -> Result<(), RecordError>;
}

/// Resolves handle names to handlers at dispatch time.
pub trait HandlerProvider: Send + Sync {
    /// The handler for a handle name, or `None` to fall back to the
    /// default mirror-the-raw-value behavior.
    fn handler(&self, handle: &str) -> Option<&dyn Handler>;
}

/// Provider with no handlers; every handle falls back to the mirrored raw
/// value the normalizer already wrote.
#[derive(Default)]
pub struct DefaultHandlerProvider;

impl HandlerProvider for DefaultHandlerProvider {
    fn handler(&self, _handle: &str) -> Option<&dyn Handler> {
        None
    }
}

/// Provider backed by a name-to-handler map.
///
/// # Example
///
/// ```rust
/// use graphcache_runtime::{AppendHandler, HandlerProvider, MapHandlerProvider};
///
/// let mut provider = MapHandlerProvider::new();
/// provider.register("connection", AppendHandler);
/// assert!(provider.handler("connection").is_some());
/// assert!(provider.handler("unknown").is_none());
/// ```
#[derive(Default)]
pub struct MapHandlerProvider {
    handlers: BTreeMap<String, Box<dyn Handler>>,
}

impl MapHandlerProvider {
    /// Empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a handle name, replacing any previous one.
    pub fn register(&mut self, handle: impl Into<String>, handler: impl Handler + 'static) {
        self.handlers.insert(handle.into(), Box::new(handler));
    }
}

impl HandlerProvider for MapHandlerProvider {
    fn handler(&self, handle: &str) -> Option<&dyn Handler> {
        self.handlers.get(handle).map(|handler| &**handler)
    }
}

/// Appends each freshly written link set onto the accumulated handle slot
/// instead of replacing it. The core of pagination-style connections:
/// page two's raw field overwrites page one's, but the handle slot keeps
/// growing.
pub struct AppendHandler;

impl Handler for AppendHandler {
    fn update(
        &self,
        proxy: &mut RecordSourceProxy<'_, '_>,
        payload: &HandleFieldPayload,
    ) -> Result<(), RecordError> {
        let incoming: Vec<Option<DataId>> = proxy
            .get_linked_ids(&payload.record_id, &payload.storage_key)
            .map(<[Option<DataId>]>::to_vec)
            .unwrap_or_default();
        let mut accumulated: Vec<Option<DataId>> = proxy
            .get_linked_ids(&payload.record_id, &payload.handle_key)
            .map(<[Option<DataId>]>::to_vec)
            .unwrap_or_default();

        for id in incoming {
            if !accumulated.contains(&id) {
                accumulated.push(id);
            }
        }
        proxy.set_linked_ids(&payload.record_id, payload.handle_key.clone(), accumulated)
    }
}
