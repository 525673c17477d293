//! Store - the authoritative record source with subscriptions, retention,
//! and garbage collection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, Weak};

use graphcache_record_store::{
    DataId, FieldValue, Record, RecordSource, RecordStatus, StorageKey,
};

use crate::reader::{Reader, Snapshot};
use crate::selector::{
    condition_passes, LinkedField, NormalizationSelection, NormalizationSelector, OperationDescriptor,
    ReaderSelector, RequestDescriptor,
};
use crate::Error;

/// Callback invoked with a fresh snapshot when a subscription's data
/// changes.
pub type SubscriptionCallback = Box<dyn FnMut(&Snapshot) + Send>;

struct SubscriptionEntry {
    snapshot: Snapshot,
    callback: SubscriptionCallback,
    dirty: bool,
}

struct RetainEntry {
    count: usize,
    request: RequestDescriptor,
    selector: NormalizationSelector,
}

struct StoreInner {
    source: RecordSource,
    subscriptions: BTreeMap<u64, SubscriptionEntry>,
    next_subscription_id: u64,
    retained: BTreeMap<String, RetainEntry>,
    active: BTreeMap<String, usize>,
}

/// The authoritative store.
///
/// Owns the committed [`RecordSource`] and mediates every mutation through
/// the publish protocol; the source is never handed out for direct external
/// mutation. `Store` is a cheap cloneable handle: publishes serialize
/// behind a write lock (single writer), lookups share a read lock and
/// always observe a complete committed source.
///
/// There is no ambient global store; construct one at startup and pass the
/// handle to every component that needs it.
///
/// # Example
///
/// ```rust
/// use graphcache_runtime::Store;
///
/// let store = Store::new();
/// let handle = store.clone();
/// assert!(handle.is_empty());
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<RwLock<StoreInner>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Store {
            inner: Arc::new(RwLock::new(StoreInner {
                source: RecordSource::new(),
                subscriptions: BTreeMap::new(),
                next_subscription_id: 0,
                retained: BTreeMap::new(),
                active: BTreeMap::new(),
            })),
        }
    }

    /// Run the reader against the committed source.
    ///
    /// Concurrent lookups are fine; they never observe a partially merged
    /// publish.
    pub fn lookup(&self, selector: &ReaderSelector) -> Snapshot {
        let inner = self.inner.read().expect("store lock poisoned");
        Reader::read(&inner.source, selector)
    }

    /// Three-valued status of an id in the committed source.
    pub fn peek_status(&self, id: &DataId) -> RecordStatus {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.source.status(id)
    }

    /// A clone of the committed source, for staging a mutator against.
    pub fn snapshot_source(&self) -> RecordSource {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.source.clone()
    }

    /// True if nothing has ever been published.
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.source.is_empty()
    }

    /// Merge a staged source into the committed source.
    ///
    /// Every touched (record, field) pair is diffed against active
    /// subscriptions' dependency sets; intersecting subscriptions are
    /// marked dirty for the next [`notify`](Self::notify). Unchanged field
    /// writes count as untouched, so re-publishing identical data marks
    /// nobody.
    ///
    /// Fails with [`Error::DanglingReference`] when a published link points
    /// at an id neither the staged source nor the committed source has
    /// observed; nothing is merged in that case.
    pub fn publish(&self, source: RecordSource) -> Result<(), Error> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.check_references(&source)?;

        let mut touched: BTreeMap<DataId, RecordWrites> = BTreeMap::new();
        for (id, entry) in source.entries() {
            match entry {
                None => {
                    if inner.source.status(id) != RecordStatus::NonExistent {
                        touched.entry(id.clone()).or_default().existence = true;
                    }
                    inner.source.delete(id.clone());
                }
                Some(record) => {
                    if inner.source.status(id) == RecordStatus::Existent {
                        let existing = inner
                            .source
                            .get_mut(id)
                            .expect("existent record has a value");
                        let mut changed: BTreeSet<StorageKey> = BTreeSet::new();
                        for (key, value) in record.fields() {
                            if existing.get(key) != Some(value) {
                                changed.insert(key.clone());
                            }
                        }
                        if !changed.is_empty() {
                            existing.copy_fields_from(record);
                            touched.entry(id.clone()).or_default().keys = changed;
                        }
                    } else {
                        touched.entry(id.clone()).or_default().existence = true;
                        inner.source.set(record.clone());
                    }
                }
            }
        }

        log::debug!(
            "publish: {} record(s) staged, {} touched",
            source.len(),
            touched.len()
        );

        for entry in inner.subscriptions.values_mut() {
            if entry.dirty {
                continue;
            }
            if writes_intersect(&touched, &entry.snapshot) {
                entry.dirty = true;
            }
        }
        Ok(())
    }

    /// Re-read every dirty subscription and deliver fresh snapshots.
    ///
    /// A subscription's callback fires only when the re-read produced
    /// structurally different data (or `invalidate_store` forces
    /// redelivery to everyone). Returns the owners whose data was
    /// redelivered, so in-flight requests tied to the same root data can
    /// decide to re-fetch. When `source_operation` is given, that request
    /// is marked idle.
    ///
    /// Subscribers are notified in registration order for one publish;
    /// no order is guaranteed across independent subscriptions.
    pub fn notify(
        &self,
        source_operation: Option<&RequestDescriptor>,
        invalidate_store: bool,
    ) -> Vec<RequestDescriptor> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        if let Some(request) = source_operation {
            inner.set_idle(&request.request_id);
        }

        let StoreInner {
            source,
            subscriptions,
            ..
        } = &mut *inner;

        let mut invalidated: Vec<RequestDescriptor> = Vec::new();
        for entry in subscriptions.values_mut() {
            if !entry.dirty && !invalidate_store {
                continue;
            }
            let next = Reader::read(source, &entry.snapshot.selector);
            let changed = next.data != entry.snapshot.data
                || next.is_missing_data != entry.snapshot.is_missing_data;
            entry.dirty = false;
            if changed || invalidate_store {
                let owner = next.selector.owner.clone();
                if !invalidated.iter().any(|r| r.request_id == owner.request_id) {
                    invalidated.push(owner);
                }
                entry.snapshot = next;
                (entry.callback)(&entry.snapshot);
            } else {
                // Re-read produced identical data; keep the fresh
                // dependency set without waking the subscriber.
                entry.snapshot = next;
            }
        }

        log::debug!("notify: {} owner(s) invalidated", invalidated.len());
        invalidated
    }

    /// Register a snapshot's dependency set for invalidation.
    ///
    /// The callback fires on every future [`notify`](Self::notify) whose
    /// preceding publishes touched the subscription's dependencies and
    /// changed its data. Dropping (or disposing) the token unregisters.
    pub fn subscribe(
        &self,
        snapshot: Snapshot,
        callback: impl FnMut(&Snapshot) + Send + 'static,
    ) -> SubscriptionToken {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let id = inner.next_subscription_id;
        inner.next_subscription_id += 1;
        inner.subscriptions.insert(
            id,
            SubscriptionEntry {
                snapshot,
                callback: Box::new(callback),
                dirty: false,
            },
        );
        SubscriptionToken {
            store: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Keep the records reachable from an operation's root selector alive
    /// across garbage collection.
    ///
    /// Retains are reference-counted per request id; the returned token
    /// releases on drop. Records become collectible when every token for
    /// every root that reaches them is gone, and are actually collected by
    /// the next [`gc`](Self::gc) pass.
    pub fn retain(&self, operation: &OperationDescriptor) -> RetainToken {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let request_id = operation.request.request_id.clone();
        inner
            .retained
            .entry(request_id.clone())
            .and_modify(|entry| entry.count += 1)
            .or_insert_with(|| RetainEntry {
                count: 1,
                request: operation.request.clone(),
                selector: operation.root.clone(),
            });
        RetainToken {
            store: Arc::downgrade(&self.inner),
            request_id,
        }
    }

    /// True while a request with this identity has an in-flight publish
    /// pending. Readers use this to present missing data as still-loading
    /// rather than final.
    pub fn is_active(&self, request: &RequestDescriptor) -> bool {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .active
            .get(&request.request_id)
            .map(|count| *count > 0)
            .unwrap_or(false)
    }

    /// Collect every record no retained root or live subscription
    /// depends on.
    ///
    /// Reachability is recomputed from scratch: retained operations are
    /// walked through their selection trees, and each registered
    /// subscription's dependency set pins the exact records its last read
    /// consulted. Unreached records are forgotten entirely - their status
    /// returns to [`RecordStatus::Unknown`]. Explicit and batched for
    /// deterministic collection timing.
    pub fn gc(&self) {
        let mut inner = self.inner.write().expect("store lock poisoned");

        let mut reachable: BTreeSet<DataId> = BTreeSet::new();
        for entry in inner.retained.values() {
            mark_reachable(
                &inner.source,
                &entry.selector.data_id,
                &entry.selector.selections,
                &entry.selector.variables,
                &mut reachable,
            );
        }
        for entry in inner.subscriptions.values() {
            for id in entry.snapshot.seen_records.records() {
                reachable.insert(id.clone());
            }
        }

        let unreached: Vec<DataId> = inner
            .source
            .ids()
            .filter(|id| !reachable.contains(*id))
            .cloned()
            .collect();
        for id in &unreached {
            inner.source.remove(id);
        }
        log::debug!(
            "gc: {} record(s) collected, {} reachable",
            unreached.len(),
            reachable.len()
        );
    }

    pub(crate) fn set_active(&self, request_id: &str) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        *inner.active.entry(request_id.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn set_idle(&self, request_id: &str) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.set_idle(request_id);
    }
}

impl StoreInner {
    fn set_idle(&mut self, request_id: &str) {
        if let Some(count) = self.active.get_mut(request_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.active.remove(request_id);
            }
        }
    }

    /// Every link in the staged source must resolve in the combined
    /// (staged + committed) source. A tombstoned target is a known
    /// deletion the reader handles; a never-observed target is a
    /// normalization bug.
    fn check_references(&self, staged: &RecordSource) -> Result<(), Error> {
        let resolve = |id: &DataId| -> bool {
            staged.status(id) != RecordStatus::Unknown
                || self.source.status(id) != RecordStatus::Unknown
        };
        for (from, entry) in staged.entries() {
            let Some(record) = entry else { continue };
            for (key, value) in record.fields() {
                match value {
                    FieldValue::Link(to) => {
                        if !resolve(to) {
                            return Err(Error::DanglingReference {
                                from: from.clone(),
                                key: key.clone(),
                                to: to.clone(),
                            });
                        }
                    }
                    FieldValue::LinkList(targets) => {
                        for to in targets.iter().flatten() {
                            if !resolve(to) {
                                return Err(Error::DanglingReference {
                                    from: from.clone(),
                                    key: key.clone(),
                                    to: to.clone(),
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordWrites {
    keys: BTreeSet<StorageKey>,
    existence: bool,
}

/// Does this publish's write log intersect the snapshot's dependency set?
fn writes_intersect(touched: &BTreeMap<DataId, RecordWrites>, snapshot: &Snapshot) -> bool {
    for (id, writes) in touched {
        if !snapshot.seen_records.depends_on_record(id) {
            continue;
        }
        if writes.existence {
            return true;
        }
        if writes
            .keys
            .iter()
            .any(|key| snapshot.seen_records.depends_on(id, key))
        {
            return true;
        }
    }
    false
}

/// Selection-guided reachability walk for garbage collection.
fn mark_reachable(
    source: &RecordSource,
    id: &DataId,
    selections: &[NormalizationSelection],
    variables: &crate::selector::Variables,
    reachable: &mut BTreeSet<DataId>,
) {
    reachable.insert(id.clone());
    let Some(record) = source.get(id) else { return };

    for selection in selections {
        match selection {
            NormalizationSelection::Scalar(_) => {}
            NormalizationSelection::Linked(field) => {
                mark_linked(source, record, field, variables, None, reachable);
            }
            NormalizationSelection::Handle(handle) => {
                mark_linked(source, record, &handle.field, variables, None, reachable);
                // The handle's synthetic slot may hold a spliced link set
                // that differs from the raw field.
                let handle_key = StorageKey::handle(&handle.handle, &handle.key);
                mark_linked(
                    source,
                    record,
                    &handle.field,
                    variables,
                    Some(&handle_key),
                    reachable,
                );
            }
            NormalizationSelection::InlineFragment {
                type_condition,
                selections,
            } => {
                if record.typename() == type_condition {
                    mark_reachable(source, id, selections, variables, reachable);
                }
            }
            NormalizationSelection::Condition {
                passing_value,
                variable,
                selections,
            } => {
                if condition_passes(*passing_value, variable, variables) {
                    mark_reachable(source, id, selections, variables, reachable);
                }
            }
            NormalizationSelection::ClientExtension { selections } => {
                mark_reachable(source, id, selections, variables, reachable);
            }
        }
    }
}

fn mark_linked(
    source: &RecordSource,
    record: &Record,
    field: &LinkedField<NormalizationSelection>,
    variables: &crate::selector::Variables,
    key_override: Option<&StorageKey>,
    reachable: &mut BTreeSet<DataId>,
) {
    let key = match key_override {
        Some(key) => key.clone(),
        None => field.storage_key(variables),
    };
    match record.get(&key) {
        Some(FieldValue::Link(child)) => {
            mark_reachable(source, child, &field.selections, variables, reachable);
        }
        Some(FieldValue::LinkList(children)) => {
            for child in children.iter().flatten() {
                mark_reachable(source, child, &field.selections, variables, reachable);
            }
        }
        _ => {}
    }
}

/// Unregisters its subscription when dropped or disposed.
pub struct SubscriptionToken {
    store: Weak<RwLock<StoreInner>>,
    id: u64,
}

impl SubscriptionToken {
    /// Explicitly unregister now.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for SubscriptionToken {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            if let Ok(mut inner) = store.write() {
                inner.subscriptions.remove(&self.id);
            }
        }
    }
}

/// Decrements its operation's retain count when dropped or disposed.
pub struct RetainToken {
    store: Weak<RwLock<StoreInner>>,
    request_id: String,
}

impl RetainToken {
    /// Explicitly release now.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for RetainToken {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            if let Ok(mut inner) = store.write() {
                let remove = match inner.retained.get_mut(&self.request_id) {
                    Some(entry) => {
                        entry.count = entry.count.saturating_sub(1);
                        entry.count == 0
                    }
                    None => false,
                };
                if remove {
                    inner.retained.remove(&self.request_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::ResponseNormalizer;
    use crate::selector::{Argument, OperationDescriptor, ReaderSelection, ScalarField};
    use crate::variables;
    use graphcache_record_store::RecordSourceMutator;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn pokemon_operation(request_id: &str, pokemon_id: &str) -> OperationDescriptor {
        OperationDescriptor::new(
            request_id,
            variables! { "id" => pokemon_id },
            vec![NormalizationSelection::Linked(
                LinkedField::new("pokemon")
                    .argument(Argument::variable("id", "id"))
                    .concrete_type("Pokemon")
                    .selection(NormalizationSelection::Scalar(ScalarField::new("id")))
                    .selection(NormalizationSelection::Scalar(ScalarField::new("name"))),
            )],
            vec![ReaderSelection::Linked(
                LinkedField::new("pokemon")
                    .argument(Argument::variable("id", "id"))
                    .selection(ReaderSelection::Scalar(ScalarField::new("id")))
                    .selection(ReaderSelection::Scalar(ScalarField::new("name"))),
            )],
        )
    }

    fn publish_payload(store: &Store, operation: &OperationDescriptor, payload: serde_json::Value) {
        let base = store.snapshot_source();
        let mut mutator = RecordSourceMutator::new(&base);
        ResponseNormalizer::normalize(&mut mutator, &operation.root, &payload).unwrap();
        store.publish(mutator.into_sink()).unwrap();
    }

    #[test]
    fn publish_then_lookup_round_trips() {
        let store = Store::new();
        let op = pokemon_operation("Q1", "001");
        publish_payload(&store, &op, json!({"pokemon": {"id": "P1", "name": "Bulbasaur"}}));

        let snapshot = store.lookup(&op.fragment);
        assert!(!snapshot.is_missing_data);
        let data = snapshot.data_as::<serde_json::Value>().unwrap().unwrap();
        assert_eq!(data["pokemon"]["name"], json!("Bulbasaur"));
    }

    #[test]
    fn update_notifies_dependent_subscription() {
        let store = Store::new();
        let op = pokemon_operation("Q1", "001");
        publish_payload(&store, &op, json!({"pokemon": {"id": "P1", "name": "Bulbasaur"}}));

        let delivered: Arc<Mutex<Vec<Snapshot>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        let snapshot = store.lookup(&op.fragment);
        let _token = store.subscribe(snapshot, move |snapshot| {
            sink.lock().unwrap().push(snapshot.clone());
        });

        publish_payload(&store, &op, json!({"pokemon": {"id": "P1", "name": "Ivysaur"}}));
        let invalidated = store.notify(None, false);

        assert_eq!(invalidated.len(), 1);
        assert_eq!(invalidated[0].request_id, "Q1");
        let delivered = delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        let data = delivered[0].data_as::<serde_json::Value>().unwrap().unwrap();
        assert_eq!(data["pokemon"]["name"], json!("Ivysaur"));
    }

    #[test]
    fn identical_republish_notifies_nobody() {
        let store = Store::new();
        let op = pokemon_operation("Q1", "001");
        let payload = json!({"pokemon": {"id": "P1", "name": "Bulbasaur"}});
        publish_payload(&store, &op, payload.clone());

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let snapshot = store.lookup(&op.fragment);
        let _token = store.subscribe(snapshot, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        publish_payload(&store, &op, payload);
        let invalidated = store.notify(None, false);

        assert!(invalidated.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unrelated_field_write_notifies_nobody() {
        let store = Store::new();
        let op = pokemon_operation("Q1", "001");
        publish_payload(&store, &op, json!({"pokemon": {"id": "P1", "name": "Bulbasaur"}}));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let snapshot = store.lookup(&op.fragment);
        let _token = store.subscribe(snapshot, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Write (P1, number), a key outside the subscription's dependency
        // set, through a raw staged source.
        let mut staged = store.snapshot_source();
        staged
            .get_mut(&DataId::from("P1"))
            .unwrap()
            .set(StorageKey::plain("number"), FieldValue::Scalar(1i64.into()));
        let mut source = RecordSource::new();
        source.set(staged.get(&DataId::from("P1")).unwrap().clone());
        store.publish(source).unwrap();
        store.notify(None, false);

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalidate_store_forces_redelivery() {
        let store = Store::new();
        let op = pokemon_operation("Q1", "001");
        publish_payload(&store, &op, json!({"pokemon": {"id": "P1", "name": "Bulbasaur"}}));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let snapshot = store.lookup(&op.fragment);
        let _token = store.subscribe(snapshot, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        store.notify(None, true);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disposed_subscription_stops_firing() {
        let store = Store::new();
        let op = pokemon_operation("Q1", "001");
        publish_payload(&store, &op, json!({"pokemon": {"id": "P1", "name": "Bulbasaur"}}));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let snapshot = store.lookup(&op.fragment);
        let token = store.subscribe(snapshot, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        token.dispose();

        publish_payload(&store, &op, json!({"pokemon": {"id": "P1", "name": "Ivysaur"}}));
        store.notify(None, false);

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dangling_reference_aborts_publish() {
        let store = Store::new();

        let mut source = RecordSource::new();
        let mut root = Record::new(DataId::root(), "__Root");
        root.set(
            StorageKey::plain("pokemon"),
            FieldValue::Link(DataId::from("never-seen")),
        );
        source.set(root);

        let err = store.publish(source).unwrap_err();
        assert!(matches!(err, Error::DanglingReference { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn reference_to_tombstone_is_permitted() {
        let store = Store::new();

        let mut source = RecordSource::new();
        let mut root = Record::new(DataId::root(), "__Root");
        root.set(
            StorageKey::plain("pokemon"),
            FieldValue::Link(DataId::from("gone")),
        );
        source.set(root);
        source.delete(DataId::from("gone"));

        store.publish(source).unwrap();
        assert_eq!(
            store.peek_status(&DataId::from("gone")),
            RecordStatus::NonExistent
        );
    }

    #[test]
    fn gc_collects_released_operations_only() {
        let store = Store::new();
        let op1 = pokemon_operation("Q1", "001");
        let op2 = pokemon_operation("Q2", "002");
        publish_payload(&store, &op1, json!({"pokemon": {"id": "P1", "name": "Bulbasaur"}}));
        publish_payload(&store, &op2, json!({"pokemon": {"id": "P2", "name": "Charmander"}}));

        let token1 = store.retain(&op1);
        let _token2 = store.retain(&op2);

        token1.dispose();
        store.gc();

        // P1 was reachable only from the released operation.
        assert_eq!(store.peek_status(&DataId::from("P1")), RecordStatus::Unknown);
        // P2 and the shared root survive.
        assert_eq!(store.peek_status(&DataId::from("P2")), RecordStatus::Existent);
        assert_eq!(store.peek_status(&DataId::root()), RecordStatus::Existent);
    }

    #[test]
    fn retain_is_reference_counted() {
        let store = Store::new();
        let op = pokemon_operation("Q1", "001");
        publish_payload(&store, &op, json!({"pokemon": {"id": "P1", "name": "Bulbasaur"}}));

        let first = store.retain(&op);
        let second = store.retain(&op);

        first.dispose();
        store.gc();
        assert_eq!(store.peek_status(&DataId::from("P1")), RecordStatus::Existent);

        second.dispose();
        store.gc();
        assert_eq!(store.peek_status(&DataId::from("P1")), RecordStatus::Unknown);
    }

    #[test]
    fn gc_without_roots_or_subscriptions_collects_everything() {
        let store = Store::new();
        let op = pokemon_operation("Q1", "001");
        publish_payload(&store, &op, json!({"pokemon": {"id": "P1", "name": "Bulbasaur"}}));

        store.gc();
        assert!(store.is_empty());
    }

    #[test]
    fn subscribed_records_survive_gc_without_a_retain() {
        let store = Store::new();
        let op = pokemon_operation("Q1", "001");
        publish_payload(&store, &op, json!({"pokemon": {"id": "P1", "name": "Bulbasaur"}}));

        let snapshot = store.lookup(&op.fragment);
        let token = store.subscribe(snapshot, |_| {});

        store.gc();
        assert_eq!(store.peek_status(&DataId::from("P1")), RecordStatus::Existent);
        assert_eq!(store.peek_status(&DataId::root()), RecordStatus::Existent);

        // Once the subscription is gone, nothing pins the records.
        token.dispose();
        store.gc();
        assert_eq!(store.peek_status(&DataId::from("P1")), RecordStatus::Unknown);
    }

    #[test]
    fn active_state_tracks_in_flight_requests() {
        let store = Store::new();
        let op = pokemon_operation("Q1", "001");
        assert!(!store.is_active(&op.request));

        store.set_active("Q1");
        assert!(store.is_active(&op.request));

        store.notify(Some(&op.request), false);
        assert!(!store.is_active(&op.request));
    }

    #[test]
    fn deleted_record_notifies_dependents() {
        let store = Store::new();
        let op = pokemon_operation("Q1", "001");
        publish_payload(&store, &op, json!({"pokemon": {"id": "P1", "name": "Bulbasaur"}}));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let snapshot = store.lookup(&op.fragment);
        let _token = store.subscribe(snapshot, move |snapshot| {
            assert!(!snapshot.is_missing_data);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut source = RecordSource::new();
        source.delete(DataId::from("P1"));
        store.publish(source).unwrap();
        store.notify(None, false);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
