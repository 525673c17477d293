//! PublishQueue - serializes commits into the store and batches
//! notification.

use std::collections::VecDeque;

use graphcache_record_store::{RecordSource, RecordSourceMutator};

use crate::normalizer::ResponseNormalizer;
use crate::proxy::{HandlerProvider, RecordSourceProxy};
use crate::selector::{OperationDescriptor, RequestDescriptor};
use crate::store::Store;
use crate::Error;

/// An updater closure staged for a later run.
pub type Updater = Box<dyn FnOnce(&mut RecordSourceProxy<'_, '_>) -> Result<(), Error> + Send>;

enum PendingCommit {
    /// A server payload to normalize under its operation's write tree.
    Payload {
        operation: OperationDescriptor,
        payload: serde_json::Value,
    },
    /// An already-flattened source, e.g. a rehydrated snapshot.
    Source(RecordSource),
    /// An imperative client write.
    Updater(Updater),
}

/// What one run delivered.
#[derive(Debug, Default)]
pub struct FlushResult {
    /// Owners whose subscribed data changed, deduped, in delivery order.
    pub invalidated: Vec<RequestDescriptor>,
    /// True when a handler or updater requested store-wide redelivery.
    pub store_invalidated: bool,
}

/// Orders every write into the store and coalesces notification.
///
/// Commits are staged cheaply from anywhere and applied in commit order by
/// [`run`](Self::run); one run publishes each staged commit as its own
/// complete unit but notifies subscribers exactly once at the end, so a
/// burst of payloads costs one re-read per affected subscription instead of
/// one per payload.
///
/// # Example
///
/// ```rust,no_run
/// use graphcache_runtime::{DefaultHandlerProvider, PublishQueue, Store};
///
/// let store = Store::new();
/// let mut queue = PublishQueue::new(store, Box::new(DefaultHandlerProvider));
/// # let operation = todo!();
/// queue.commit_payload(operation, serde_json::json!({"viewer": null}));
/// let result = queue.run().unwrap();
/// assert!(result.invalidated.is_empty());
/// ```
pub struct PublishQueue {
    store: Store,
    provider: Box<dyn HandlerProvider>,
    pending: VecDeque<PendingCommit>,
}

impl PublishQueue {
    /// A queue feeding one store, dispatching handles through one provider.
    pub fn new(store: Store, provider: Box<dyn HandlerProvider>) -> Self {
        PublishQueue {
            store,
            provider,
            pending: VecDeque::new(),
        }
    }

    /// Stage a server payload. The operation's request is marked active
    /// until the payload's publish completes.
    pub fn commit_payload(&mut self, operation: OperationDescriptor, payload: serde_json::Value) {
        self.store.set_active(&operation.request.request_id);
        self.pending
            .push_back(PendingCommit::Payload { operation, payload });
    }

    /// Stage an already-flattened record source.
    pub fn commit_source(&mut self, source: RecordSource) {
        self.pending.push_back(PendingCommit::Source(source));
    }

    /// Stage an imperative updater.
    pub fn commit_updater(
        &mut self,
        updater: impl FnOnce(&mut RecordSourceProxy<'_, '_>) -> Result<(), Error> + Send + 'static,
    ) {
        self.pending
            .push_back(PendingCommit::Updater(Box::new(updater)));
    }

    /// True when nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every staged commit in order, then notify once.
    ///
    /// Each commit stages against the source as left by the commits before
    /// it, so later commits observe earlier ones. A failing commit is
    /// discarded whole - its staged sink never reaches the store - and the
    /// error returns immediately; commits published earlier in the run
    /// stay published (each was complete), and commits after the failure
    /// stay staged for the next run. Dirty subscriptions from the
    /// published commits are delivered by that next run's notify.
    pub fn run(&mut self) -> Result<FlushResult, Error> {
        let mut store_invalidated = false;

        while let Some(commit) = self.pending.pop_front() {
            match commit {
                PendingCommit::Payload { operation, payload } => {
                    let outcome = self.apply_payload(&operation, &payload);
                    self.store.set_idle(&operation.request.request_id);
                    store_invalidated |= outcome?;
                }
                PendingCommit::Source(source) => {
                    self.store.publish(source)?;
                }
                PendingCommit::Updater(updater) => {
                    let base = self.store.snapshot_source();
                    let mut mutator = RecordSourceMutator::new(&base);
                    let mut proxy = RecordSourceProxy::new(&mut mutator);
                    updater(&mut proxy)?;
                    store_invalidated |= proxy.store_invalidated();
                    self.store.publish(mutator.into_sink())?;
                }
            }
        }

        let invalidated = self.store.notify(None, store_invalidated);
        Ok(FlushResult {
            invalidated,
            store_invalidated,
        })
    }

    /// Normalize, dispatch handles, publish. Returns whether a handler
    /// requested store-wide invalidation.
    fn apply_payload(
        &mut self,
        operation: &OperationDescriptor,
        payload: &serde_json::Value,
    ) -> Result<bool, Error> {
        let base = self.store.snapshot_source();
        let mut mutator = RecordSourceMutator::new(&base);
        let normalized = ResponseNormalizer::normalize(&mut mutator, &operation.root, payload)?;

        let mut store_invalidated = false;
        for handle_payload in &normalized.handle_payloads {
            match self.provider.handler(&handle_payload.handle) {
                Some(handler) => {
                    let mut proxy = RecordSourceProxy::new(&mut mutator);
                    handler.update(&mut proxy, handle_payload)?;
                    store_invalidated |= proxy.store_invalidated();
                }
                None => {
                    // Fallback: mirror the raw link set under the handle
                    // key so readers of the handle slot still see the
                    // latest page.
                    if let Some(value) = mutator
                        .get_value(&handle_payload.record_id, &handle_payload.storage_key)
                        .cloned()
                    {
                        mutator.set_value(
                            &handle_payload.record_id,
                            handle_payload.handle_key.clone(),
                            value,
                        )?;
                    }
                    log::debug!("no handler registered for '{}'", handle_payload.handle);
                }
            }
        }

        self.store.publish(mutator.into_sink())?;
        Ok(store_invalidated)
    }
}
