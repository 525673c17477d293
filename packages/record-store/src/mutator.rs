//! RecordSourceMutator - copy-on-write staging overlay over a committed source.

use crate::{DataId, FieldValue, Record, RecordError, RecordSource, RecordStatus, StorageKey};

/// A copy-on-write overlay that stages changes against a read-only base.
///
/// All reads consult the `sink` first, falling back to `base` only when the
/// sink has neither a record nor a tombstone for the id. All writes go to
/// the sink only; the first mutation of a record copies it from the base
/// into the sink, so the base is never observed mid-mutation and never
/// altered. One write operation gets one mutator; the finished sink is
/// published as a unit.
///
/// # Example
///
/// ```rust
/// use graphcache_record_store::{
///     DataId, FieldValue, Record, RecordSource, RecordSourceMutator, ScalarValue, StorageKey,
/// };
///
/// let mut base = RecordSource::new();
/// base.set(Record::new(DataId::from("P1"), "Pokemon"));
///
/// let mut mutator = RecordSourceMutator::new(&base);
/// mutator
///     .set_value(
///         &DataId::from("P1"),
///         StorageKey::plain("name"),
///         FieldValue::Scalar(ScalarValue::from("Bulbasaur")),
///     )
///     .unwrap();
///
/// // The base is untouched; the staged copy lives in the sink.
/// assert!(base.get(&DataId::from("P1")).unwrap().is_empty());
/// assert!(!mutator.into_sink().get(&DataId::from("P1")).unwrap().is_empty());
/// ```
pub struct RecordSourceMutator<'a> {
    base: &'a RecordSource,
    sink: RecordSource,
}

impl<'a> RecordSourceMutator<'a> {
    /// Create a mutator with an empty sink over a committed base.
    pub fn new(base: &'a RecordSource) -> Self {
        RecordSourceMutator {
            base,
            sink: RecordSource::new(),
        }
    }

    /// Create a mutator whose sink is pre-populated with already-staged
    /// records.
    pub fn with_sink(base: &'a RecordSource, sink: RecordSource) -> Self {
        RecordSourceMutator { base, sink }
    }

    /// Three-valued status of an id through the overlay: the sink's answer
    /// wins whenever the sink has observed the id at all.
    pub fn status(&self, id: &DataId) -> RecordStatus {
        match self.sink.status(id) {
            RecordStatus::Unknown => self.base.status(id),
            observed => observed,
        }
    }

    /// Typename of a record, if it exists through the overlay.
    pub fn get_type(&self, id: &DataId) -> Option<&str> {
        self.record(id).map(|r| r.typename())
    }

    /// Field value at a storage key, if the record exists and the key has
    /// been written.
    pub fn get_value(&self, id: &DataId, key: &StorageKey) -> Option<&FieldValue> {
        self.record(id).and_then(|r| r.get(key))
    }

    /// Linked id at a storage key, if the field holds a singular link.
    pub fn get_linked_id(&self, id: &DataId, key: &StorageKey) -> Option<&DataId> {
        self.get_value(id, key).and_then(FieldValue::as_link)
    }

    /// Linked ids at a storage key, if the field holds a link list.
    pub fn get_linked_ids(&self, id: &DataId, key: &StorageKey) -> Option<&[Option<DataId>]> {
        self.get_value(id, key).and_then(FieldValue::as_link_list)
    }

    /// Create a new record in the sink.
    ///
    /// Record identity is write-once: creating an id that already exists in
    /// base or sink is a contract violation.
    pub fn create(&mut self, id: DataId, typename: impl Into<String>) -> Result<(), RecordError> {
        if self.status(&id) == RecordStatus::Existent {
            return Err(RecordError::DuplicateRecord(id));
        }
        self.sink.set(Record::new(id, typename));
        Ok(())
    }

    /// Mark an id as deleted in the sink. Subsequent status checks report
    /// [`RecordStatus::NonExistent`] regardless of the base.
    pub fn delete(&mut self, id: DataId) {
        self.sink.delete(id);
    }

    /// Set a field value on an existing record.
    pub fn set_value(
        &mut self,
        id: &DataId,
        key: StorageKey,
        value: FieldValue,
    ) -> Result<(), RecordError> {
        self.sink_record_mut(id)?.set(key, value);
        Ok(())
    }

    /// Set a singular linked reference.
    pub fn set_linked_id(
        &mut self,
        id: &DataId,
        key: StorageKey,
        linked: DataId,
    ) -> Result<(), RecordError> {
        self.set_value(id, key, FieldValue::Link(linked))
    }

    /// Set a linked reference list, preserving order and per-element nulls.
    pub fn set_linked_ids(
        &mut self,
        id: &DataId,
        key: StorageKey,
        linked: Vec<Option<DataId>>,
    ) -> Result<(), RecordError> {
        self.set_value(id, key, FieldValue::LinkList(linked))
    }

    /// Overlay all fields of `from` (base overlaid by sink, sink winning)
    /// onto `to`'s sink record.
    ///
    /// Used when a refetched object must be merged into the pre-existing
    /// record holding the same identity's field superset.
    pub fn copy_fields(&mut self, from: &DataId, to: &DataId) -> Result<(), RecordError> {
        let mut merged: Vec<(StorageKey, FieldValue)> = Vec::new();
        if self.sink.status(from) != RecordStatus::NonExistent {
            if self.sink.status(from) == RecordStatus::Unknown {
                if let Some(base_record) = self.base.get(from) {
                    for (k, v) in base_record.fields() {
                        merged.push((k.clone(), v.clone()));
                    }
                }
            } else {
                // Sink has a live copy; it already overlays the base for any
                // field it carries, but base-only fields must still come first.
                if let Some(base_record) = self.base.get(from) {
                    for (k, v) in base_record.fields() {
                        merged.push((k.clone(), v.clone()));
                    }
                }
                if let Some(sink_record) = self.sink.get(from) {
                    for (k, v) in sink_record.fields() {
                        merged.push((k.clone(), v.clone()));
                    }
                }
            }
        }
        if self.record(from).is_none() {
            return Err(RecordError::MissingRecord(from.clone()));
        }

        let target = self.sink_record_mut(to)?;
        for (key, value) in merged {
            target.set(key, value);
        }
        Ok(())
    }

    /// Consume the mutator, yielding the staged sink for publishing.
    pub fn into_sink(self) -> RecordSource {
        self.sink
    }

    /// Inspect the staged sink without consuming the mutator.
    pub fn sink(&self) -> &RecordSource {
        &self.sink
    }

    /// The record visible through the overlay, if any.
    fn record(&self, id: &DataId) -> Option<&Record> {
        match self.sink.status(id) {
            RecordStatus::Existent => self.sink.get(id),
            RecordStatus::NonExistent => None,
            RecordStatus::Unknown => self.base.get(id),
        }
    }

    /// The sink's mutable copy of a record, staging it from the base on
    /// first write. Errors if the record does not exist through the overlay.
    fn sink_record_mut(&mut self, id: &DataId) -> Result<&mut Record, RecordError> {
        match self.sink.status(id) {
            RecordStatus::Existent => {}
            RecordStatus::NonExistent => return Err(RecordError::MissingRecord(id.clone())),
            RecordStatus::Unknown => match self.base.get(id) {
                Some(record) => self.sink.set(record.clone()),
                None => return Err(RecordError::MissingRecord(id.clone())),
            },
        }
        Ok(self
            .sink
            .get_mut(id)
            .expect("record staged in sink just above"))
    }
}
