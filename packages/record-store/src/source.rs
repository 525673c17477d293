//! RecordSource - the keyed collection of records, with tombstones.

use std::collections::BTreeMap;

use crate::{DataId, Record};

/// The three possible answers when asking a source about an id.
///
/// Callers must distinguish "this record was deleted" (authoritative) from
/// "we have never heard of this record" (defers to a fallback layer, or
/// reads as missing data).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordStatus {
    /// A record exists for this id.
    Existent,
    /// The id was explicitly deleted; a tombstone is present.
    NonExistent,
    /// The id has never been observed.
    Unknown,
}

/// A collection of records keyed by identity.
///
/// An entry is either a live record or a tombstone left by a delete. Keys
/// that were never observed are a third, implicit state - see
/// [`RecordStatus`].
///
/// # Example
///
/// ```rust
/// use graphcache_record_store::{DataId, Record, RecordSource, RecordStatus};
///
/// let mut source = RecordSource::new();
/// source.set(Record::new(DataId::from("P1"), "Pokemon"));
/// assert_eq!(source.status(&DataId::from("P1")), RecordStatus::Existent);
///
/// source.delete(DataId::from("P1"));
/// assert_eq!(source.status(&DataId::from("P1")), RecordStatus::NonExistent);
/// assert_eq!(source.status(&DataId::from("P2")), RecordStatus::Unknown);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordSource {
    records: BTreeMap<DataId, Option<Record>>,
}

impl RecordSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a record by id. Tombstoned and unknown ids both read as `None`;
    /// use [`status`](Self::status) to tell them apart.
    pub fn get(&self, id: &DataId) -> Option<&Record> {
        self.records.get(id).and_then(|entry| entry.as_ref())
    }

    /// Get a mutable record by id.
    pub fn get_mut(&mut self, id: &DataId) -> Option<&mut Record> {
        self.records.get_mut(id).and_then(|entry| entry.as_mut())
    }

    /// Insert or replace a record, keyed by its own identity.
    pub fn set(&mut self, record: Record) {
        self.records.insert(record.data_id().clone(), Some(record));
    }

    /// Mark an id as explicitly deleted.
    pub fn delete(&mut self, id: DataId) {
        self.records.insert(id, None);
    }

    /// Forget an id entirely, returning its status to
    /// [`RecordStatus::Unknown`]. Used by garbage collection.
    pub fn remove(&mut self, id: &DataId) {
        self.records.remove(id);
    }

    /// Three-valued existence check for an id.
    pub fn status(&self, id: &DataId) -> RecordStatus {
        match self.records.get(id) {
            Some(Some(_)) => RecordStatus::Existent,
            Some(None) => RecordStatus::NonExistent,
            None => RecordStatus::Unknown,
        }
    }

    /// Iterate over all observed ids, including tombstoned ones.
    pub fn ids(&self) -> impl Iterator<Item = &DataId> {
        self.records.keys()
    }

    /// Iterate over all entries; a `None` value is a tombstone.
    pub fn entries(&self) -> impl Iterator<Item = (&DataId, Option<&Record>)> {
        self.records.iter().map(|(id, entry)| (id, entry.as_ref()))
    }

    /// Number of observed ids, tombstones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no ids have been observed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all records and tombstones.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
