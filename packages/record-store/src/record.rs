//! The Record type - one identity's flattened fields.

use std::collections::BTreeMap;

use crate::{DataId, FieldValue, StorageKey};

/// A single record: an identity, a typename, and a map of storage keys to
/// field values.
///
/// Records are created only by normalization (or an imperative updater
/// going through a mutator) and are treated as immutable value types once
/// published - a reader's snapshot is never retroactively mutated.
///
/// Uses `BTreeMap` for deterministic field ordering (important for diffing
/// and comparison).
///
/// # Example
///
/// ```rust
/// use graphcache_record_store::{DataId, FieldValue, Record, ScalarValue, StorageKey};
///
/// let mut record = Record::new(DataId::from("P1"), "Pokemon");
/// record.set(StorageKey::plain("name"), FieldValue::Scalar(ScalarValue::from("Bulbasaur")));
///
/// assert_eq!(record.typename(), "Pokemon");
/// assert!(record.get(&StorageKey::plain("name")).is_some());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    data_id: DataId,
    typename: String,
    fields: BTreeMap<StorageKey, FieldValue>,
}

impl Record {
    /// Create an empty record for an identity.
    pub fn new(data_id: DataId, typename: impl Into<String>) -> Self {
        Record {
            data_id,
            typename: typename.into(),
            fields: BTreeMap::new(),
        }
    }

    /// The record's identity.
    pub fn data_id(&self) -> &DataId {
        &self.data_id
    }

    /// The record's typename.
    pub fn typename(&self) -> &str {
        &self.typename
    }

    /// Get a field value by storage key.
    ///
    /// `None` means the key has never been written on this record, which is
    /// distinct from a stored [`FieldValue::Null`].
    pub fn get(&self, key: &StorageKey) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Set a field value, replacing any previous value at that key.
    pub fn set(&mut self, key: StorageKey, value: FieldValue) {
        self.fields.insert(key, value);
    }

    /// Iterate over the record's fields in key order.
    pub fn fields(&self) -> impl Iterator<Item = (&StorageKey, &FieldValue)> {
        self.fields.iter()
    }

    /// Number of written fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no fields have been written.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Overlay all of `other`'s fields onto this record, `other` winning on
    /// conflicts. Identity and typename of `self` are kept.
    pub fn copy_fields_from(&mut self, other: &Record) {
        for (key, value) in other.fields() {
            self.fields.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScalarValue;

    fn record(id: &str, typename: &str) -> Record {
        Record::new(DataId::from(id), typename)
    }

    #[test]
    fn unwritten_field_is_distinct_from_null() {
        let mut r = record("P1", "Pokemon");
        r.set(StorageKey::plain("name"), FieldValue::Null);

        assert_eq!(r.get(&StorageKey::plain("name")), Some(&FieldValue::Null));
        assert_eq!(r.get(&StorageKey::plain("number")), None);
    }

    #[test]
    fn set_replaces_previous_value() {
        let mut r = record("P1", "Pokemon");
        let key = StorageKey::plain("name");
        r.set(key.clone(), FieldValue::Scalar(ScalarValue::from("Bulbasaur")));
        r.set(key.clone(), FieldValue::Scalar(ScalarValue::from("Ivysaur")));

        assert_eq!(
            r.get(&key),
            Some(&FieldValue::Scalar(ScalarValue::from("Ivysaur")))
        );
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn copy_fields_overlays_and_keeps_identity() {
        let mut target = record("P1", "Pokemon");
        target.set(StorageKey::plain("name"), FieldValue::Scalar("old".into()));
        target.set(StorageKey::plain("number"), FieldValue::Scalar(1i64.into()));

        let mut source = record("refetched", "Pokemon");
        source.set(StorageKey::plain("name"), FieldValue::Scalar("new".into()));

        target.copy_fields_from(&source);

        assert_eq!(target.data_id(), &DataId::from("P1"));
        assert_eq!(
            target.get(&StorageKey::plain("name")),
            Some(&FieldValue::Scalar("new".into()))
        );
        // Fields not present in the source survive.
        assert_eq!(
            target.get(&StorageKey::plain("number")),
            Some(&FieldValue::Scalar(1i64.into()))
        );
    }
}
