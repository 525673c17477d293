//! Reader - materializes a typed snapshot from a record source.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;

use graphcache_record_store::{
    DataId, FieldValue, Record, RecordSource, RecordStatus, ScalarValue, StorageKey,
};

use crate::selector::{
    condition_passes, FragmentPointer, LinkedField, ReaderSelection, ReaderSelector, Variables,
};
use crate::Error;

/// The exact set of (record, field) pairs one read consulted.
///
/// This set - not the materialized value - is what subscription
/// invalidation diffs against. Every consultation is recorded, whether it
/// produced a value, a known null, or a miss.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencySet {
    records: BTreeMap<DataId, BTreeSet<StorageKey>>,
}

impl DependencySet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a (record, field) consultation.
    pub fn insert(&mut self, id: &DataId, key: &StorageKey) {
        self.records
            .entry(id.clone())
            .or_default()
            .insert(key.clone());
    }

    /// Record that a record was consulted at all (status or typename),
    /// without a specific field.
    pub fn insert_record(&mut self, id: &DataId) {
        self.records.entry(id.clone()).or_default();
    }

    /// True if the read consulted this record at all.
    pub fn depends_on_record(&self, id: &DataId) -> bool {
        self.records.contains_key(id)
    }

    /// True if the read consulted this exact (record, field) pair.
    pub fn depends_on(&self, id: &DataId, key: &StorageKey) -> bool {
        self.records
            .get(id)
            .map(|keys| keys.contains(key))
            .unwrap_or(false)
    }

    /// Iterate over consulted record ids.
    pub fn records(&self) -> impl Iterator<Item = &DataId> {
        self.records.keys()
    }

    /// True if nothing was consulted.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A materialized value within a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    /// Known null (stored null, deleted child, or missing data - the
    /// snapshot's missing flag disambiguates the whole read).
    Null,
    /// A scalar leaf.
    Scalar(ScalarValue),
    /// An ordered list of scalar leaves.
    ScalarList(Vec<Option<ScalarValue>>),
    /// A nested object.
    Object(SelectorData),
    /// An ordered list of nested objects.
    ObjectList(Vec<Option<SelectorData>>),
    /// An opaque handle to a fragment read lazily by its own consumer.
    Fragment(FragmentPointer),
}

/// One materialized object: response key to value, in key order.
pub type SelectorData = BTreeMap<String, DataValue>;

/// The immutable result of one read.
///
/// A fresh snapshot is produced on every re-read; a delivered snapshot is
/// never retroactively mutated.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// The materialized data, or `None` when the root record does not
    /// exist (deleted or never seen - see `is_missing_data`).
    pub data: Option<SelectorData>,
    /// True when any consulted record or field has never been observed;
    /// deletion is a known, final state and does not set this.
    pub is_missing_data: bool,
    /// The selector this snapshot was produced from.
    pub selector: ReaderSelector,
    /// Every (record, field) pair the read consulted.
    pub seen_records: DependencySet,
}

impl Snapshot {
    /// Deserialize the materialized data into a concrete type.
    ///
    /// Fragment pointers surface as `{"__id": ...}` objects so fragment
    /// consumers can re-anchor themselves.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, Error> {
        match &self.data {
            None => Ok(None),
            Some(data) => {
                let json = selector_data_to_json(data);
                Ok(Some(serde_json::from_value(json)?))
            }
        }
    }
}

fn selector_data_to_json(data: &SelectorData) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, value) in data {
        map.insert(key.clone(), data_value_to_json(value));
    }
    serde_json::Value::Object(map)
}

fn data_value_to_json(value: &DataValue) -> serde_json::Value {
    match value {
        DataValue::Null => serde_json::Value::Null,
        DataValue::Scalar(s) => s.to_json(),
        DataValue::ScalarList(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Some(s) => s.to_json(),
                    None => serde_json::Value::Null,
                })
                .collect(),
        ),
        DataValue::Object(data) => selector_data_to_json(data),
        DataValue::ObjectList(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Some(data) => selector_data_to_json(data),
                    None => serde_json::Value::Null,
                })
                .collect(),
        ),
        DataValue::Fragment(pointer) => {
            let mut map = serde_json::Map::new();
            map.insert(
                "__id".to_string(),
                serde_json::Value::String(pointer.data_id.as_str().to_string()),
            );
            serde_json::Value::Object(map)
        }
    }
}

/// Walks a reader selection tree against a record source, tracking every
/// consultation and whether anything was missing.
pub struct Reader<'s> {
    source: &'s RecordSource,
    variables: Variables,
    owner: crate::selector::RequestDescriptor,
    seen: DependencySet,
    missing: bool,
}

/// Read a selector against a source, producing a snapshot.
pub fn read(source: &RecordSource, selector: &ReaderSelector) -> Snapshot {
    Reader::read(source, selector)
}

impl<'s> Reader<'s> {
    /// Read a selector against a source, producing a snapshot.
    pub fn read(source: &'s RecordSource, selector: &ReaderSelector) -> Snapshot {
        let mut reader = Reader {
            source,
            variables: selector.variables.clone(),
            owner: selector.owner.clone(),
            seen: DependencySet::new(),
            missing: false,
        };

        let data = match source.status(&selector.data_id) {
            RecordStatus::Existent => {
                let record = source
                    .get(&selector.data_id)
                    .expect("existent record has a value");
                let mut data = SelectorData::new();
                reader.walk_selections(record, &selector.selections, &mut data, false);
                Some(data)
            }
            RecordStatus::NonExistent => {
                // Deletion is final; null without missing.
                reader.seen.insert_record(&selector.data_id);
                None
            }
            RecordStatus::Unknown => {
                reader.seen.insert_record(&selector.data_id);
                reader.missing = true;
                None
            }
        };

        Snapshot {
            data,
            is_missing_data: reader.missing,
            selector: selector.clone(),
            seen_records: reader.seen,
        }
    }

    fn walk_selections(
        &mut self,
        record: &Record,
        selections: &[ReaderSelection],
        out: &mut SelectorData,
        client_extension: bool,
    ) {
        for selection in selections {
            match selection {
                ReaderSelection::Scalar(field) => {
                    let key = field.storage_key(&self.variables);
                    self.seen.insert(record.data_id(), &key);
                    let value = match record.get(&key) {
                        Some(FieldValue::Null) => DataValue::Null,
                        Some(FieldValue::Scalar(s)) => DataValue::Scalar(s.clone()),
                        Some(FieldValue::ScalarList(items)) => {
                            DataValue::ScalarList(items.clone())
                        }
                        // A link under a scalar selection is a write-side
                        // bug; reads stay infallible and surface null.
                        Some(FieldValue::Link(_)) | Some(FieldValue::LinkList(_)) => {
                            DataValue::Null
                        }
                        None => {
                            if !client_extension {
                                self.missing = true;
                            }
                            DataValue::Null
                        }
                    };
                    out.insert(field.response_key().to_string(), value);
                }
                ReaderSelection::Linked(field) => {
                    let value = self.read_linked(record, field, client_extension);
                    out.insert(field.response_key().to_string(), value);
                }
                ReaderSelection::FragmentSpread { name } => {
                    self.seen.insert_record(record.data_id());
                    out.insert(
                        name.clone(),
                        DataValue::Fragment(FragmentPointer {
                            data_id: record.data_id().clone(),
                            variables: self.variables.clone(),
                            owner: self.owner.clone(),
                        }),
                    );
                }
                ReaderSelection::InlineFragment {
                    type_condition,
                    selections,
                } => {
                    self.seen.insert_record(record.data_id());
                    if record.typename() == type_condition {
                        self.walk_selections(record, selections, out, client_extension);
                    }
                }
                ReaderSelection::Condition {
                    passing_value,
                    variable,
                    selections,
                } => {
                    if condition_passes(*passing_value, variable, &self.variables) {
                        self.walk_selections(record, selections, out, client_extension);
                    }
                }
                ReaderSelection::ClientExtension { selections } => {
                    self.walk_selections(record, selections, out, true);
                }
            }
        }
    }

    fn read_linked(
        &mut self,
        record: &Record,
        field: &LinkedField<ReaderSelection>,
        client_extension: bool,
    ) -> DataValue {
        let key = field.storage_key(&self.variables);
        self.seen.insert(record.data_id(), &key);

        match record.get(&key) {
            None => {
                if !client_extension {
                    self.missing = true;
                }
                DataValue::Null
            }
            Some(FieldValue::Null) => DataValue::Null,
            Some(FieldValue::Link(child)) if !field.plural => {
                match self.read_child(child, &field.selections, client_extension) {
                    Some(data) => DataValue::Object(data),
                    None => DataValue::Null,
                }
            }
            Some(FieldValue::LinkList(children)) if field.plural => DataValue::ObjectList(
                children
                    .iter()
                    .map(|child| {
                        child.as_ref().and_then(|id| {
                            self.read_child(id, &field.selections, client_extension)
                        })
                    })
                    .collect(),
            ),
            // Stored shape disagrees with the selection; write-side bug,
            // reads stay infallible.
            Some(_) => DataValue::Null,
        }
    }

    fn read_child(
        &mut self,
        id: &DataId,
        selections: &[ReaderSelection],
        client_extension: bool,
    ) -> Option<SelectorData> {
        match self.source.status(id) {
            RecordStatus::Existent => {
                let record = self.source.get(id).expect("existent record has a value");
                let mut data = SelectorData::new();
                self.walk_selections(record, selections, &mut data, client_extension);
                Some(data)
            }
            RecordStatus::NonExistent => {
                self.seen.insert_record(id);
                None
            }
            RecordStatus::Unknown => {
                self.seen.insert_record(id);
                if !client_extension {
                    self.missing = true;
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{
        Argument, ReaderSelection, ReaderSelector, RequestDescriptor, ScalarField,
    };
    use crate::variables;
    use graphcache_record_store::Record;
    use serde_json::json;

    fn owner() -> RequestDescriptor {
        RequestDescriptor::new("TestQuery", Variables::new())
    }

    fn pokemon_source() -> RecordSource {
        let mut source = RecordSource::new();

        let mut root = Record::new(DataId::root(), "__Root");
        root.set(
            StorageKey::with_args("pokemon", &[("id".to_string(), json!("001"))]),
            FieldValue::Link(DataId::from("P1")),
        );
        source.set(root);

        let mut pokemon = Record::new(DataId::from("P1"), "Pokemon");
        pokemon.set(StorageKey::plain("id"), FieldValue::Scalar("P1".into()));
        pokemon.set(
            StorageKey::plain("name"),
            FieldValue::Scalar("Bulbasaur".into()),
        );
        source.set(pokemon);

        source
    }

    fn pokemon_selector() -> ReaderSelector {
        ReaderSelector::new(
            DataId::root(),
            variables! { "id" => "001" },
            vec![ReaderSelection::Linked(
                LinkedField::new("pokemon")
                    .argument(Argument::variable("id", "id"))
                    .selection(ReaderSelection::Scalar(ScalarField::new("id")))
                    .selection(ReaderSelection::Scalar(ScalarField::new("name"))),
            )],
            owner(),
        )
    }

    #[test]
    fn materializes_nested_objects() {
        let snapshot = Reader::read(&pokemon_source(), &pokemon_selector());

        assert!(!snapshot.is_missing_data);
        let data = snapshot.data.unwrap();
        let DataValue::Object(pokemon) = &data["pokemon"] else {
            panic!("expected object");
        };
        assert_eq!(
            pokemon["name"],
            DataValue::Scalar(ScalarValue::from("Bulbasaur"))
        );
    }

    #[test]
    fn dependency_set_is_precise() {
        let snapshot = Reader::read(&pokemon_source(), &pokemon_selector());

        let deps = &snapshot.seen_records;
        let link_key = StorageKey::with_args("pokemon", &[("id".to_string(), json!("001"))]);
        assert!(deps.depends_on(&DataId::root(), &link_key));
        assert!(deps.depends_on(&DataId::from("P1"), &StorageKey::plain("name")));
        assert!(!deps.depends_on(&DataId::from("P1"), &StorageKey::plain("number")));
    }

    #[test]
    fn unknown_root_is_null_and_missing() {
        let snapshot = Reader::read(&RecordSource::new(), &pokemon_selector());
        assert!(snapshot.data.is_none());
        assert!(snapshot.is_missing_data);
        assert!(snapshot.seen_records.depends_on_record(&DataId::root()));
    }

    #[test]
    fn deleted_root_is_null_without_missing() {
        let mut source = RecordSource::new();
        source.delete(DataId::root());

        let snapshot = Reader::read(&source, &pokemon_selector());
        assert!(snapshot.data.is_none());
        assert!(!snapshot.is_missing_data);
    }

    #[test]
    fn deleted_child_reads_null_without_missing() {
        let mut source = pokemon_source();
        source.delete(DataId::from("P1"));

        let snapshot = Reader::read(&source, &pokemon_selector());
        assert!(!snapshot.is_missing_data);
        assert_eq!(snapshot.data.unwrap()["pokemon"], DataValue::Null);
    }

    #[test]
    fn unknown_child_reads_null_with_missing() {
        let mut source = pokemon_source();
        source.remove(&DataId::from("P1"));

        let snapshot = Reader::read(&source, &pokemon_selector());
        assert!(snapshot.is_missing_data);
        assert_eq!(snapshot.data.unwrap()["pokemon"], DataValue::Null);
    }

    #[test]
    fn unwritten_field_on_existing_record_is_missing() {
        let mut source = pokemon_source();
        // Forget the name field only.
        let mut pokemon = Record::new(DataId::from("P1"), "Pokemon");
        pokemon.set(StorageKey::plain("id"), FieldValue::Scalar("P1".into()));
        source.set(pokemon);

        let snapshot = Reader::read(&source, &pokemon_selector());
        assert!(snapshot.is_missing_data);
        let data = snapshot.data.unwrap();
        let DataValue::Object(pokemon) = &data["pokemon"] else {
            panic!("expected object");
        };
        assert_eq!(pokemon["name"], DataValue::Null);
        // The miss is still a recorded dependency.
        assert!(snapshot
            .seen_records
            .depends_on(&DataId::from("P1"), &StorageKey::plain("name")));
    }

    #[test]
    fn null_list_is_known_but_absent_list_is_missing() {
        let selector = ReaderSelector::new(
            DataId::root(),
            variables! {},
            vec![ReaderSelection::Linked(
                LinkedField::new("team")
                    .plural()
                    .selection(ReaderSelection::Scalar(ScalarField::new("id"))),
            )],
            owner(),
        );

        let mut source = RecordSource::new();
        let mut root = Record::new(DataId::root(), "__Root");
        root.set(StorageKey::plain("team"), FieldValue::Null);
        source.set(root);

        let snapshot = Reader::read(&source, &selector);
        assert!(!snapshot.is_missing_data);
        assert_eq!(snapshot.data.unwrap()["team"], DataValue::Null);

        let mut source = RecordSource::new();
        source.set(Record::new(DataId::root(), "__Root"));
        let snapshot = Reader::read(&source, &selector);
        assert!(snapshot.is_missing_data);
    }

    #[test]
    fn fragment_spread_yields_pointer_not_data() {
        let selector = ReaderSelector::new(
            DataId::root(),
            variables! { "id" => "001" },
            vec![ReaderSelection::Linked(
                LinkedField::new("pokemon")
                    .argument(Argument::variable("id", "id"))
                    .selection(ReaderSelection::FragmentSpread {
                        name: "PokemonDetails".to_string(),
                    }),
            )],
            owner(),
        );

        let snapshot = Reader::read(&pokemon_source(), &selector);
        assert!(!snapshot.is_missing_data);
        let data = snapshot.data.unwrap();
        let DataValue::Object(pokemon) = &data["pokemon"] else {
            panic!("expected object");
        };
        let DataValue::Fragment(pointer) = &pokemon["PokemonDetails"] else {
            panic!("expected fragment pointer");
        };
        assert_eq!(pointer.data_id, DataId::from("P1"));
        // The parent read took no dependency on the fragment's fields.
        assert!(!snapshot
            .seen_records
            .depends_on(&DataId::from("P1"), &StorageKey::plain("name")));
    }

    #[test]
    fn condition_skips_match_normalizer() {
        let selector = ReaderSelector::new(
            DataId::root(),
            variables! { "withName" => false },
            vec![ReaderSelection::Condition {
                passing_value: true,
                variable: "withName".to_string(),
                selections: vec![ReaderSelection::Scalar(ScalarField::new("name"))],
            }],
            owner(),
        );

        let mut source = RecordSource::new();
        source.set(Record::new(DataId::root(), "__Root"));

        let snapshot = Reader::read(&source, &selector);
        // Skipped selections neither read nor count as missing.
        assert!(!snapshot.is_missing_data);
        assert!(snapshot.data.unwrap().is_empty());
    }

    #[test]
    fn client_extension_misses_are_not_missing_data() {
        let selector = ReaderSelector::new(
            DataId::root(),
            variables! {},
            vec![ReaderSelection::ClientExtension {
                selections: vec![ReaderSelection::Scalar(ScalarField::new("localFlag"))],
            }],
            owner(),
        );

        let mut source = RecordSource::new();
        source.set(Record::new(DataId::root(), "__Root"));

        let snapshot = Reader::read(&source, &selector);
        assert!(!snapshot.is_missing_data);
        assert_eq!(snapshot.data.unwrap()["localFlag"], DataValue::Null);
    }

    #[test]
    fn typed_extraction_via_serde() {
        #[derive(serde::Deserialize)]
        struct PokemonData {
            pokemon: Pokemon,
        }
        #[derive(serde::Deserialize)]
        struct Pokemon {
            id: String,
            name: String,
        }

        let snapshot = Reader::read(&pokemon_source(), &pokemon_selector());
        let data: PokemonData = snapshot.data_as().unwrap().unwrap();
        assert_eq!(data.pokemon.id, "P1");
        assert_eq!(data.pokemon.name, "Bulbasaur");
    }
}
