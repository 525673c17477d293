//! ResponseNormalizer - flattens a raw payload into records through a mutator.

use std::collections::BTreeSet;

use graphcache_record_store::{
    DataId, FieldValue, RecordSourceMutator, RecordStatus, ScalarValue, StorageKey, ROOT_TYPE,
    UNKNOWN_TYPE,
};

use crate::selector::{
    condition_passes, LinkedField, NormalizationSelection, NormalizationSelector, Variables,
};
use crate::Error;

/// Everything a field handle needs to post-process one linked write.
///
/// Queued by the normalizer whenever it meets a handle-decorated field; the
/// publish queue dispatches these to registered handlers after
/// normalization finishes.
#[derive(Clone, Debug, PartialEq)]
pub struct HandleFieldPayload {
    /// Handler name, e.g. `"connection"`.
    pub handle: String,
    /// User-chosen handle key.
    pub key: String,
    /// The record the field lives on.
    pub record_id: DataId,
    /// Where the plain linked write landed.
    pub storage_key: StorageKey,
    /// The synthetic slot the handle's output lives under.
    pub handle_key: StorageKey,
}

/// The outcome of one normalization pass.
#[derive(Debug, Default)]
pub struct NormalizedPayload {
    /// Every record id the pass wrote to, in id order.
    pub written: BTreeSet<DataId>,
    /// Handle payloads collected along the way, in traversal order.
    pub handle_payloads: Vec<HandleFieldPayload>,
}

/// Walks a normalization selection tree in lockstep with a raw payload,
/// writing flattened records into a mutator's sink.
///
/// A payload shape that does not match the selection tree is a fatal
/// error: the caller discards the whole sink, so normalization never
/// partially succeeds into a state the reader cannot reconstruct.
pub struct ResponseNormalizer<'m, 'b> {
    mutator: &'m mut RecordSourceMutator<'b>,
    variables: Variables,
    output: NormalizedPayload,
}

impl<'m, 'b> ResponseNormalizer<'m, 'b> {
    /// Normalize one payload under one selector, staging all writes in the
    /// mutator's sink.
    pub fn normalize(
        mutator: &'m mut RecordSourceMutator<'b>,
        selector: &NormalizationSelector,
        payload: &serde_json::Value,
    ) -> Result<NormalizedPayload, Error> {
        let mut normalizer = ResponseNormalizer {
            mutator,
            variables: selector.variables.clone(),
            output: NormalizedPayload::default(),
        };

        let root = &selector.data_id;
        if normalizer.mutator.status(root) != RecordStatus::Existent {
            let typename = if root.is_root() {
                ROOT_TYPE.to_string()
            } else {
                record_typename(payload, None)
            };
            normalizer.mutator.create(root.clone(), typename)?;
        }
        normalizer.output.written.insert(root.clone());

        let object = expect_object(payload, root, "<root>")?;
        normalizer.walk_selections(root, &selector.selections, object, false)?;
        Ok(normalizer.output)
    }

    fn walk_selections(
        &mut self,
        id: &DataId,
        selections: &[NormalizationSelection],
        object: &serde_json::Map<String, serde_json::Value>,
        client_extension: bool,
    ) -> Result<(), Error> {
        for selection in selections {
            match selection {
                NormalizationSelection::Scalar(field) => {
                    let key = field.storage_key(&self.variables);
                    match object.get(field.response_key()) {
                        None if client_extension => {}
                        None | Some(serde_json::Value::Null) => {
                            self.write(id, key, FieldValue::Null)?;
                        }
                        Some(value) => {
                            let stored = scalar_field_value(value).ok_or_else(|| {
                                Error::PayloadShape {
                                    data_id: id.clone(),
                                    key: field.response_key().to_string(),
                                    message: "expected scalar or scalar list, found object"
                                        .to_string(),
                                }
                            })?;
                            self.write(id, key, stored)?;
                        }
                    }
                }
                NormalizationSelection::Linked(field) => {
                    self.walk_linked(id, field, object, client_extension)?;
                }
                NormalizationSelection::Handle(handle) => {
                    // The plain linked write is never special-cased away;
                    // handle processing is additive on top of it. The
                    // handle slot itself is left untouched here - it may
                    // hold state accumulated across earlier payloads, and
                    // only the dispatching handler (or the queue's
                    // fallback) may decide how the fresh links fold in.
                    self.walk_linked(id, &handle.field, object, client_extension)?;

                    let storage_key = handle.field.storage_key(&self.variables);
                    let handle_key = StorageKey::handle(&handle.handle, &handle.key);
                    self.output.handle_payloads.push(HandleFieldPayload {
                        handle: handle.handle.clone(),
                        key: handle.key.clone(),
                        record_id: id.clone(),
                        storage_key,
                        handle_key,
                    });
                }
                NormalizationSelection::InlineFragment {
                    type_condition,
                    selections,
                } => {
                    // Match against the record's typename, which already
                    // folds in the payload's `__typename` and the field's
                    // pinned concrete type. The reader matches the same
                    // way.
                    let matches = self
                        .mutator
                        .get_type(id)
                        .map(|t| t == type_condition)
                        .unwrap_or(false);
                    if matches {
                        self.walk_selections(id, selections, object, client_extension)?;
                    }
                }
                NormalizationSelection::Condition {
                    passing_value,
                    variable,
                    selections,
                } => {
                    if condition_passes(*passing_value, variable, &self.variables) {
                        self.walk_selections(id, selections, object, client_extension)?;
                    }
                }
                NormalizationSelection::ClientExtension { selections } => {
                    self.walk_selections(id, selections, object, true)?;
                }
            }
        }
        Ok(())
    }

    fn walk_linked(
        &mut self,
        parent: &DataId,
        field: &LinkedField<NormalizationSelection>,
        object: &serde_json::Map<String, serde_json::Value>,
        client_extension: bool,
    ) -> Result<(), Error> {
        let key = field.storage_key(&self.variables);
        match object.get(field.response_key()) {
            None if client_extension => Ok(()),
            None | Some(serde_json::Value::Null) => self.write(parent, key, FieldValue::Null),
            Some(serde_json::Value::Array(items)) if field.plural => {
                let mut linked = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    match item {
                        serde_json::Value::Null => linked.push(None),
                        serde_json::Value::Object(child) => {
                            let child_id = self.child_data_id(parent, &key, Some(index), child);
                            self.normalize_child(child_id.clone(), field, child)?;
                            linked.push(Some(child_id));
                        }
                        _ => {
                            return Err(Error::PayloadShape {
                                data_id: parent.clone(),
                                key: field.response_key().to_string(),
                                message: format!(
                                    "expected object or null at index {}, found scalar",
                                    index
                                ),
                            })
                        }
                    }
                }
                self.write(parent, key, FieldValue::LinkList(linked))
            }
            Some(serde_json::Value::Object(child)) if !field.plural => {
                let child_id = self.child_data_id(parent, &key, None, child);
                self.normalize_child(child_id.clone(), field, child)?;
                self.write(parent, key, FieldValue::Link(child_id))
            }
            Some(_) => Err(Error::PayloadShape {
                data_id: parent.clone(),
                key: field.response_key().to_string(),
                message: if field.plural {
                    "expected array or null for plural linked field".to_string()
                } else {
                    "expected object or null for linked field".to_string()
                },
            }),
        }
    }

    /// The child's identity: the payload's `id` when present, otherwise a
    /// deterministic synthetic id derived from the link location.
    fn child_data_id(
        &self,
        parent: &DataId,
        key: &StorageKey,
        index: Option<usize>,
        child: &serde_json::Map<String, serde_json::Value>,
    ) -> DataId {
        if let Some(id) = child.get("id").and_then(serde_json::Value::as_str) {
            return DataId::from(id);
        }
        match index {
            Some(i) => DataId::client_generated_indexed(parent, key, i),
            None => DataId::client_generated(parent, key),
        }
    }

    fn normalize_child(
        &mut self,
        child_id: DataId,
        field: &LinkedField<NormalizationSelection>,
        child: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), Error> {
        if self.mutator.status(&child_id) != RecordStatus::Existent {
            let typename = record_typename(
                &serde_json::Value::Object(child.clone()),
                field.concrete_type.as_deref(),
            );
            self.mutator.create(child_id.clone(), typename)?;
        }
        self.output.written.insert(child_id.clone());
        self.walk_selections(&child_id, &field.selections, child, false)
    }

    fn write(&mut self, id: &DataId, key: StorageKey, value: FieldValue) -> Result<(), Error> {
        self.mutator.set_value(id, key, value)?;
        self.output.written.insert(id.clone());
        Ok(())
    }
}

/// Typename for a record being created: the payload's `__typename`, else
/// the field's concrete type, else the unknown-type marker.
fn record_typename(payload: &serde_json::Value, concrete_type: Option<&str>) -> String {
    payload
        .get("__typename")
        .and_then(serde_json::Value::as_str)
        .or(concrete_type)
        .unwrap_or(UNKNOWN_TYPE)
        .to_string()
}

fn expect_object<'p>(
    payload: &'p serde_json::Value,
    id: &DataId,
    key: &str,
) -> Result<&'p serde_json::Map<String, serde_json::Value>, Error> {
    payload.as_object().ok_or_else(|| Error::PayloadShape {
        data_id: id.clone(),
        key: key.to_string(),
        message: "expected object".to_string(),
    })
}

/// Convert a JSON leaf or scalar array into a storable field value.
fn scalar_field_value(value: &serde_json::Value) -> Option<FieldValue> {
    match value {
        serde_json::Value::Array(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    serde_json::Value::Null => list.push(None),
                    other => list.push(Some(ScalarValue::from_json(other)?)),
                }
            }
            Some(FieldValue::ScalarList(list))
        }
        other => ScalarValue::from_json(other).map(FieldValue::Scalar),
    }
}
