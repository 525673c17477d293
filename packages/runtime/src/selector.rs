//! Compiled selector trees and the descriptors that instantiate them.
//!
//! These types are produced by the query-plan compiler and consumed here as
//! immutable input. The runtime never parses query documents; it walks
//! these trees against payloads (normalization) or against a record source
//! (reading).

use std::collections::BTreeMap;
use std::sync::Arc;

use graphcache_record_store::{DataId, StorageKey};

/// Concrete variable values a selector is instantiated with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variables(BTreeMap<String, serde_json::Value>);

impl Variables {
    /// Empty variable set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a variable by name.
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// Set a variable, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.0.insert(name.into(), value);
    }
}

impl From<BTreeMap<String, serde_json::Value>> for Variables {
    fn from(map: BTreeMap<String, serde_json::Value>) -> Self {
        Variables(map)
    }
}

impl FromIterator<(String, serde_json::Value)> for Variables {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Variables(iter.into_iter().collect())
    }
}

/// Macro for building a [`Variables`] map from `name => json` pairs.
///
/// # Example
///
/// ```rust
/// use graphcache_runtime::variables;
///
/// let vars = variables! { "id" => "001", "first" => 10 };
/// assert!(vars.get("id").is_some());
/// ```
#[macro_export]
macro_rules! variables {
    () => { $crate::Variables::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut vars = $crate::Variables::new();
        $(vars.insert($name, ::serde_json::json!($value));)+
        vars
    }};
}

/// An argument value: either a literal baked in by the compiler or a
/// reference to a variable resolved at instantiation time.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgumentValue {
    /// A literal JSON value.
    Literal(serde_json::Value),
    /// A reference to a variable by name.
    Variable(String),
}

/// A named field argument.
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    /// Argument name.
    pub name: String,
    /// Literal or variable-referencing value.
    pub value: ArgumentValue,
}

impl Argument {
    /// A literal argument.
    pub fn literal(name: impl Into<String>, value: serde_json::Value) -> Self {
        Argument {
            name: name.into(),
            value: ArgumentValue::Literal(value),
        }
    }

    /// A variable-referencing argument.
    pub fn variable(name: impl Into<String>, variable: impl Into<String>) -> Self {
        Argument {
            name: name.into(),
            value: ArgumentValue::Variable(variable.into()),
        }
    }

    /// Resolve against concrete variables. An unknown variable resolves to
    /// JSON null, matching what the server would have received.
    pub fn resolve(&self, variables: &Variables) -> serde_json::Value {
        match &self.value {
            ArgumentValue::Literal(v) => v.clone(),
            ArgumentValue::Variable(name) => variables
                .get(name)
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Compute the canonical storage key for a field invocation.
///
/// The single canonicalization point shared by the normalizer and the
/// reader; the two must agree or values written by one become invisible to
/// the other.
pub fn storage_key(name: &str, arguments: &[Argument], variables: &Variables) -> StorageKey {
    if arguments.is_empty() {
        return StorageKey::plain(name);
    }
    let resolved: Vec<(String, serde_json::Value)> = arguments
        .iter()
        .map(|arg| (arg.name.clone(), arg.resolve(variables)))
        .collect();
    StorageKey::with_args(name, &resolved)
}

/// Evaluate an `@include`/`@skip`-style condition against variables.
///
/// Selections guarded by a condition are walked only when the variable's
/// boolean value equals `passing_value`. A missing or non-boolean variable
/// counts as false.
pub fn condition_passes(passing_value: bool, variable: &str, variables: &Variables) -> bool {
    let actual = variables
        .get(variable)
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    actual == passing_value
}

/// A scalar field selection.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarField {
    /// Schema field name.
    pub name: String,
    /// Response alias, if the query renamed the field.
    pub alias: Option<String>,
    /// Field arguments.
    pub arguments: Vec<Argument>,
}

impl ScalarField {
    /// An argument-less, un-aliased scalar field.
    pub fn new(name: impl Into<String>) -> Self {
        ScalarField {
            name: name.into(),
            alias: None,
            arguments: Vec::new(),
        }
    }

    /// Set the response alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add an argument.
    pub fn argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// The key this field appears under in the response payload.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// The canonical storage key for this field under concrete variables.
    pub fn storage_key(&self, variables: &Variables) -> StorageKey {
        storage_key(&self.name, &self.arguments, variables)
    }
}

/// A linked field selection, generic over the selection kind of its
/// children so the same shape serves normalization and reader trees.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkedField<S> {
    /// Schema field name.
    pub name: String,
    /// Response alias, if the query renamed the field.
    pub alias: Option<String>,
    /// Field arguments.
    pub arguments: Vec<Argument>,
    /// True for list-valued fields.
    pub plural: bool,
    /// Concrete child typename, when the schema pins one.
    pub concrete_type: Option<String>,
    /// Child selections.
    pub selections: Vec<S>,
}

impl<S> LinkedField<S> {
    /// A singular linked field with no children yet.
    pub fn new(name: impl Into<String>) -> Self {
        LinkedField {
            name: name.into(),
            alias: None,
            arguments: Vec::new(),
            plural: false,
            concrete_type: None,
            selections: Vec::new(),
        }
    }

    /// Set the response alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add an argument.
    pub fn argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Mark the field as list-valued.
    pub fn plural(mut self) -> Self {
        self.plural = true;
        self
    }

    /// Pin the child typename.
    pub fn concrete_type(mut self, typename: impl Into<String>) -> Self {
        self.concrete_type = Some(typename.into());
        self
    }

    /// Add a child selection.
    pub fn selection(mut self, selection: S) -> Self {
        self.selections.push(selection);
        self
    }

    /// The key this field appears under in the response payload.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// The canonical storage key for this field under concrete variables.
    pub fn storage_key(&self, variables: &Variables) -> StorageKey {
        storage_key(&self.name, &self.arguments, variables)
    }
}

/// A linked field decorated with a handle marker.
///
/// The underlying linked write happens exactly as for a plain linked field;
/// handle processing is additive on top of it.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkedHandle {
    /// The decorated field.
    pub field: LinkedField<NormalizationSelection>,
    /// Handler name, e.g. `"connection"`.
    pub handle: String,
    /// User-chosen handle key, scoping the synthetic storage slot.
    pub key: String,
}

/// One node of a normalization selection tree. Drives writes.
#[derive(Clone, Debug, PartialEq)]
pub enum NormalizationSelection {
    /// A scalar leaf.
    Scalar(ScalarField),
    /// A link to one or more child records.
    Linked(LinkedField<NormalizationSelection>),
    /// Selections applied only when the payload object's typename matches.
    InlineFragment {
        /// Typename the payload must carry.
        type_condition: String,
        /// Guarded selections.
        selections: Vec<NormalizationSelection>,
    },
    /// Selections guarded by a boolean variable.
    Condition {
        /// Whether the variable must be true or false to pass.
        passing_value: bool,
        /// The guarding variable's name.
        variable: String,
        /// Guarded selections.
        selections: Vec<NormalizationSelection>,
    },
    /// A linked field with an attached handle marker.
    Handle(LinkedHandle),
    /// Client-only selections; absent in server payloads by design.
    ClientExtension {
        /// Client-schema selections.
        selections: Vec<NormalizationSelection>,
    },
}

/// One node of a reader selection tree. Drives reads.
#[derive(Clone, Debug, PartialEq)]
pub enum ReaderSelection {
    /// A scalar leaf.
    Scalar(ScalarField),
    /// A link to one or more child records.
    Linked(LinkedField<ReaderSelection>),
    /// A named fragment resolved lazily by its own consumer.
    FragmentSpread {
        /// Fragment name; doubles as the response key of the pointer.
        name: String,
    },
    /// Selections applied only when the record's typename matches.
    InlineFragment {
        /// Typename the record must carry.
        type_condition: String,
        /// Guarded selections.
        selections: Vec<ReaderSelection>,
    },
    /// Selections guarded by a boolean variable.
    Condition {
        /// Whether the variable must be true or false to pass.
        passing_value: bool,
        /// The guarding variable's name.
        variable: String,
        /// Guarded selections.
        selections: Vec<ReaderSelection>,
    },
    /// Client-only selections; never counted as missing data.
    ClientExtension {
        /// Client-schema selections.
        selections: Vec<ReaderSelection>,
    },
}

/// Identity of one request instance.
///
/// Two descriptors are the same request when their `request_id` matches;
/// variables are carried along for convenience.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    /// Unique id of the request instance (operation name + variables hash,
    /// assigned by the caller).
    pub request_id: String,
    /// The variables the request was issued with.
    pub variables: Variables,
}

impl RequestDescriptor {
    /// Create a descriptor.
    pub fn new(request_id: impl Into<String>, variables: Variables) -> Self {
        RequestDescriptor {
            request_id: request_id.into(),
            variables,
        }
    }
}

/// A normalization tree instantiated at a root record with concrete
/// variables. Drives one write.
#[derive(Clone, Debug)]
pub struct NormalizationSelector {
    /// The record the walk starts at.
    pub data_id: DataId,
    /// Concrete variable values.
    pub variables: Variables,
    /// The compiled selection tree.
    pub selections: Arc<[NormalizationSelection]>,
}

impl NormalizationSelector {
    /// Instantiate a normalization tree at a root id.
    pub fn new(
        data_id: DataId,
        variables: Variables,
        selections: Vec<NormalizationSelection>,
    ) -> Self {
        NormalizationSelector {
            data_id,
            variables,
            selections: selections.into(),
        }
    }
}

/// A reader tree instantiated at a root record with concrete variables and
/// an owning request. Drives one read.
#[derive(Clone, Debug)]
pub struct ReaderSelector {
    /// The record the walk starts at.
    pub data_id: DataId,
    /// Concrete variable values.
    pub variables: Variables,
    /// The compiled selection tree.
    pub selections: Arc<[ReaderSelection]>,
    /// The request responsible for completing this data.
    pub owner: RequestDescriptor,
}

impl ReaderSelector {
    /// Instantiate a reader tree at a root id.
    pub fn new(
        data_id: DataId,
        variables: Variables,
        selections: Vec<ReaderSelection>,
        owner: RequestDescriptor,
    ) -> Self {
        ReaderSelector {
            data_id,
            variables,
            selections: selections.into(),
            owner,
        }
    }
}

/// A full operation: the request identity plus the write and read trees the
/// compiler emitted for it, both rooted at the synthetic root record.
#[derive(Clone, Debug)]
pub struct OperationDescriptor {
    /// The request instance this operation belongs to.
    pub request: RequestDescriptor,
    /// The write tree.
    pub root: NormalizationSelector,
    /// The read tree for the operation's own data.
    pub fragment: ReaderSelector,
}

impl OperationDescriptor {
    /// Build an operation rooted at the synthetic root record.
    pub fn new(
        request_id: impl Into<String>,
        variables: Variables,
        normalization: Vec<NormalizationSelection>,
        reader: Vec<ReaderSelection>,
    ) -> Self {
        let request = RequestDescriptor::new(request_id, variables.clone());
        OperationDescriptor {
            root: NormalizationSelector::new(DataId::root(), variables.clone(), normalization),
            fragment: ReaderSelector::new(DataId::root(), variables, reader, request.clone()),
            request,
        }
    }
}

/// An opaque handle to a fragment's data, produced when the reader meets a
/// fragment spread.
///
/// Fragments are read lazily by their own consumer; the parent read takes
/// no dependency on the fragment's fields.
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentPointer {
    /// The record the fragment is anchored at.
    pub data_id: DataId,
    /// The variables the fragment must be read with.
    pub variables: Variables,
    /// The request responsible for the fragment's data.
    pub owner: RequestDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn argument_resolution() {
        let vars = variables! { "id" => "001" };

        let literal = Argument::literal("first", json!(10));
        assert_eq!(literal.resolve(&vars), json!(10));

        let var = Argument::variable("id", "id");
        assert_eq!(var.resolve(&vars), json!("001"));

        let unknown = Argument::variable("id", "missing");
        assert_eq!(unknown.resolve(&vars), json!(null));
    }

    #[test]
    fn storage_key_matches_between_literal_and_variable() {
        let vars = variables! { "id" => "001" };

        let by_literal = storage_key(
            "pokemon",
            &[Argument::literal("id", json!("001"))],
            &Variables::new(),
        );
        let by_variable = storage_key("pokemon", &[Argument::variable("id", "id")], &vars);
        assert_eq!(by_literal, by_variable);
        assert_eq!(by_literal.as_str(), r#"pokemon(id:"001")"#);
    }

    #[test]
    fn response_key_prefers_alias() {
        let plain = ScalarField::new("name");
        assert_eq!(plain.response_key(), "name");

        let aliased = ScalarField::new("name").alias("displayName");
        assert_eq!(aliased.response_key(), "displayName");
    }

    #[test]
    fn condition_evaluation() {
        let vars = variables! { "withDetails" => true };

        assert!(condition_passes(true, "withDetails", &vars));
        assert!(!condition_passes(false, "withDetails", &vars));
        // Missing variables count as false.
        assert!(!condition_passes(true, "missing", &vars));
        assert!(condition_passes(false, "missing", &vars));
    }

    #[test]
    fn operation_descriptor_roots_at_client_root() {
        let op = OperationDescriptor::new(
            "PokemonQuery",
            Variables::new(),
            vec![NormalizationSelection::Scalar(ScalarField::new("name"))],
            vec![ReaderSelection::Scalar(ScalarField::new("name"))],
        );
        assert!(op.root.data_id.is_root());
        assert!(op.fragment.data_id.is_root());
        assert_eq!(op.fragment.owner.request_id, "PokemonQuery");
    }

    #[test]
    fn variables_macro_builds_map() {
        let vars = variables! { "a" => 1, "b" => "two" };
        assert_eq!(vars.get("a"), Some(&json!(1)));
        assert_eq!(vars.get("b"), Some(&json!("two")));
        assert_eq!(vars.get("c"), None);
    }
}
