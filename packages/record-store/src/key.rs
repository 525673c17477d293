//! Identity and field addressing: `DataId` and `StorageKey`.

use std::fmt;

/// The identity of the single synthetic root record.
pub const ROOT_ID: &str = "client:root";

/// Typename carried by the synthetic root record.
pub const ROOT_TYPE: &str = "__Root";

/// Typename used when a payload object carries no identity or type hint.
pub const UNKNOWN_TYPE: &str = "__Unknown";

/// An opaque identity naming one record in a [`RecordSource`](crate::RecordSource).
///
/// Ids are either assigned by the server payload (a global object id), or
/// synthesized deterministically for objects that carry no identity of their
/// own (client-only records, nested one-off objects). Synthetic ids derive
/// from the parent id plus the storage key that linked to the child, so
/// re-normalizing the same payload always lands on the same record.
///
/// # Example
///
/// ```rust
/// use graphcache_record_store::{DataId, StorageKey};
///
/// let root = DataId::root();
/// let key = StorageKey::plain("viewer");
/// let child = DataId::client_generated(&root, &key);
/// assert_eq!(child.as_str(), "client:root:viewer");
/// ```
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct DataId(String);

impl DataId {
    /// The id of the synthetic root record.
    pub fn root() -> Self {
        DataId(ROOT_ID.to_string())
    }

    /// True if this is the synthetic root id.
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    /// Deterministic synthetic id for an object with no identity of its own.
    ///
    /// Derived from the parent record's id and the storage key under which
    /// the child is linked.
    pub fn client_generated(parent: &DataId, key: &StorageKey) -> Self {
        DataId(format!("{}:{}", parent.0, key.as_str()))
    }

    /// Synthetic id for one element of a plural linked field.
    ///
    /// List elements need the index folded in so siblings do not collide.
    pub fn client_generated_indexed(parent: &DataId, key: &StorageKey, index: usize) -> Self {
        DataId(format!("{}:{}:{}", parent.0, key.as_str(), index))
    }

    /// View the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DataId {
    fn from(s: &str) -> Self {
        DataId(s.to_string())
    }
}

impl From<String> for DataId {
    fn from(s: String) -> Self {
        DataId(s)
    }
}

/// A field's storage address within one record.
///
/// Encodes the field name plus a canonical serialization of its arguments,
/// so two invocations of the same field with different argument values get
/// distinct slots. Both the normalizer and the reader must derive keys with
/// this type's constructors - it is the single canonicalization point.
///
/// # Example
///
/// ```rust
/// use graphcache_record_store::StorageKey;
/// use serde_json::json;
///
/// assert_eq!(StorageKey::plain("name").as_str(), "name");
///
/// let key = StorageKey::with_args("pokemon", &[("id".to_string(), json!("001"))]);
/// assert_eq!(key.as_str(), r#"pokemon(id:"001")"#);
/// ```
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct StorageKey(String);

impl StorageKey {
    /// Storage key for an argument-less field.
    pub fn plain(name: &str) -> Self {
        StorageKey(name.to_string())
    }

    /// Storage key for a field with arguments.
    ///
    /// Arguments are sorted by name and serialized as compact JSON, so the
    /// same argument values always canonicalize to the same key regardless
    /// of the order the compiler emitted them in.
    pub fn with_args(name: &str, args: &[(String, serde_json::Value)]) -> Self {
        if args.is_empty() {
            return StorageKey::plain(name);
        }
        let mut sorted: Vec<&(String, serde_json::Value)> = args.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = String::from(name);
        out.push('(');
        for (i, (arg_name, arg_value)) in sorted.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(arg_name);
            out.push(':');
            // Compact serialization of a Value cannot fail.
            out.push_str(&serde_json::to_string(arg_value).unwrap_or_else(|_| "null".to_string()));
        }
        out.push(')');
        StorageKey(out)
    }

    /// Synthetic storage key a field handle's output is recorded under.
    ///
    /// Handle writes are additive: the plain linked-field write still happens
    /// under the field's own key, and the handle copy lives here.
    pub fn handle(handle_name: &str, key: &str) -> Self {
        StorageKey(format!("__{}_{}", key, handle_name))
    }

    /// View the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StorageKey {
    fn from(s: &str) -> Self {
        StorageKey(s.to_string())
    }
}
