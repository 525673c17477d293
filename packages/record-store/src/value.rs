//! Field value types - the closed set of shapes a record field can hold.

use crate::DataId;

/// A scalar leaf value.
///
/// The cache stores scalars verbatim as they arrive in the payload; it never
/// coerces between numeric kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
}

impl ScalarValue {
    /// Convert a JSON leaf into a scalar.
    ///
    /// Returns `None` for objects and arrays - those are record shapes, not
    /// scalars - and for JSON null, which is represented at the field level
    /// as [`FieldValue::Null`].
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(ScalarValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(ScalarValue::Int(i))
                } else {
                    n.as_f64().map(ScalarValue::Float)
                }
            }
            serde_json::Value::String(s) => Some(ScalarValue::String(s.clone())),
            _ => None,
        }
    }

    /// Convert back into a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ScalarValue::Bool(b) => serde_json::Value::Bool(*b),
            ScalarValue::Int(i) => serde_json::Value::from(*i),
            ScalarValue::Float(f) => serde_json::Value::from(*f),
            ScalarValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::String(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::String(v)
    }
}

/// The value stored under one storage key of a record.
///
/// This is a closed union rather than an open "any": a field is either a
/// known-null, a scalar (or list of scalars), or a reference to one or more
/// other records by identity. List ordering and per-element nulls are
/// significant and preserved.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// The server answered null for this field. Distinct from the field
    /// never having been written, which is the absence of an entry.
    Null,
    /// A scalar leaf.
    Scalar(ScalarValue),
    /// An ordered list of scalar leaves, with per-element nulls.
    ScalarList(Vec<Option<ScalarValue>>),
    /// A reference to another record.
    Link(DataId),
    /// An ordered list of references, with per-element nulls.
    LinkList(Vec<Option<DataId>>),
}

impl FieldValue {
    /// True for the known-null value.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// The linked id, if this is a singular link.
    pub fn as_link(&self) -> Option<&DataId> {
        match self {
            FieldValue::Link(id) => Some(id),
            _ => None,
        }
    }

    /// The linked ids, if this is a link list.
    pub fn as_link_list(&self) -> Option<&[Option<DataId>]> {
        match self {
            FieldValue::LinkList(ids) => Some(ids),
            _ => None,
        }
    }

    /// The scalar, if this is a singular scalar.
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

impl From<ScalarValue> for FieldValue {
    fn from(v: ScalarValue) -> Self {
        FieldValue::Scalar(v)
    }
}

impl From<DataId> for FieldValue {
    fn from(id: DataId) -> Self {
        FieldValue::Link(id)
    }
}
