//! Error types for the runtime layer.

use graphcache_record_store::{DataId, RecordError, StorageKey};

/// Errors at the runtime layer.
///
/// All variants except [`Error::Deserialize`] are contract violations: a
/// payload that does not match its compiled selector, or a write that
/// breaks a graph invariant. They abort the whole normalize/publish
/// operation - no partial record graph is ever committed. Data absence is
/// never an error; it travels in-band on the snapshot.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Contract violation at the record layer.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The payload's shape does not match the selection tree.
    #[error("payload shape mismatch at record '{data_id}' field '{key}': {message}")]
    PayloadShape {
        /// The record being normalized when the mismatch was found.
        data_id: DataId,
        /// The response key that held the unexpected shape.
        key: String,
        /// What was expected versus found.
        message: String,
    },

    /// A published linked reference points at an id the combined source has
    /// never observed.
    #[error("record '{from}' field '{key}' references unknown record '{to}'")]
    DanglingReference {
        /// The record holding the reference.
        from: DataId,
        /// The storage key the reference was written under.
        key: StorageKey,
        /// The referenced id with no record behind it.
        to: DataId,
    },

    /// Typed snapshot extraction failed to deserialize.
    #[error("snapshot deserialization failed: {0}")]
    Deserialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_error_names_the_field() {
        let e = Error::PayloadShape {
            data_id: DataId::from("P1"),
            key: "name".to_string(),
            message: "expected scalar, found object".to_string(),
        };
        let display = e.to_string();
        assert!(display.contains("P1"));
        assert!(display.contains("name"));
        assert!(display.contains("expected scalar"));
    }

    #[test]
    fn record_error_converts() {
        let e: Error = RecordError::MissingRecord(DataId::from("x")).into();
        assert!(matches!(e, Error::Record(_)));
    }

    #[test]
    fn dangling_reference_display() {
        let e = Error::DanglingReference {
            from: DataId::from("client:root"),
            key: StorageKey::plain("pokemon"),
            to: DataId::from("P9"),
        };
        assert!(e.to_string().contains("P9"));
        assert!(e.to_string().contains("pokemon"));
    }
}
