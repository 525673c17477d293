//! Error types for the record layer.

use crate::DataId;

/// Contract violations at the record layer.
///
/// These indicate an integration or codegen bug, not a runtime condition:
/// the mutator never silently creates records and record identity is
/// write-once. Data absence is not an error at this layer - it is reported
/// in-band through [`RecordStatus`](crate::RecordStatus).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A record with this id already exists in base or sink.
    #[error("record '{0}' already exists")]
    DuplicateRecord(DataId),

    /// A field write targeted an id with no record in base or sink.
    #[error("cannot modify non-existent record '{0}'")]
    MissingRecord(DataId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = RecordError::DuplicateRecord(DataId::from("P1"));
        assert!(e.to_string().contains("P1"));
        assert!(e.to_string().contains("already exists"));

        let e = RecordError::MissingRecord(DataId::from("ghost"));
        assert!(e.to_string().contains("non-existent"));
    }
}
