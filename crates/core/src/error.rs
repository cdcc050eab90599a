//! Error types for esorm
//!
//! A single error enum is shared by every crate in the workspace. Variants
//! fall into four groups:
//!
//! - **Caller errors**: bad arguments (unknown field, missing `uid`, deleting
//!   a uid that was never stored). Never retried.
//! - **Consistency faults**: the store holds state the versioning protocol
//!   never produces (two version records with the same uid and version).
//! - **Store errors**: transport failures and non-success responses, passed
//!   through verbatim.
//! - **Protocol outcomes**: lost conditional writes, incomplete delete
//!   cascades, read-after-write visibility timeouts.
//!
//! We use `thiserror` for `Display` and `Error` implementations.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for esorm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for esorm
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Caller errors
    // ========================================================================
    /// Field name not declared by the entity's schema
    #[error("Argument \"{field}\" not defined in {class_name}")]
    UnknownField {
        /// Offending field name
        field: String,
        /// Schema class name
        class_name: String,
    },

    /// Document has no `data.uid`
    #[error("document has no data.uid")]
    MissingUid,

    /// Malformed argument (bad predicate, bad schema definition)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Value does not have the type a field codec expects
    #[error("Expected {expected} for field \"{field}\", found {found}")]
    InvalidType {
        /// Field name
        field: String,
        /// Expected kind
        expected: String,
        /// Kind actually supplied
        found: String,
    },

    /// Value is outside a field's allowed set
    #[error("Value {value} not in allowed values of field \"{field}\"")]
    ValueNotAllowed {
        /// Field name
        field: String,
        /// Rendered rejected value
        value: String,
    },

    /// No document with this uid in the primary collection
    #[error("No document found with uid: {0}")]
    DocumentNotFound(String),

    // ========================================================================
    // Consistency faults
    // ========================================================================
    /// More than one version record shares a (uid, version) pair
    #[error("{count} version records found for uid {uid} at version {version}, expected at most 1")]
    DuplicateVersion {
        /// Entity uid
        uid: String,
        /// Version number
        version: u64,
        /// Number of records found
        count: usize,
    },

    // ========================================================================
    // Protocol outcomes
    // ========================================================================
    /// Conditional write rejected because the target changed or already exists
    #[error("Write conflict on {collection}/{id}")]
    Conflict {
        /// Collection name
        collection: String,
        /// Document identifier
        id: String,
    },

    /// Primary tombstone committed, version cascade failed part way
    #[error("Entity {uid} was marked deleted but its version history was not fully tombstoned: {source}")]
    CascadeIncomplete {
        /// Entity uid
        uid: String,
        /// Error raised by the cascade stage
        #[source]
        source: Box<Error>,
    },

    /// Written document did not become searchable before the deadline
    #[error("{collection}/{id} not visible after {waited:?}")]
    NotVisible {
        /// Collection name
        collection: String,
        /// Document identifier
        id: String,
        /// Time spent polling
        waited: Duration,
    },

    // ========================================================================
    // Store errors
    // ========================================================================
    /// Network-level failure talking to the store
    #[error("Transport error: {0}")]
    Transport(String),

    /// Store answered with a non-success status
    #[error("Store returned {status}: {body}")]
    Store {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// A search matched more hits than one response may carry
    #[error("{collection}: search matched {total} hits, only {returned} returned; raise search_size")]
    ResultWindowExceeded {
        /// Collection name
        collection: String,
        /// Hits the store counted
        total: u64,
        /// Hits the response carried
        returned: usize,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build an `InvalidArgument` error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Whether this is a lost conditional write
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Whether the caller supplied bad input
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownField { .. }
                | Error::MissingUid
                | Error::InvalidArgument(_)
                | Error::InvalidType { .. }
                | Error::ValueNotAllowed { .. }
                | Error::DocumentNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unknown_field() {
        let err = Error::UnknownField {
            field: "nickname".to_string(),
            class_name: "Person".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Argument \"nickname\" not defined in Person"
        );
    }

    #[test]
    fn test_error_display_duplicate_version() {
        let err = Error::DuplicateVersion {
            uid: "p1".to_string(),
            version: 2,
            count: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("p1"));
        assert!(msg.contains("version 2"));
        assert!(msg.contains("3 version records"));
    }

    #[test]
    fn test_cascade_incomplete_exposes_source() {
        let err = Error::CascadeIncomplete {
            uid: "p1".to_string(),
            source: Box::new(Error::Transport("connection reset".to_string())),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("connection reset"));
    }

    #[test]
    fn test_result_window_names_the_gap() {
        let err = Error::ResultWindowExceeded {
            collection: "version".to_string(),
            total: 10_001,
            returned: 10_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("10001 hits"));
        assert!(msg.contains("search_size"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::MissingUid.is_caller_error());
        assert!(Error::DocumentNotFound("x".into()).is_caller_error());
        assert!(!Error::Transport("down".into()).is_caller_error());

        let conflict = Error::Conflict {
            collection: "orm".into(),
            id: "p1".into(),
        };
        assert!(conflict.is_conflict());
        assert!(!conflict.is_caller_error());
    }
}
