//! Error types for the store.
//!
//! All errors are propagated via [`StoreError`], which wraps the
//! underlying I/O and serialization errors with context about which
//! durable unit was involved.

/// Errors that can occur in the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A key contains characters that cannot form a durable unit name.
    #[error("Invalid store key: {key:?}")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },

    /// A write carried a non-finite float, which has no JSON form.
    #[error("Non-finite number rejected in unit {key:?}")]
    NonFinite {
        /// The durable unit the write targeted.
        key: String,
    },

    /// A proxy path addressed a slot that does not exist.
    #[error("Path not found in unit {key:?}: {path}")]
    PathUnavailable {
        /// The durable unit the proxy is bound to.
        key: String,
        /// Dotted rendering of the failed path.
        path: String,
    },

    /// A proxy path expected one container shape and found another.
    #[error("Type mismatch in unit {key:?} at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The durable unit the proxy is bound to.
        key: String,
        /// Dotted rendering of the path to the mismatched node.
        path: String,
        /// The container shape the operation required.
        expected: &'static str,
        /// The shape actually present.
        found: &'static str,
    },

    /// A list operation addressed an index past the end.
    #[error("Index {index} out of bounds in unit {key:?} at {path} (len {len})")]
    IndexOutOfBounds {
        /// The durable unit the proxy is bound to.
        key: String,
        /// Dotted rendering of the path to the list.
        path: String,
        /// The requested index.
        index: usize,
        /// The list length at the time of the operation.
        len: usize,
    },
}
