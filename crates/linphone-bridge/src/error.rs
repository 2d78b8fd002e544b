//! Error types for the bridge
//!
//! Null handles and empty collections are not errors. Allocation failure is
//! not recoverable. What remains are the inputs that cannot cross the C
//! boundary at all.

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// A host string contains a NUL byte and has no C representation
    #[error("String at index {index} contains an interior NUL byte")]
    InteriorNul {
        /// Position of the offending string in the input sequence
        index: usize,
    },

    /// A configuration value was rejected
    #[error("Invalid option {name}: {reason}")]
    InvalidOption {
        /// Option (or environment variable) name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },
}
