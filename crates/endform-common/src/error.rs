use thiserror::Error;

/// HMI error types covering connectivity, tag I/O, and input validation.
///
/// Read and write failures carry the protocol client's message verbatim so
/// that callers can surface exactly what the controller reported.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HmiError {
    /// An operation was attempted while the gateway is not connected.
    #[error("PLC not connected")]
    NotConnected,

    /// The protocol client failed to read a tag.
    #[error("{message}")]
    Read {
        /// Tag that was being read.
        tag: String,
        /// Message reported by the protocol client.
        message: String,
    },

    /// The protocol client failed to write a tag.
    #[error("{message}")]
    Write {
        /// Tag that was being written.
        tag: String,
        /// Message reported by the protocol client.
        message: String,
    },

    /// Malformed input (net id, program name, missing fields).
    #[error("validation error: {0}")]
    Validation(String),

    /// Indexed I/O lookup miss.
    #[error("unknown I/O index {0}")]
    UnknownIndex(u32),

    /// The controller could not be reached or refused the session.
    #[error("{0}")]
    Connect(String),

    /// Configuration or startup error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A stored document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Local persistence failure (recipe files).
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl HmiError {
    /// Tag associated with a read or write failure, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Read { tag, .. } | Self::Write { tag, .. } => Some(tag),
            _ => None,
        }
    }
}

/// Convenience type alias for HMI operations.
pub type HmiResult<T> = Result<T, HmiError>;
