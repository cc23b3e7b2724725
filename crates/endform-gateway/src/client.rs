//! Protocol client abstraction.
//!
//! The wire protocol to the controller is owned by an external client
//! library. The gateway only needs four calls from it, captured by
//! [`TagClient`]. A [`ClientFactory`] creates a fresh client for a target
//! address so the gateway can re-point itself at runtime.

use async_trait::async_trait;
use endform_common::{TagValue, TargetConfig};
use thiserror::Error;

/// Failure reported by a protocol client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The link to the controller failed (refused, reset, timed out).
    #[error("{0}")]
    Transport(String),

    /// The controller answered but refused the request (unknown symbol,
    /// type mismatch). The link is still usable.
    #[error("{0}")]
    Rejected(String),
}

impl ClientError {
    /// Returns true if the session should be considered lost.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Symbolic tag access to one controller.
#[async_trait]
pub trait TagClient: Send + Sync {
    /// Open the session.
    async fn connect(&self) -> Result<(), ClientError>;

    /// Read a tag and decode it.
    async fn read_value(&self, tag: &str) -> Result<TagValue, ClientError>;

    /// Write a tag.
    ///
    /// With `auto_fill`, a partial structure or array is merged over the
    /// tag's current value so members the caller omits keep their contents.
    async fn write_value(
        &self,
        tag: &str,
        value: TagValue,
        auto_fill: bool,
    ) -> Result<(), ClientError>;

    /// Close the session.
    async fn disconnect(&self) -> Result<(), ClientError>;
}

/// Creates clients for a target address.
pub trait ClientFactory: Send + Sync {
    /// Build an unconnected client for `target`.
    fn create(&self, target: &TargetConfig) -> Box<dyn TagClient>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let lost = ClientError::Transport("connection reset".into());
        let bad = ClientError::Rejected("symbol not found".into());
        assert!(lost.is_transport());
        assert!(!bad.is_transport());
        assert_eq!(bad.to_string(), "symbol not found");
    }
}
