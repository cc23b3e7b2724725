//! Gateway connection state machine.
//!
//! DISCONNECTED → CONNECTING → CONNECTED, and back to DISCONNECTED on a
//! failed attempt, a link-level I/O failure, or an explicit disconnect.

use crate::error::{HmiError, HmiResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection states for the controller session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No session. Initial state.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Session established.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
        }
    }
}

impl ConnectionState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: ConnectionState) -> bool {
        use ConnectionState::{Connected, Connecting, Disconnected};

        matches!(
            (self, target),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
        )
    }

    /// Returns true if tag operations may be attempted.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// State machine wrapper with transition history tracking.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMachine {
    current: ConnectionState,
    transition_count: u64,
    last_error: Option<String>,
}

impl ConnectionMachine {
    /// Create a new machine in DISCONNECTED.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.current
    }

    /// Total transitions performed.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Error recorded by the most recent failed connect or link loss.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Attempt a state transition.
    ///
    /// # Errors
    ///
    /// Returns [`HmiError::InvalidStateTransition`] for disallowed edges.
    pub fn transition(&mut self, target: ConnectionState) -> HmiResult<()> {
        if self.current.can_transition_to(target) {
            self.current = target;
            self.transition_count += 1;
            if target == ConnectionState::Connected {
                self.last_error = None;
            }
            Ok(())
        } else {
            Err(HmiError::InvalidStateTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            })
        }
    }

    /// Drop to DISCONNECTED from any state, recording why.
    pub fn mark_lost(&mut self, reason: impl Into<String>) {
        if self.current != ConnectionState::Disconnected {
            self.current = ConnectionState::Disconnected;
            self.transition_count += 1;
        }
        self.last_error = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_sequence() {
        let mut sm = ConnectionMachine::new();
        assert_eq!(sm.state(), ConnectionState::Disconnected);

        sm.transition(ConnectionState::Connecting).unwrap();
        sm.transition(ConnectionState::Connected).unwrap();
        assert!(sm.state().is_connected());
        assert_eq!(sm.transition_count(), 2);
    }

    #[test]
    fn test_cannot_skip_connecting() {
        let mut sm = ConnectionMachine::new();
        let result = sm.transition(ConnectionState::Connected);
        assert!(result.is_err());
        assert_eq!(sm.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_mark_lost_records_reason() {
        let mut sm = ConnectionMachine::new();
        sm.transition(ConnectionState::Connecting).unwrap();
        sm.transition(ConnectionState::Connected).unwrap();

        sm.mark_lost("connection reset");
        assert_eq!(sm.state(), ConnectionState::Disconnected);
        assert_eq!(sm.last_error(), Some("connection reset"));

        sm.transition(ConnectionState::Connecting).unwrap();
        sm.transition(ConnectionState::Connected).unwrap();
        assert_eq!(sm.last_error(), None);
    }
}
