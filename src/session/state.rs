//! Session lifecycle states.

use crate::error::{LivescribeError, Result};
use std::fmt;

/// Lifecycle of one streaming connection.
///
/// ```text
/// Connecting -> Authenticated -> Streaming -> Finalizing -> Closed
///      |              |              |
///      +--> Rejected  +--> Rejected  +--> Closed (disconnect)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticated,
    Streaming,
    Finalizing,
    Closed,
    Rejected,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Rejected)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticated)
                | (Connecting, Rejected)
                | (Authenticated, Streaming)
                | (Authenticated, Rejected)
                | (Streaming, Finalizing)
                | (Streaming, Closed)
                | (Finalizing, Closed)
        )
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition_to(&mut self, next: SessionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(LivescribeError::Other(format!(
                "illegal session transition {self} -> {next}"
            )));
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Authenticated => "authenticated",
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
            Self::Closed => "closed",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}
