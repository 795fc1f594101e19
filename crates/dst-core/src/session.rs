//! Session state machine
//!
//! `Disconnected -> Connecting -> Connected -> Busy -> Connected`, with
//! `Disconnected` reachable from every state. The busy and session-open
//! flags are published on watch channels for the presentation layer.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Controller session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Busy,
}

impl SessionState {
    /// Whether an engine session is open
    #[inline]
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Busy)
    }
}

/// Validate a state transition
///
/// # Errors
/// Returns `IllegalTransition` when `to` is not reachable from `from`
pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), SessionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SessionError::IllegalTransition { from, to })
    }
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: SessionState) -> Vec<SessionState> {
    use SessionState::{Busy, Connected, Connecting, Disconnected};
    match from {
        Disconnected => vec![Connecting, Disconnected],
        Connecting => vec![Connected, Disconnected],
        Connected => vec![Busy, Connecting, Disconnected],
        Busy => vec![Connected, Disconnected],
    }
}

/// Owns the session state and its observable flags
#[derive(Debug)]
pub struct SessionTracker {
    state: watch::Sender<SessionState>,
    busy: watch::Sender<bool>,
    open: watch::Sender<bool>,
}

impl SessionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(SessionState::Disconnected),
            busy: watch::Sender::new(false),
            open: watch::Sender::new(false),
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    #[inline]
    #[must_use]
    pub fn is_session_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Move to `to`
    ///
    /// # Errors
    /// Returns `IllegalTransition` when the move is not allowed
    pub fn transition(&self, to: SessionState) -> Result<(), SessionError> {
        let from = self.state();
        validate_transition(from, to)?;
        tracing::debug!(?from, ?to, "session transition");
        self.state.send_replace(to);
        self.open.send_replace(to.is_open());
        if to != SessionState::Busy {
            self.busy.send_replace(false);
        }
        Ok(())
    }

    /// Raise the busy flag; a connected session also enters `Busy`
    pub fn begin_busy(&self) {
        if self.state() == SessionState::Connected {
            self.state.send_replace(SessionState::Busy);
        }
        self.busy.send_replace(true);
    }

    /// Clear the busy flag; a busy session returns to `Connected`
    pub fn end_busy(&self) {
        if self.state() == SessionState::Busy {
            self.state.send_replace(SessionState::Connected);
        }
        self.busy.send_replace(false);
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    pub fn subscribe_session_open(&self) -> watch::Receiver<bool> {
        self.open.subscribe()
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}
