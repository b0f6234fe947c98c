//! Per-request processing state.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{SamlError, SamlResult};

/// Where a request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingState {
    /// The message arrived.
    Received,
    /// The request passed validation.
    Validated,
    /// An existing session answers the request.
    ReuseGranted,
    /// Suspended until the external authenticator returns.
    AwaitingExternalAuth,
    /// The subject is authenticated.
    Authenticated,
    /// Attributes to release are decided.
    AttributesResolved,
    /// The response is built and signed.
    ResponseReady,
    /// The response was handed to the binding.
    Sent,
    /// Processing ended in an error.
    Error,
}

impl ProcessingState {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::Validated => "VALIDATED",
            Self::ReuseGranted => "REUSE_GRANTED",
            Self::AwaitingExternalAuth => "AWAITING_EXTERNAL_AUTH",
            Self::Authenticated => "AUTHENTICATED",
            Self::AttributesResolved => "ATTRIBUTES_RESOLVED",
            Self::ResponseReady => "RESPONSE_READY",
            Self::Sent => "SENT",
            Self::Error => "ERROR",
        }
    }

    /// Returns true for states without successors.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Error)
    }

    /// Returns true if `next` may follow this state.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        use ProcessingState::*;
        match (self, next) {
            (Sent | Error, _) => false,
            (_, Error) => true,
            (Received, Validated)
            | (Validated, ReuseGranted | AwaitingExternalAuth)
            | (ReuseGranted | AwaitingExternalAuth, Authenticated)
            | (Authenticated, AttributesResolved)
            | (AttributesResolved, ResponseReady)
            | (ResponseReady, Sent) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the state of one request.
#[derive(Debug, Clone)]
pub struct StateTracker {
    request_id: String,
    state: ProcessingState,
}

impl StateTracker {
    /// Starts tracking a newly received request.
    #[must_use]
    pub fn received(request_id: impl Into<String>) -> Self {
        Self::at(request_id, ProcessingState::Received)
    }

    /// Continues tracking a request resumed after external authentication.
    #[must_use]
    pub fn resumed(request_id: impl Into<String>) -> Self {
        Self::at(request_id, ProcessingState::AwaitingExternalAuth)
    }

    fn at(request_id: impl Into<String>, state: ProcessingState) -> Self {
        Self {
            request_id: request_id.into(),
            state,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> ProcessingState {
        self.state
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InternalBuildFailure`] for a transition the
    /// pipeline does not allow.
    pub fn advance(&mut self, next: ProcessingState) -> SamlResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(SamlError::InternalBuildFailure(format!(
                "illegal state transition {} -> {next}",
                self.state
            )));
        }
        trace!(request_id = %self.request_id, from = %self.state, to = %next, "State transition");
        self.state = next;
        Ok(())
    }

    /// Moves to [`ProcessingState::Error`] unless already terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            trace!(request_id = %self.request_id, from = %self.state, "State transition to ERROR");
            self.state = ProcessingState::Error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProcessingState::*;

    #[test]
    fn happy_paths_are_allowed() {
        for path in [
            &[Received, Validated, AwaitingExternalAuth, Authenticated, AttributesResolved, ResponseReady, Sent][..],
            &[Received, Validated, ReuseGranted, Authenticated, AttributesResolved, ResponseReady, Sent][..],
        ] {
            let mut tracker = StateTracker::received("_r");
            for state in &path[1..] {
                tracker.advance(*state).unwrap();
            }
            assert_eq!(tracker.state(), Sent);
        }
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mut tracker = StateTracker::received("_r");
        assert!(tracker.advance(Authenticated).is_err());
        assert!(tracker.advance(Sent).is_err());
        assert_eq!(tracker.state(), Received);
    }

    #[test]
    fn error_reachable_from_every_non_terminal_state() {
        for state in [Received, Validated, ReuseGranted, AwaitingExternalAuth, Authenticated, AttributesResolved, ResponseReady] {
            assert!(state.can_transition_to(Error), "{state}");
        }
        assert!(!Sent.can_transition_to(Error));
        assert!(!Error.can_transition_to(Received));

        let mut tracker = StateTracker::resumed("_r");
        tracker.fail();
        assert_eq!(tracker.state(), Error);
        tracker.fail();
        assert_eq!(tracker.state(), Error);
    }
}
