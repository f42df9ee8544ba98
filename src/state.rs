//! Call lifecycle state machine, server side.
//!
//! A call starts `Running` on invocation receipt, may bounce through the
//! awaiting states once per sub-exchange, and ends in exactly one terminal
//! state. No transition leaves a terminal state; attempting one is a
//! programming error surfaced as `InvalidTransition` rather than silently
//! tolerated.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// The tool body is executing (or scheduled to).
    Running,
    /// Suspended at an elicitation sub-exchange, waiting on the caller.
    AwaitingElicitation,
    /// Suspended at a sampling sub-exchange, waiting on the caller.
    AwaitingSampling,
    /// Terminal: the tool body returned a value.
    Succeeded,
    /// Terminal: the tool body returned an error.
    Failed,
    /// Terminal: a cancellation was honored.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid call state transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: CallState,
    pub to: CallState,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallState::Succeeded | CallState::Failed | CallState::Cancelled
        )
    }

    pub fn is_awaiting(self) -> bool {
        matches!(
            self,
            CallState::AwaitingElicitation | CallState::AwaitingSampling
        )
    }

    fn allows(self, to: CallState) -> bool {
        match self {
            CallState::Running => to != CallState::Running,
            // Sub-exchanges resolve back to Running, or die with the call.
            CallState::AwaitingElicitation | CallState::AwaitingSampling => {
                matches!(to, CallState::Running | CallState::Cancelled)
            }
            CallState::Succeeded | CallState::Failed | CallState::Cancelled => false,
        }
    }

    /// Advance to `to`, or report the violation.
    pub fn advance(&mut self, to: CallState) -> Result<(), InvalidTransition> {
        if self.allows(to) {
            *self = to;
            Ok(())
        } else {
            Err(InvalidTransition { from: *self, to })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CallState::*;

    #[test]
    fn test_full_interactive_lifecycle() {
        let mut state = Running;
        state.advance(AwaitingElicitation).unwrap();
        state.advance(Running).unwrap();
        state.advance(AwaitingSampling).unwrap();
        state.advance(Running).unwrap();
        state.advance(Succeeded).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_sinks() {
        for terminal in [Succeeded, Failed, Cancelled] {
            for to in [
                Running,
                AwaitingElicitation,
                AwaitingSampling,
                Succeeded,
                Failed,
                Cancelled,
            ] {
                let mut state = terminal;
                let err = state.advance(to).unwrap_err();
                assert_eq!(err.from, terminal);
                assert_eq!(state, terminal, "terminal state must not move");
            }
        }
    }

    #[test]
    fn test_cancel_from_any_live_state() {
        for from in [Running, AwaitingElicitation, AwaitingSampling] {
            let mut state = from;
            state.advance(Cancelled).unwrap();
            assert_eq!(state, Cancelled);
        }
    }

    #[test]
    fn test_awaiting_cannot_fail_directly() {
        // A failing sub-exchange resolves to Running first; the tool body
        // then fails from there.
        let mut state = AwaitingElicitation;
        assert!(state.advance(Failed).is_err());
        state.advance(Running).unwrap();
        state.advance(Failed).unwrap();
    }

    #[test]
    fn test_awaiting_states_are_mutually_exclusive() {
        let mut state = AwaitingElicitation;
        assert!(state.advance(AwaitingSampling).is_err());
    }
}
