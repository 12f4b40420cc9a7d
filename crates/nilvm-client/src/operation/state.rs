//! Per-invocation operation lifecycle

use nilvm_core::Result;
use std::fmt;

/// Stage an operation invocation is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationState {
    /// Built and validated, nothing sent yet
    Configured,
    /// Obtaining a payment receipt from the leader
    Paying,
    /// Node requests in flight
    Requesting,
    /// Reducing node replies to one result
    Collapsing,
    /// Finished with a result
    Succeeded,
    /// Finished with an error
    Failed,
}

impl OperationState {
    /// Whether the state is final
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed)
    }

    /// Whether moving to `next` goes forward
    ///
    /// Stages may be skipped (unpriced operations never pay) but never
    /// revisited, and nothing leaves a terminal state.
    pub fn can_advance_to(self, next: OperationState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            OperationState::Failed => true,
            OperationState::Succeeded => self == OperationState::Collapsing,
            _ => next > self,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationState::Configured => "configured",
            OperationState::Paying => "paying",
            OperationState::Requesting => "requesting",
            OperationState::Collapsing => "collapsing",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks and logs the state of one invocation
#[derive(Debug)]
pub struct Lifecycle {
    operation: &'static str,
    state: OperationState,
}

impl Lifecycle {
    /// Begin an invocation of `operation`
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            state: OperationState::Configured,
        }
    }

    /// Current state
    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Move to `next`; backwards moves are ignored
    pub fn advance(&mut self, next: OperationState) {
        if !self.state.can_advance_to(next) {
            tracing::warn!(
                operation = self.operation,
                from = %self.state,
                to = %next,
                "Ignoring backwards state change"
            );
            return;
        }
        tracing::debug!(
            operation = self.operation,
            from = %self.state,
            to = %next,
            "Operation state changed"
        );
        self.state = next;
    }

    /// Record the outcome of the invocation and pass it through
    pub fn finish<T>(&mut self, outcome: Result<T>) -> Result<T> {
        match &outcome {
            Ok(_) => {
                if self.state != OperationState::Collapsing {
                    self.advance(OperationState::Collapsing);
                }
                self.advance(OperationState::Succeeded);
            }
            Err(err) => {
                tracing::debug!(operation = self.operation, state = %self.state, error = %err, "Operation aborted");
                self.advance(OperationState::Failed);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nilvm_core::NilError;

    #[test]
    fn states_only_move_forward() {
        use OperationState::*;
        assert!(Configured.can_advance_to(Paying));
        assert!(Configured.can_advance_to(Requesting));
        assert!(Requesting.can_advance_to(Collapsing));
        assert!(Paying.can_advance_to(Failed));
        assert!(!Requesting.can_advance_to(Paying));
        assert!(!Paying.can_advance_to(Succeeded));
        assert!(!Succeeded.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Requesting));
    }

    #[test]
    fn lifecycle_ends_in_terminal_state() {
        let mut ok = Lifecycle::new("test");
        ok.advance(OperationState::Paying);
        ok.advance(OperationState::Requesting);
        assert_eq!(ok.finish(Ok(1)).unwrap(), 1);
        assert_eq!(ok.state(), OperationState::Succeeded);

        let mut failed = Lifecycle::new("test");
        failed.advance(OperationState::Paying);
        assert!(failed.finish::<()>(Err(NilError::EmptyResult)).is_err());
        assert_eq!(failed.state(), OperationState::Failed);
    }

    #[test]
    fn success_after_collapsing_is_accepted() {
        let mut lifecycle = Lifecycle::new("test");
        lifecycle.advance(OperationState::Requesting);
        lifecycle.advance(OperationState::Collapsing);
        assert!(lifecycle.finish(Ok(())).is_ok());
        assert_eq!(lifecycle.state(), OperationState::Succeeded);
    }

    #[test]
    fn backwards_moves_are_ignored() {
        let mut lifecycle = Lifecycle::new("test");
        lifecycle.advance(OperationState::Collapsing);
        lifecycle.advance(OperationState::Paying);
        assert_eq!(lifecycle.state(), OperationState::Collapsing);
    }
}
