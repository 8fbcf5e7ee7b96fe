//! Producer states

/// State an executor (or an upstream producer already resolved) reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorState {
    /// More rows may follow for the current sub-execution
    HasMore,
    /// Finished for the current sub-execution
    Done,
}

impl ExecutorState {
    pub fn is_done(self) -> bool {
        matches!(self, ExecutorState::Done)
    }
}

/// State a pipeline block reports to its consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    /// More rows may follow
    HasMore,
    /// Exhausted
    Done,
    /// The data source has not resolved yet; re-invoke with the same call
    Waiting,
}

impl ExecutionState {
    pub fn is_done(self) -> bool {
        matches!(self, ExecutionState::Done)
    }

    pub fn is_waiting(self) -> bool {
        matches!(self, ExecutionState::Waiting)
    }
}

impl From<ExecutorState> for ExecutionState {
    fn from(state: ExecutorState) -> Self {
        match state {
            ExecutorState::HasMore => ExecutionState::HasMore,
            ExecutorState::Done => ExecutionState::Done,
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionState::HasMore => "HASMORE",
            ExecutionState::Done => "DONE",
            ExecutionState::Waiting => "WAITING",
        };
        f.write_str(s)
    }
}

/// Where a block's executor stands across pulls
///
/// `AwaitingInput -> Producing | Skipping -> OutputFull | UpstreamExhausted
/// -> AwaitingShadow -> AwaitingInput`. Only subquery-boundary executors
/// park in `AwaitingShadow` with a pending marker of their own; the others
/// pass through it while forwarding input shadow rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorPhase {
    AwaitingInput,
    Producing,
    Skipping,
    OutputFull,
    UpstreamExhausted,
    AwaitingShadow,
}

impl ExecutorPhase {
    /// Short name for spans and logs
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutorPhase::AwaitingInput => "awaiting_input",
            ExecutorPhase::Producing => "producing",
            ExecutorPhase::Skipping => "skipping",
            ExecutorPhase::OutputFull => "output_full",
            ExecutorPhase::UpstreamExhausted => "upstream_exhausted",
            ExecutorPhase::AwaitingShadow => "awaiting_shadow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_state_converts() {
        assert_eq!(ExecutionState::from(ExecutorState::Done), ExecutionState::Done);
        assert_eq!(
            ExecutionState::from(ExecutorState::HasMore),
            ExecutionState::HasMore
        );
        assert_eq!(ExecutionState::Waiting.to_string(), "WAITING");
    }
}
