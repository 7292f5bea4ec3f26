use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnState {
    Agent,
    ToolExecution,
    ComplianceCheck,
    Regenerate,
    Done,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnEvent {
    ToolCallsRequested,
    ToolResultsAppended,
    DraftProduced,
    ComplianceVerified,
    ComplianceViolated,
    RegenerationFinished,
    AgentFailed,
    ToolRoundLimitReached,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TurnContext {
    pub needs_compliance: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnAction {
    ExecuteTools,
    InvokeAgent,
    EvaluateCompliance,
    RewriteDraft,
    ReleasePending,
    ReleaseFallback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: TurnState,
    pub to: TurnState,
    pub event: TurnEvent,
    pub actions: Vec<TurnAction>,
}
