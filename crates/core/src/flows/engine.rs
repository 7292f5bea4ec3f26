use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{TransitionOutcome, TurnAction, TurnContext, TurnEvent, TurnState};

/// Turn graph. `Done` is the only terminal state and accepts no events.
#[derive(Clone, Debug, Default)]
pub struct TurnFlowEngine;

impl TurnFlowEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn initial_state(&self) -> TurnState {
        TurnState::Agent
    }

    pub fn apply(
        &self,
        current: &TurnState,
        event: &TurnEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_turn(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &TurnState,
        event: &TurnEvent,
        context: &TurnContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("turn already finished, cannot apply {event:?}")]
    TurnFinished { event: TurnEvent },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: TurnState, event: TurnEvent },
}

fn transition_turn(
    current: &TurnState,
    event: &TurnEvent,
    context: &TurnContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use TurnAction::{
        EvaluateCompliance, ExecuteTools, InvokeAgent, ReleaseFallback, ReleasePending,
        RewriteDraft,
    };
    use TurnEvent::{
        AgentFailed, ComplianceVerified, ComplianceViolated, DraftProduced, RegenerationFinished,
        ToolCallsRequested, ToolResultsAppended, ToolRoundLimitReached,
    };
    use TurnState::{Agent, ComplianceCheck, Done, Regenerate, ToolExecution};

    let (to, actions) = match (current, event) {
        (Done, _) => return Err(FlowTransitionError::TurnFinished { event: event.clone() }),
        (Agent, ToolCallsRequested) => (ToolExecution, vec![ExecuteTools]),
        (ToolExecution, ToolResultsAppended) => (Agent, vec![InvokeAgent]),
        (Agent, DraftProduced) if context.needs_compliance => {
            (ComplianceCheck, vec![EvaluateCompliance])
        }
        (Agent, DraftProduced) => (Done, vec![ReleasePending]),
        (ComplianceCheck, ComplianceVerified) => (Done, vec![ReleasePending]),
        (ComplianceCheck, ComplianceViolated) => (Regenerate, vec![RewriteDraft]),
        (Regenerate, RegenerationFinished) => (Done, vec![ReleasePending]),
        (Agent, AgentFailed) | (Agent, ToolRoundLimitReached) => (Done, vec![ReleaseFallback]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::flows::engine::{FlowTransitionError, TurnFlowEngine};
    use crate::flows::states::{TurnAction, TurnContext, TurnEvent, TurnState};

    fn sensitive() -> TurnContext {
        TurnContext { needs_compliance: true }
    }

    #[test]
    fn plain_draft_is_released_without_compliance() {
        let engine = TurnFlowEngine::new();
        let outcome = engine
            .apply(&engine.initial_state(), &TurnEvent::DraftProduced, &TurnContext::default())
            .expect("agent -> done");

        assert_eq!(outcome.to, TurnState::Done);
        assert_eq!(outcome.actions, vec![TurnAction::ReleasePending]);
    }

    #[test]
    fn tool_round_then_compliance_then_regeneration() {
        let engine = TurnFlowEngine::new();
        let mut state = engine.initial_state();
        let events = [
            (TurnEvent::ToolCallsRequested, TurnContext::default(), TurnState::ToolExecution),
            (TurnEvent::ToolResultsAppended, sensitive(), TurnState::Agent),
            (TurnEvent::DraftProduced, sensitive(), TurnState::ComplianceCheck),
            (TurnEvent::ComplianceViolated, sensitive(), TurnState::Regenerate),
            (TurnEvent::RegenerationFinished, TurnContext::default(), TurnState::Done),
        ];

        for (event, context, expected) in events {
            state = engine.apply(&state, &event, &context).expect("valid transition").to;
            assert_eq!(state, expected);
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn compliant_draft_is_released() {
        let engine = TurnFlowEngine::new();
        let outcome = engine
            .apply(&TurnState::ComplianceCheck, &TurnEvent::ComplianceVerified, &sensitive())
            .expect("compliance -> done");
        assert_eq!(outcome.to, TurnState::Done);
    }

    #[test]
    fn agent_failures_release_fallback() {
        let engine = TurnFlowEngine::new();
        for event in [TurnEvent::AgentFailed, TurnEvent::ToolRoundLimitReached] {
            let outcome =
                engine.apply(&TurnState::Agent, &event, &sensitive()).expect("agent -> done");
            assert_eq!(outcome.to, TurnState::Done);
            assert_eq!(outcome.actions, vec![TurnAction::ReleaseFallback]);
        }
    }

    #[test]
    fn done_accepts_no_events() {
        let engine = TurnFlowEngine::new();
        let error = engine
            .apply(&TurnState::Done, &TurnEvent::DraftProduced, &TurnContext::default())
            .expect_err("done is terminal");
        assert!(matches!(error, FlowTransitionError::TurnFinished { .. }));
    }

    #[test]
    fn impossible_pair_is_rejected() {
        let engine = TurnFlowEngine::new();
        let error = engine
            .apply(&TurnState::ToolExecution, &TurnEvent::ComplianceVerified, &sensitive())
            .expect_err("tool execution cannot verify compliance");

        assert_eq!(
            error,
            FlowTransitionError::InvalidTransition {
                state: TurnState::ToolExecution,
                event: TurnEvent::ComplianceVerified,
            }
        );
    }

    #[test]
    fn transitions_emit_audit_events() {
        let engine = TurnFlowEngine::new();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(Some("thread-7".to_owned()), "req-42", "turn-engine");

        let _ = engine
            .apply_with_audit(
                &TurnState::Agent,
                &TurnEvent::ToolCallsRequested,
                &TurnContext::default(),
                &sink,
                &audit,
            )
            .expect("transition should succeed");
        let _ = engine.apply_with_audit(
            &TurnState::Done,
            &TurnEvent::AgentFailed,
            &TurnContext::default(),
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "flow.transition_applied");
        assert_eq!(events[0].thread_id.as_deref(), Some("thread-7"));
        assert_eq!(events[1].event_type, "flow.transition_rejected");
        assert_eq!(events[1].correlation_id, "req-42");
    }
}
