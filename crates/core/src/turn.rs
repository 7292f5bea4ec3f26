//! Per-turn conversation state.
//!
//! A `Conversation` is created from persisted history at turn start, mutated
//! by the graph nodes in sequence and consumed at turn end into the released
//! [`TurnOutcome`] and the [`TurnRecord`] handed to the thread store.

use serde::{Deserialize, Serialize};

use crate::domain::claims::ClaimsValidationResult;
use crate::domain::intent::IntentClassification;
use crate::domain::message::{Message, Role};
use crate::domain::thread::ThreadId;
use crate::history::History;
use crate::store::{TurnAudit, TurnRecord};

/// Result of the compliance gate for one pending draft.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplianceResolution {
    pub final_text: String,
    pub validation: ClaimsValidationResult,
    pub original_response: Option<String>,
    pub attempts: u32,
    pub exhausted: bool,
}

impl ComplianceResolution {
    pub fn released(text: impl Into<String>, validation: ClaimsValidationResult) -> Self {
        Self {
            final_text: text.into(),
            validation,
            original_response: None,
            attempts: 0,
            exhausted: false,
        }
    }
}

/// What the caller receives for one processed user message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub thread_id: ThreadId,
    pub message: Message,
    pub intent: IntentClassification,
    pub routing_reason: String,
    pub claims_validation: Option<ClaimsValidationResult>,
    pub original_response: Option<String>,
    pub regeneration_attempts: u32,
    pub compliance_exhausted: bool,
    pub used_fallback: bool,
}

#[derive(Clone, Debug)]
pub struct Conversation {
    thread_id: ThreadId,
    history: History,
    turn_messages: Vec<Message>,
    pending_response: Option<Message>,
    intent: Option<IntentClassification>,
    routing_reason: Option<String>,
    needs_compliance: bool,
    resolution: Option<ComplianceResolution>,
    tool_rounds: u32,
}

impl Conversation {
    pub fn start(thread_id: ThreadId, history: History, user_message: Message) -> Self {
        let mut conversation = Self {
            thread_id,
            history,
            turn_messages: Vec::new(),
            pending_response: None,
            intent: None,
            routing_reason: None,
            needs_compliance: false,
            resolution: None,
            tool_rounds: 0,
        };
        conversation.append(user_message);
        conversation
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn messages(&self) -> &[Message] {
        self.history.messages()
    }

    /// Latest user utterance in the retained history.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.history
            .messages()
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
    }

    /// Appends through the history reducer and records the message for
    /// persistence when it was kept.
    pub fn append(&mut self, message: Message) -> bool {
        let kept = self.history.append(message.clone());
        if kept {
            self.turn_messages.push(message);
        }
        kept
    }

    pub fn set_routing(&mut self, classification: IntentClassification) {
        self.routing_reason = Some(classification.routing_reason());
        self.intent = Some(classification);
    }

    pub fn intent(&self) -> Option<&IntentClassification> {
        self.intent.as_ref()
    }

    /// Replaces any previous draft; at most one is ever pending.
    pub fn set_pending(&mut self, draft: Message) {
        self.pending_response = Some(draft);
    }

    pub fn pending(&self) -> Option<&Message> {
        self.pending_response.as_ref()
    }

    pub fn pending_text(&self) -> &str {
        self.pending_response.as_ref().map(|message| message.content.as_str()).unwrap_or_default()
    }

    /// Clears the pending draft and returns the number of tool rounds so far.
    pub fn enter_tool_execution(&mut self) -> u32 {
        self.pending_response = None;
        self.tool_rounds += 1;
        self.tool_rounds
    }

    pub fn tool_rounds(&self) -> u32 {
        self.tool_rounds
    }

    /// Only [`Conversation::complete_compliance`] clears the flag again.
    pub fn mark_needs_compliance(&mut self) {
        self.needs_compliance = true;
    }

    pub fn needs_compliance(&self) -> bool {
        self.needs_compliance
    }

    pub fn complete_compliance(&mut self, resolution: ComplianceResolution) {
        self.pending_response = Some(Message::assistant(resolution.final_text.clone()));
        self.needs_compliance = false;
        self.resolution = Some(resolution);
    }

    pub fn resolution(&self) -> Option<&ComplianceResolution> {
        self.resolution.as_ref()
    }

    /// Releases the pending draft, or `fallback_text` when none exists.
    pub fn finish(mut self, fallback_text: &str) -> (TurnOutcome, TurnRecord) {
        let used_fallback = self.pending_response.is_none();
        let message = self
            .pending_response
            .take()
            .unwrap_or_else(|| Message::assistant(fallback_text));
        self.append(message.clone());

        let intent = self.intent.unwrap_or_else(IntentClassification::fallback);
        let routing_reason = self.routing_reason.unwrap_or_else(|| intent.routing_reason());
        let (claims_validation, original_response, attempts, exhausted) = match self.resolution {
            Some(resolution) => (
                Some(resolution.validation),
                resolution.original_response,
                resolution.attempts,
                resolution.exhausted,
            ),
            None => (None, None, 0, false),
        };

        let record = TurnRecord {
            thread_id: self.thread_id.clone(),
            messages: self.turn_messages,
            audit: TurnAudit {
                intent: intent.clone(),
                routing_reason: routing_reason.clone(),
                claims_validation: claims_validation.clone(),
                original_response: original_response.clone(),
                regeneration_attempts: attempts,
                compliance_exhausted: exhausted,
            },
        };
        let outcome = TurnOutcome {
            thread_id: self.thread_id,
            message,
            intent,
            routing_reason,
            claims_validation,
            original_response,
            regeneration_attempts: attempts,
            compliance_exhausted: exhausted,
            used_fallback,
        };
        (outcome, record)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ComplianceResolution, Conversation};
    use crate::domain::claims::ClaimsValidationResult;
    use crate::domain::intent::{Intent, IntentClassification};
    use crate::domain::message::{Message, ToolCall};
    use crate::domain::thread::ThreadId;
    use crate::history::History;

    fn conversation() -> Conversation {
        Conversation::start(
            ThreadId::new("thread-1"),
            History::from_messages([Message::user("hoi"), Message::assistant("hallo")], 30),
            Message::user("Is dit veilig tijdens de zwangerschap?"),
        )
    }

    #[test]
    fn entering_tool_execution_clears_pending() {
        let mut conversation = conversation();
        conversation.set_pending(Message::assistant("draft"));
        assert_eq!(conversation.enter_tool_execution(), 1);
        assert!(conversation.pending().is_none());
    }

    #[test]
    fn needs_compliance_is_cleared_only_by_resolution() {
        let mut conversation = conversation();
        conversation.mark_needs_compliance();
        conversation.enter_tool_execution();
        conversation.set_pending(Message::assistant("draft"));
        assert!(conversation.needs_compliance());

        conversation.complete_compliance(ComplianceResolution::released(
            "draft",
            ClaimsValidationResult::vacuous(),
        ));
        assert!(!conversation.needs_compliance());
        assert_eq!(conversation.pending_text(), "draft");
    }

    #[test]
    fn finish_records_only_this_turns_messages() {
        let mut conversation = conversation();
        conversation.set_routing(IntentClassification {
            intent: Intent::ProductInfo,
            confidence: 0.9,
            reasoning: "asks about a product".into(),
        });
        conversation.append(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall { id: "c1".into(), name: "product_info".into(), arguments: json!({}) }],
        ));
        conversation.enter_tool_execution();
        conversation.append(Message::tool_result("c1", "product_info", "{}"));
        conversation.set_pending(Message::assistant("Dit product bevat foliumzuur."));

        let (outcome, record) = conversation.finish("fallback");
        assert!(!outcome.used_fallback);
        assert_eq!(outcome.routing_reason, "asks about a product (Confidence: 90.0%)");
        assert_eq!(record.messages.len(), 4);
        assert_eq!(record.messages.last(), Some(&outcome.message));
        assert_eq!(record.audit.intent.intent, Intent::ProductInfo);
    }

    #[test]
    fn finish_without_pending_releases_fallback() {
        let (outcome, record) = conversation().finish("Er ging iets mis.");
        assert!(outcome.used_fallback);
        assert_eq!(outcome.message, Message::assistant("Er ging iets mis."));
        assert_eq!(outcome.intent, IntentClassification::fallback());
        assert_eq!(record.audit.claims_validation, None);
    }

    #[test]
    fn latest_user_text_reads_retained_history() {
        assert_eq!(
            conversation().latest_user_text(),
            Some("Is dit veilig tijdens de zwangerschap?")
        );
    }
}
