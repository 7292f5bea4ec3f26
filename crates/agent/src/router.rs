//! Intent classification and handler dispatch.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use soof_core::domain::intent::{Intent, IntentClassification};
use soof_core::domain::message::{Message, Role};
use tracing::{info, warn};

use crate::llm::{invoke_structured, LlmClient, OutputSchema};
use crate::prompts::{render_classification, router_note};

pub const DEFAULT_MIN_INTENT_CONFIDENCE: f64 = 0.5;
pub const CLASSIFICATION_CONTEXT_MESSAGES: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handler {
    ProductInfo,
    GeneralChat,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteDecision {
    pub handler: Handler,
    pub injected_note: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    intent: Intent,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

pub fn classification_schema() -> OutputSchema {
    let labels: Vec<&str> = Intent::ALL.iter().map(Intent::as_str).collect();
    OutputSchema {
        name: "intent_classification".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "intent": { "type": "string", "enum": labels },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                "reasoning": { "type": "string" }
            },
            "required": ["intent", "confidence", "reasoning"],
            "additionalProperties": false
        }),
    }
}

#[derive(Clone)]
pub struct IntentRouter {
    llm: Arc<dyn LlmClient>,
    min_confidence: f64,
    timeout: Duration,
}

impl IntentRouter {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, min_confidence: DEFAULT_MIN_INTENT_CONFIDENCE, timeout }
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Classifies the latest user message. Never fails: model errors, timeouts
    /// and malformed output resolve to [`IntentClassification::fallback`].
    pub async fn classify(&self, messages: &[Message]) -> IntentClassification {
        let recent: Vec<Message> = messages
            .iter()
            .filter(|message| matches!(message.role, Role::User | Role::Assistant))
            .filter(|message| !message.content.is_empty())
            .cloned()
            .collect();
        let start = recent.len().saturating_sub(CLASSIFICATION_CONTEXT_MESSAGES);
        let recent = &recent[start..];

        let instruction = match render_classification(recent) {
            Ok(instruction) => instruction,
            Err(error) => return self.fallback(&error.to_string()),
        };

        let raw = invoke_structured::<RawClassification>(
            self.llm.as_ref(),
            vec![Message::system(instruction)],
            classification_schema(),
            self.timeout,
        )
        .await;

        let raw = match raw {
            Ok(raw) => raw,
            Err(error) => return self.fallback(&error.to_string()),
        };
        if !(0.0..=1.0).contains(&raw.confidence) {
            return self.fallback(&format!("confidence {} out of range", raw.confidence));
        }

        let classification = if raw.confidence < self.min_confidence {
            IntentClassification {
                intent: Intent::GeneralChat,
                confidence: raw.confidence,
                reasoning: format!(
                    "low confidence for {}: {}",
                    raw.intent.as_str(),
                    raw.reasoning
                ),
            }
        } else {
            IntentClassification { intent: raw.intent, confidence: raw.confidence, reasoning: raw.reasoning }
        };

        info!(
            event_name = "agent.router.classified",
            intent = classification.intent.as_str(),
            confidence = classification.confidence,
            "intent classified"
        );
        classification
    }

    fn fallback(&self, reason: &str) -> IntentClassification {
        warn!(event_name = "agent.router.fallback", reason = %reason, "intent classification fell back");
        IntentClassification::fallback()
    }
}

/// Maps a classification onto exactly one handler.
pub fn dispatch(classification: &IntentClassification) -> RouteDecision {
    match classification.intent {
        Intent::ProductInfo => RouteDecision { handler: Handler::ProductInfo, injected_note: None },
        Intent::GeneralChat => RouteDecision { handler: Handler::GeneralChat, injected_note: None },
        Intent::Recommendation | Intent::OrderLookup | Intent::Handoff => RouteDecision {
            handler: Handler::GeneralChat,
            injected_note: Some(Message::system(router_note(
                classification.intent.as_str(),
                &classification.routing_reason(),
            ))),
        },
    }
}
