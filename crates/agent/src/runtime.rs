//! Turn orchestration: routing, the agent/tool loop, the compliance gate and
//! persistence, sequenced by [`TurnFlowEngine`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use soof_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use soof_core::compliance::{ComplianceCheck, ComplianceEvaluator};
use soof_core::config::{AppConfig, ShopConfig};
use soof_core::context::ContextWindowBuilder;
use soof_core::domain::claims::ClaimsValidationResult;
use soof_core::domain::message::Message;
use soof_core::domain::thread::ThreadId;
use soof_core::errors::ApplicationError;
use soof_core::flows::{TurnAction, TurnContext, TurnEvent, TurnFlowEngine, TurnState};
use soof_core::history::{History, DEFAULT_HISTORY_CAP};
use soof_core::routing::RoutingConfig;
use soof_core::store::ThreadStore;
use soof_core::turn::{ComplianceResolution, Conversation, TurnOutcome};
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::{invoke_with_timeout, LlmClient, ModelRequest, OpenAiCompatibleClient, ToolSpec};
use crate::prompts::{render_base_system, FALLBACK_REPLY, PRODUCT_INFO_TEMPLATE};
use crate::regeneration::RegenerationController;
use crate::retrieval::PineconeClaimRetriever;
use crate::router::{dispatch, Handler, IntentRouter, DEFAULT_MIN_INTENT_CONFIDENCE};
use crate::tools::{HandoffTool, ProductInfoTool, ToolContext, ToolRegistry};

pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 5;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide knobs that stay fixed across turns.
#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub shop: ShopConfig,
    pub history_cap: usize,
    pub max_tool_rounds: u32,
    pub min_intent_confidence: f64,
    pub call_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            shop: AppConfig::default().shop,
            history_cap: DEFAULT_HISTORY_CAP,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            min_intent_confidence: DEFAULT_MIN_INTENT_CONFIDENCE,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            shop: config.shop.clone(),
            history_cap: config.routing.history_cap,
            max_tool_rounds: config.routing.max_tool_rounds,
            min_intent_confidence: config.routing.min_intent_confidence,
            call_timeout: Duration::from_secs(config.routing.call_timeout_secs),
        }
    }
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    compliance: Arc<dyn ComplianceCheck>,
    store: Arc<dyn ThreadStore>,
    audit: Arc<dyn AuditSink>,
    tools: ToolRegistry,
    router: IntentRouter,
    regeneration: RegenerationController,
    engine: TurnFlowEngine,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        compliance: Arc<dyn ComplianceCheck>,
        store: Arc<dyn ThreadStore>,
        settings: RuntimeSettings,
    ) -> Self {
        let router = IntentRouter::new(llm.clone(), settings.call_timeout)
            .with_min_confidence(settings.min_intent_confidence);
        let regeneration = RegenerationController::new(llm.clone(), settings.call_timeout);
        let tools = ToolRegistry::default()
            .with_timeout(settings.call_timeout)
            .with_tool(ProductInfoTool::new(settings.call_timeout))
            .with_tool(HandoffTool);

        Self {
            llm,
            compliance,
            store,
            audit: Arc::new(TracingAuditSink),
            tools,
            router,
            regeneration,
            engine: TurnFlowEngine::new(),
            settings,
        }
    }

    /// Wires the OpenAI-compatible model client and the Pinecone-backed
    /// compliance gate from configuration.
    pub fn from_config(config: &AppConfig, store: Arc<dyn ThreadStore>) -> Result<Self, ApplicationError> {
        let llm = Arc::new(
            OpenAiCompatibleClient::from_config(&config.llm, config.llm_base_url())
                .map_err(|error| ApplicationError::Configuration(error.to_string()))?,
        );
        let retriever = PineconeClaimRetriever::from_config(&config.retrieval, llm.clone())
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        let compliance = ComplianceEvaluator::new(retriever)
            .with_top_k(config.retrieval.top_k)
            .with_timeout(Duration::from_secs(config.retrieval.timeout_secs));

        Ok(Self::new(llm, Arc::new(compliance), store, RuntimeSettings::from_config(config)))
    }

    /// Replaces the bound tools; calls are bounded by the runtime's call timeout.
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools.with_timeout(self.settings.call_timeout);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Processes one user message on `thread_id`. Only an invalid `routing`
    /// is an error; every downstream failure degrades into the outcome.
    pub async fn process_turn(
        &self,
        thread_id: &ThreadId,
        user_text: &str,
        routing: &RoutingConfig,
    ) -> Result<TurnOutcome, ApplicationError> {
        routing.validate()?;

        let correlation_id = Uuid::new_v4().to_string();
        let audit_context =
            AuditContext::new(Some(thread_id.to_string()), correlation_id.clone(), "soof-agent");
        self.audit.emit(AuditEvent::from_context(
            &audit_context,
            "ingress.turn_received",
            AuditCategory::Ingress,
            AuditOutcome::Success,
        ));

        let stored = match self.store.load_history(thread_id).await {
            Ok(messages) => messages,
            Err(error) => {
                warn!(
                    event_name = "agent.turn.history_unavailable",
                    thread_id = %thread_id,
                    correlation_id = %correlation_id,
                    error = %error,
                    "thread history could not be loaded, continuing without it"
                );
                Vec::new()
            }
        };
        let history = History::from_messages(stored, self.settings.history_cap);
        let mut conversation = Conversation::start(thread_id.clone(), history, Message::user(user_text));

        let classification = self.router.classify(conversation.messages()).await;
        let decision = dispatch(&classification);
        self.audit.emit(
            AuditEvent::from_context(
                &audit_context,
                "routing.intent_classified",
                AuditCategory::Routing,
                AuditOutcome::Success,
            )
            .with_metadata("intent", classification.intent.as_str())
            .with_metadata("handler", format!("{:?}", decision.handler)),
        );
        conversation.set_routing(classification);

        let (injected, tool_specs) = match decision.handler {
            Handler::ProductInfo => (vec![Message::system(PRODUCT_INFO_TEMPLATE)], self.tools.specs()),
            Handler::GeneralChat => (decision.injected_note.into_iter().collect(), Vec::new()),
        };
        let window = self.context_builder(routing.context_window_size, &correlation_id);
        let tool_context = ToolContext {
            shop_domain: routing.shop_domain.clone().or_else(|| self.settings.shop.domain.clone()),
            latest_user_text: user_text.to_string(),
        };

        let mut state = self.engine.initial_state();
        let mut pending_validation: Option<ClaimsValidationResult> = None;
        let mut passthrough_source: Option<String> = None;

        while !state.is_terminal() {
            let event = match state {
                TurnState::Agent => {
                    self.agent_step(&mut conversation, &window, &injected, &tool_specs, &correlation_id)
                        .await
                }
                TurnState::ToolExecution => {
                    self.execute_tools(&mut conversation, &tool_context, &audit_context).await
                }
                TurnState::ComplianceCheck => {
                    let draft = conversation.pending_text().to_string();
                    let validation =
                        self.compliance.evaluate(&draft, routing.claims_validation_threshold).await;
                    self.emit_compliance(&audit_context, &validation, 0);
                    let (text, validation) = if validation.is_compliant && routing.passthrough_rewrite {
                        self.regeneration
                            .passthrough(&draft, validation, self.compliance.as_ref(), routing)
                            .await
                    } else {
                        (draft.clone(), validation)
                    };
                    if validation.is_compliant {
                        conversation.complete_compliance(ComplianceResolution::released(text, validation));
                        TurnEvent::ComplianceVerified
                    } else {
                        if text != draft {
                            passthrough_source = Some(draft);
                            conversation.set_pending(Message::assistant(text));
                        }
                        pending_validation = Some(validation);
                        TurnEvent::ComplianceViolated
                    }
                }
                TurnState::Regenerate => {
                    let draft = conversation.pending_text().to_string();
                    let mut resolution = match pending_validation.take() {
                        Some(validation) => {
                            self.regeneration
                                .resolve(&draft, user_text, validation, self.compliance.as_ref(), routing)
                                .await
                        }
                        None => {
                            self.regeneration
                                .enforce(&draft, user_text, self.compliance.as_ref(), routing)
                                .await
                        }
                    };
                    if let Some(source) = passthrough_source.take() {
                        resolution.original_response = Some(source);
                    }
                    self.emit_compliance(&audit_context, &resolution.validation, resolution.attempts);
                    conversation.complete_compliance(resolution);
                    TurnEvent::RegenerationFinished
                }
                TurnState::Done => break,
            };

            let context = TurnContext { needs_compliance: conversation.needs_compliance() };
            match self.engine.apply_with_audit(&state, &event, &context, self.audit.as_ref(), &audit_context) {
                Ok(outcome) => {
                    if outcome.actions.contains(&TurnAction::ReleaseFallback) {
                        warn!(
                            event_name = "agent.turn.fallback",
                            thread_id = %thread_id,
                            correlation_id = %correlation_id,
                            event = ?outcome.event,
                            "releasing fallback reply"
                        );
                    }
                    state = outcome.to;
                }
                Err(error) => {
                    warn!(
                        event_name = "agent.turn.transition_rejected",
                        thread_id = %thread_id,
                        correlation_id = %correlation_id,
                        error = %error,
                        "turn graph rejected an event, finishing best-effort"
                    );
                    break;
                }
            }
        }

        let (outcome, record) = conversation.finish(FALLBACK_REPLY);

        if let Err(error) = self.store.append_turn(&record).await {
            warn!(
                event_name = "agent.turn.store_failed",
                thread_id = %thread_id,
                correlation_id = %correlation_id,
                error = %error,
                "turn could not be persisted"
            );
            self.audit.emit(
                AuditEvent::from_context(
                    &audit_context,
                    "persistence.turn_append_failed",
                    AuditCategory::Persistence,
                    AuditOutcome::Failed,
                )
                .with_metadata("error", error.to_string()),
            );
        }

        info!(
            event_name = "agent.turn.completed",
            thread_id = %thread_id,
            correlation_id = %correlation_id,
            intent = outcome.intent.intent.as_str(),
            regeneration_attempts = outcome.regeneration_attempts,
            compliance_exhausted = outcome.compliance_exhausted,
            used_fallback = outcome.used_fallback,
            "turn completed"
        );
        Ok(outcome)
    }

    fn context_builder(&self, window_size: usize, correlation_id: &str) -> ContextWindowBuilder {
        let builder = ContextWindowBuilder::new(window_size);
        match render_base_system(&self.settings.shop, window_size, &Utc::now().to_rfc3339()) {
            Ok(prompt) => builder.with_base_system_prompt(prompt),
            Err(error) => {
                warn!(
                    event_name = "agent.prompts.render_failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "base system prompt unavailable"
                );
                builder
            }
        }
    }

    async fn agent_step(
        &self,
        conversation: &mut Conversation,
        window: &ContextWindowBuilder,
        injected: &[Message],
        tool_specs: &[ToolSpec],
        correlation_id: &str,
    ) -> TurnEvent {
        let request =
            ModelRequest::new(window.build(conversation.messages(), injected)).with_tools(tool_specs.to_vec());

        let reply = match invoke_with_timeout(self.llm.as_ref(), request, self.settings.call_timeout).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "agent.turn.model_failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "agent model call failed"
                );
                return TurnEvent::AgentFailed;
            }
        };

        // Tool calls are only honoured when tools were bound.
        let reply = if tool_specs.is_empty() { Message::assistant(reply.content) } else { reply };

        if reply.has_tool_calls() {
            if conversation.tool_rounds() >= self.settings.max_tool_rounds {
                warn!(
                    event_name = "agent.turn.tool_round_limit",
                    correlation_id = %correlation_id,
                    rounds = conversation.tool_rounds(),
                    "tool round ceiling reached"
                );
                return TurnEvent::ToolRoundLimitReached;
            }
            conversation.set_pending(reply);
            return TurnEvent::ToolCallsRequested;
        }

        if reply.content.trim().is_empty() {
            warn!(event_name = "agent.turn.empty_draft", correlation_id = %correlation_id, "model returned an empty draft");
            return TurnEvent::AgentFailed;
        }
        conversation.set_pending(reply);
        TurnEvent::DraftProduced
    }

    async fn execute_tools(
        &self,
        conversation: &mut Conversation,
        context: &ToolContext,
        audit_context: &AuditContext,
    ) -> TurnEvent {
        let draft = conversation.pending().cloned();
        conversation.enter_tool_execution();
        let Some(draft) = draft else {
            return TurnEvent::ToolResultsAppended;
        };

        let calls = draft.tool_calls.clone();
        conversation.append(draft);
        for call in &calls {
            let execution = self.tools.execute(call, context).await;
            if execution.requires_compliance {
                conversation.mark_needs_compliance();
            }
            self.audit.emit(
                AuditEvent::from_context(
                    audit_context,
                    "tooling.tool_executed",
                    AuditCategory::Tooling,
                    if execution.failed { AuditOutcome::Failed } else { AuditOutcome::Success },
                )
                .with_metadata("tool", call.name.clone()),
            );
            conversation.append(execution.message);
        }
        TurnEvent::ToolResultsAppended
    }

    fn emit_compliance(&self, context: &AuditContext, validation: &ClaimsValidationResult, attempts: u32) {
        let event_type = if validation.degraded { "compliance.degraded" } else { "compliance.evaluated" };
        self.audit.emit(
            AuditEvent::from_context(
                context,
                event_type,
                AuditCategory::Compliance,
                if validation.is_compliant { AuditOutcome::Success } else { AuditOutcome::Rejected },
            )
            .with_metadata("degraded", validation.degraded.to_string())
            .with_metadata("score", format!("{:.3}", validation.compliance_score))
            .with_metadata("violations", validation.violated_claims.len().to_string())
            .with_metadata("attempts", attempts.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use soof_core::audit::InMemoryAuditSink;
    use soof_core::compliance::{ComplianceEvaluator, StaticClaimRetriever};
    use soof_core::domain::intent::Intent;
    use soof_core::domain::thread::ThreadId;
    use soof_core::errors::ApplicationError;
    use soof_core::routing::RoutingConfig;
    use soof_core::store::InMemoryThreadStore;

    use super::{AgentRuntime, RuntimeSettings};
    use crate::llm::ScriptedLlmClient;
    use crate::prompts::FALLBACK_REPLY;

    fn runtime(client: ScriptedLlmClient) -> (AgentRuntime, Arc<InMemoryThreadStore>, InMemoryAuditSink) {
        let store = Arc::new(InMemoryThreadStore::default());
        let audit = InMemoryAuditSink::default();
        let runtime = AgentRuntime::new(
            Arc::new(client),
            Arc::new(ComplianceEvaluator::new(StaticClaimRetriever::new())),
            store.clone(),
            RuntimeSettings::default(),
        )
        .with_audit_sink(Arc::new(audit.clone()));
        (runtime, store, audit)
    }

    #[tokio::test]
    async fn general_chat_releases_draft_without_compliance() {
        let (runtime, store, audit) = runtime(
            ScriptedLlmClient::new()
                .reply_json(json!({ "intent": "general_chat", "confidence": 0.95, "reasoning": "greeting" }))
                .reply_text("Hallo! Waarmee kan ik je helpen?"),
        );
        let thread = ThreadId::new("t-1");

        let outcome =
            runtime.process_turn(&thread, "Hoi!", &RoutingConfig::default()).await.expect("turn");

        assert_eq!(outcome.message.content, "Hallo! Waarmee kan ik je helpen?");
        assert_eq!(outcome.intent.intent, Intent::GeneralChat);
        assert!(outcome.claims_validation.is_none());
        assert!(!outcome.used_fallback);
        assert_eq!(store.messages(&thread).len(), 2);
        assert!(audit.event_types().contains(&"flow.transition_applied".to_string()));
    }

    #[tokio::test]
    async fn invalid_routing_config_is_rejected_before_any_call() {
        let client = ScriptedLlmClient::new();
        let (runtime, store, _) = runtime(client);
        let routing = RoutingConfig { max_regeneration_attempts: 0, ..RoutingConfig::default() };

        let result = runtime.process_turn(&ThreadId::new("t-2"), "hoi", &routing).await;

        assert!(matches!(result, Err(ApplicationError::Configuration(_))));
        assert!(store.messages(&ThreadId::new("t-2")).is_empty());
    }

    #[tokio::test]
    async fn model_failure_releases_fallback_reply() {
        let (runtime, store, _) = runtime(
            ScriptedLlmClient::new()
                .reply_json(json!({ "intent": "general_chat", "confidence": 0.9, "reasoning": "chat" }))
                .fail("upstream 503"),
        );
        let thread = ThreadId::new("t-3");

        let outcome = runtime.process_turn(&thread, "Hoi", &RoutingConfig::default()).await.expect("turn");

        assert!(outcome.used_fallback);
        assert_eq!(outcome.message.content, FALLBACK_REPLY);
        assert_eq!(store.messages(&thread).last().map(|m| m.content.as_str()), Some(FALLBACK_REPLY));
    }
}
