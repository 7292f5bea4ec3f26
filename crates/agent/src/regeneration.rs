//! Bounded rewrite loop for non-compliant drafts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use soof_core::compliance::ComplianceCheck;
use soof_core::domain::claims::ClaimsValidationResult;
use soof_core::domain::message::Message;
use soof_core::routing::RoutingConfig;
use soof_core::turn::ComplianceResolution;
use tracing::{info, warn};

use crate::llm::{invoke_with_timeout, LlmClient, LlmError, ModelRequest};
use crate::prompts::{render_passthrough, render_regeneration};

#[derive(Clone)]
pub struct RegenerationController {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl RegenerationController {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Evaluates `candidate` and rewrites it until compliant or until
    /// `max_regeneration_attempts` rewrites were made. With
    /// `passthrough_rewrite`, a compliant draft first goes through
    /// [`RegenerationController::passthrough`].
    pub async fn enforce(
        &self,
        candidate: &str,
        original_query: &str,
        check: &dyn ComplianceCheck,
        config: &RoutingConfig,
    ) -> ComplianceResolution {
        let validation = check.evaluate(candidate, config.claims_validation_threshold).await;
        if !(validation.is_compliant && config.passthrough_rewrite) {
            return self.resolve(candidate, original_query, validation, check, config).await;
        }

        let (text, validation) = self.passthrough(candidate, validation, check, config).await;
        if validation.is_compliant {
            return ComplianceResolution::released(text, validation);
        }
        let mut resolution = self.resolve(&text, original_query, validation, check, config).await;
        resolution.original_response = Some(candidate.to_string());
        resolution
    }

    /// Asks the model to return an already compliant draft unchanged and
    /// evaluates what comes back. A failed or empty reply keeps `candidate`
    /// and its verdict.
    pub async fn passthrough(
        &self,
        candidate: &str,
        validation: ClaimsValidationResult,
        check: &dyn ComplianceCheck,
        config: &RoutingConfig,
    ) -> (String, ClaimsValidationResult) {
        let system_time = Utc::now().to_rfc3339();
        let reply = match render_passthrough(candidate, &system_time) {
            Ok(prompt) => self.complete(prompt).await,
            Err(error) => Err(LlmError::Configuration(error.to_string())),
        };

        match reply {
            Ok(text) if text == candidate.trim() => (candidate.to_string(), validation),
            Ok(text) => {
                let verdict = check.evaluate(&text, config.claims_validation_threshold).await;
                if !verdict.is_compliant {
                    warn!(
                        event_name = "agent.regeneration.passthrough_violation",
                        violations = verdict.violated_claims.len(),
                        "pass-through reply introduced forbidden claims"
                    );
                }
                (text, verdict)
            }
            Err(error) => {
                warn!(
                    event_name = "agent.regeneration.passthrough_failed",
                    error = %error,
                    "pass-through call failed, keeping compliant draft"
                );
                (candidate.to_string(), validation)
            }
        }
    }

    /// Continues from an already computed verdict for `candidate`. Never
    /// fails; a failed rewrite call still uses up one attempt.
    pub async fn resolve(
        &self,
        candidate: &str,
        original_query: &str,
        validation: ClaimsValidationResult,
        check: &dyn ComplianceCheck,
        config: &RoutingConfig,
    ) -> ComplianceResolution {
        if validation.is_compliant {
            return ComplianceResolution::released(candidate, validation);
        }

        let mut draft = candidate.to_string();
        let mut validation = validation;
        let mut original_response = None;
        let mut attempts = 0;

        while !validation.is_compliant && attempts < config.max_regeneration_attempts {
            attempts += 1;
            info!(
                event_name = "agent.regeneration.attempt",
                attempt = attempts,
                max_attempts = config.max_regeneration_attempts,
                violations = validation.violated_claims.len(),
                "rewriting draft"
            );

            let rewritten = match self.rewrite(original_query, &draft, &validation).await {
                Ok(rewritten) => rewritten,
                Err(error) => {
                    warn!(
                        event_name = "agent.regeneration.failed",
                        attempt = attempts,
                        error = %error,
                        "rewrite call failed, retrying with the same draft"
                    );
                    continue;
                }
            };

            original_response.get_or_insert_with(|| draft.clone());
            draft = rewritten;
            validation = check.evaluate(&draft, config.claims_validation_threshold).await;
        }

        let exhausted = !validation.is_compliant;
        if exhausted {
            warn!(
                event_name = "agent.regeneration.exhausted",
                attempts,
                violations = validation.violated_claims.len(),
                "draft still non-compliant after all rewrites"
            );
        }

        ComplianceResolution { final_text: draft, validation, original_response, attempts, exhausted }
    }

    async fn rewrite(
        &self,
        original_query: &str,
        draft: &str,
        validation: &ClaimsValidationResult,
    ) -> Result<String, LlmError> {
        let system_time = Utc::now().to_rfc3339();
        let prompt = render_regeneration(original_query, draft, validation, &system_time)
            .map_err(|error| LlmError::Configuration(error.to_string()))?;
        self.complete(prompt).await
    }

    async fn complete(&self, prompt: String) -> Result<String, LlmError> {
        let reply = invoke_with_timeout(
            self.llm.as_ref(),
            ModelRequest::new(vec![Message::system(prompt)]),
            self.timeout,
        )
        .await?;

        let text = reply.content.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use soof_core::compliance::{ComplianceEvaluator, StaticClaimRetriever};
    use soof_core::domain::claims::{ClaimRecord, ClaimType};
    use soof_core::routing::RoutingConfig;

    use super::RegenerationController;
    use crate::llm::ScriptedLlmClient;

    fn forbidden_when(phrase: &str) -> ComplianceEvaluator<StaticClaimRetriever> {
        ComplianceEvaluator::new(StaticClaimRetriever::new().when_contains(
            phrase,
            vec![ClaimRecord::new("veilig tijdens de zwangerschap", ClaimType::Forbidden, 0.9)],
        ))
    }

    fn controller(client: &Arc<ScriptedLlmClient>) -> RegenerationController {
        RegenerationController::new(client.clone(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn compliant_draft_is_released_without_rewrites() {
        let client = Arc::new(ScriptedLlmClient::new());
        let check = forbidden_when("100% veilig");

        let resolution = controller(&client)
            .enforce("Foliumzuur draagt bij aan de groei.", "vraag", &check, &RoutingConfig::default())
            .await;

        assert_eq!(resolution.attempts, 0);
        assert_eq!(resolution.final_text, "Foliumzuur draagt bij aan de groei.");
        assert!(resolution.original_response.is_none());
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn rewrite_stops_once_compliant() {
        let client = Arc::new(ScriptedLlmClient::new().reply_text("Foliumzuur draagt bij aan de groei."));
        let check = forbidden_when("100% veilig");

        let resolution = controller(&client)
            .enforce("Het is 100% veilig!", "Is het veilig?", &check, &RoutingConfig::default())
            .await;

        assert_eq!(resolution.attempts, 1);
        assert!(!resolution.exhausted);
        assert!(resolution.validation.is_compliant);
        assert_eq!(resolution.original_response.as_deref(), Some("Het is 100% veilig!"));
        let prompt = &client.requests()[0].messages[0].content;
        assert!(prompt.contains("YOUR PREVIOUS RESPONSE: Het is 100% veilig!"));
        assert!(prompt.contains("veilig tijdens de zwangerschap"));
    }

    #[tokio::test]
    async fn never_compliant_makes_exactly_max_rewrites() {
        let client = Arc::new(
            ScriptedLlmClient::new()
                .reply_text("Nog steeds 100% veilig.")
                .reply_text("Echt 100% veilig.")
                .reply_text("Gegarandeerd 100% veilig.")
                .reply_text("unused"),
        );
        let check = forbidden_when("100% veilig");

        let resolution = controller(&client)
            .enforce("Het is 100% veilig!", "Is het veilig?", &check, &RoutingConfig::default())
            .await;

        assert_eq!(client.requests().len(), 3);
        assert_eq!(client.remaining(), 1);
        assert_eq!(resolution.attempts, 3);
        assert!(resolution.exhausted);
        assert!(!resolution.validation.is_compliant);
        assert_eq!(resolution.final_text, "Gegarandeerd 100% veilig.");
        assert_eq!(resolution.original_response.as_deref(), Some("Het is 100% veilig!"));
    }

    #[tokio::test]
    async fn failed_rewrite_counts_as_attempt_and_retries() {
        let client = Arc::new(
            ScriptedLlmClient::new()
                .fail("transient 503")
                .reply_text("Foliumzuur draagt bij aan de groei."),
        );
        let check = forbidden_when("100% veilig");

        let resolution = controller(&client)
            .enforce("Het is 100% veilig!", "Is het veilig?", &check, &RoutingConfig::default())
            .await;

        assert_eq!(client.requests().len(), 2);
        assert_eq!(resolution.attempts, 2);
        assert!(!resolution.exhausted);
        assert!(resolution.validation.is_compliant);
        assert_eq!(resolution.final_text, "Foliumzuur draagt bij aan de groei.");
        assert_eq!(resolution.original_response.as_deref(), Some("Het is 100% veilig!"));
    }

    #[tokio::test]
    async fn failing_rewrites_exhaust_budget_and_flag_the_draft() {
        let client = Arc::new(ScriptedLlmClient::new().reply_text("Echt 100% veilig.").fail("rate limited"));
        let check = forbidden_when("100% veilig");

        let resolution = controller(&client)
            .enforce("Het is 100% veilig!", "Is het veilig?", &check, &RoutingConfig::default())
            .await;

        assert_eq!(client.requests().len(), 3);
        assert_eq!(resolution.attempts, 3);
        assert!(resolution.exhausted);
        assert_eq!(resolution.final_text, "Echt 100% veilig.");
        assert!(!resolution.validation.is_compliant);
    }

    #[tokio::test]
    async fn passthrough_asks_for_unchanged_text_and_records_no_regeneration() {
        let client = Arc::new(ScriptedLlmClient::new().reply_text("Compliant antwoord."));
        let check = forbidden_when("100% veilig");
        let config = RoutingConfig { passthrough_rewrite: true, ..RoutingConfig::default() };

        let resolution =
            controller(&client).enforce("Compliant antwoord.", "vraag", &check, &config).await;

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        let prompt = &requests[0].messages[0].content;
        assert!(prompt.contains("Return the text unchanged"));
        assert!(!prompt.contains("Rewrite your previous response"));
        assert_eq!(resolution.attempts, 0);
        assert!(resolution.original_response.is_none());
        assert_eq!(resolution.final_text, "Compliant antwoord.");
        assert!(resolution.validation.is_compliant);
    }

    #[tokio::test]
    async fn passthrough_reply_with_forbidden_claim_is_regenerated() {
        let client = Arc::new(
            ScriptedLlmClient::new()
                .reply_text("Compliant antwoord, en 100% veilig.")
                .reply_text("Compliant antwoord."),
        );
        let check = forbidden_when("100% veilig");
        let config = RoutingConfig { passthrough_rewrite: true, ..RoutingConfig::default() };

        let resolution =
            controller(&client).enforce("Compliant antwoord.", "vraag", &check, &config).await;

        assert_eq!(client.requests().len(), 2);
        assert_eq!(resolution.attempts, 1);
        assert!(resolution.validation.is_compliant);
        assert_eq!(resolution.final_text, "Compliant antwoord.");
        assert_eq!(resolution.original_response.as_deref(), Some("Compliant antwoord."));
    }

    #[tokio::test]
    async fn failed_passthrough_keeps_compliant_draft() {
        let client = Arc::new(ScriptedLlmClient::new().fail("offline"));
        let check = forbidden_when("100% veilig");
        let config = RoutingConfig { passthrough_rewrite: true, ..RoutingConfig::default() };

        let resolution =
            controller(&client).enforce("Compliant antwoord.", "vraag", &check, &config).await;

        assert_eq!(resolution.attempts, 0);
        assert_eq!(resolution.final_text, "Compliant antwoord.");
        assert!(resolution.validation.is_compliant);
    }
}
