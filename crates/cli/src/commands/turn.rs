use std::sync::Arc;

use serde_json::json;
use soof_agent::AgentRuntime;
use soof_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use soof_core::{InterfaceError, RoutingConfig, ThreadId, TurnOutcome};
use soof_db::{connect_with_config, migrations, SqlThreadStore};
use tracing::warn;

use crate::commands::{current_thread_runtime, CommandResult};

#[derive(Debug, Clone)]
pub struct TurnArgs {
    pub thread: String,
    pub shop_domain: Option<String>,
    pub json: bool,
    pub message: String,
}

pub fn run(args: TurnArgs) -> CommandResult {
    if args.thread.trim().is_empty() {
        return CommandResult::failure("turn", "invalid_argument", "thread id must not be empty", 2);
    }

    let options = LoadOptions {
        overrides: ConfigOverrides { shop_domain: args.shop_domain.clone(), ..ConfigOverrides::default() },
        ..LoadOptions::default()
    };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "turn",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "turn",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                warn!(event_name = "cli.turn.db_unavailable", error = %error, "thread store unavailable");
                return CommandResult::failure("turn", "db_connectivity", error.to_string(), 4);
            }
        };
        if let Err(error) = migrations::run_pending(&pool).await {
            warn!(event_name = "cli.turn.migration_failed", error = %error, "thread store migrations failed");
            return CommandResult::failure("turn", "migration", error.to_string(), 5);
        }

        let store = Arc::new(SqlThreadStore::new(pool.clone()));
        let agent = match AgentRuntime::from_config(&config, store) {
            Ok(agent) => agent,
            Err(error) => {
                return CommandResult::failure("turn", "runtime_init", error.to_string(), 3);
            }
        };

        let result = execute(
            &agent,
            &ThreadId::new(args.thread.as_str()),
            &args.message,
            &config.routing_config(),
            args.json,
        )
        .await;
        pool.close().await;
        result
    })
}

/// Runs one turn against an already wired runtime and renders the outcome.
pub async fn execute(
    agent: &AgentRuntime,
    thread_id: &ThreadId,
    message: &str,
    routing: &RoutingConfig,
    json: bool,
) -> CommandResult {
    let outcome = match agent.process_turn(thread_id, message, routing).await {
        Ok(outcome) => outcome,
        Err(error) => {
            let interface = InterfaceError::from(error);
            return CommandResult::failure(
                "turn",
                "turn_failed",
                format!("{} ({interface}; thread {thread_id})", interface.user_message()),
                1,
            );
        }
    };

    if json {
        let data = serde_json::to_value(&outcome).unwrap_or_else(|_| json!({}));
        CommandResult::success_with_data("turn", render_summary(&outcome), Some(data))
    } else {
        CommandResult { exit_code: 0, output: render_human(&outcome) }
    }
}

fn render_summary(outcome: &TurnOutcome) -> String {
    format!(
        "turn processed on thread `{}` as {}",
        outcome.thread_id,
        outcome.intent.intent.as_str()
    )
}

fn render_human(outcome: &TurnOutcome) -> String {
    let mut lines = vec![outcome.message.content.clone(), String::new()];
    lines.push(format!(
        "intent: {} ({:.0}%)",
        outcome.intent.intent.as_str(),
        outcome.intent.confidence * 100.0
    ));
    lines.push(format!("routing: {}", outcome.routing_reason));
    if let Some(validation) = &outcome.claims_validation {
        lines.push(format!(
            "compliance: {} (score {:.2}{})",
            if validation.is_compliant { "compliant" } else { "non-compliant" },
            validation.compliance_score,
            if validation.degraded { ", degraded" } else { "" }
        ));
    }
    if outcome.regeneration_attempts > 0 {
        lines.push(format!("regeneration attempts: {}", outcome.regeneration_attempts));
    }
    if outcome.compliance_exhausted {
        lines.push("compliance exhausted: last rewrite released".to_string());
    }
    if outcome.used_fallback {
        lines.push("fallback reply released".to_string());
    }
    lines.join("\n")
}
