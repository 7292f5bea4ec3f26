use serde::Serialize;
use soof_core::config::{AppConfig, LlmProvider, LoadOptions};
use soof_db::connect_with_config;

use crate::commands::{current_thread_runtime, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Skipped checks do not fail the report; a missing claims index only means
/// the compliance gate runs degraded.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_llm_readiness(&config));
            checks.push(check_retrieval_readiness(&config));
            checks.push(check_shop_domain(&config));
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            for name in ["llm_readiness", "retrieval_readiness", "shop_domain", "database_connectivity"]
            {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_readiness(config: &AppConfig) -> DoctorCheck {
    let base_url = config.llm_base_url();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return DoctorCheck::new(
            "llm_readiness",
            CheckStatus::Fail,
            format!("llm base url `{base_url}` is not an http(s) url"),
        );
    }

    match config.llm.provider {
        LlmProvider::OpenAi if config.llm.api_key.is_none() => DoctorCheck::new(
            "llm_readiness",
            CheckStatus::Fail,
            "openai provider requires an api key",
        ),
        provider => DoctorCheck::new(
            "llm_readiness",
            CheckStatus::Pass,
            format!("{} model `{}` at {base_url}", provider.as_str(), config.llm.model),
        ),
    }
}

fn check_retrieval_readiness(config: &AppConfig) -> DoctorCheck {
    match (&config.retrieval.index_host, &config.retrieval.api_key) {
        (Some(host), Some(_)) => DoctorCheck::new(
            "retrieval_readiness",
            CheckStatus::Pass,
            format!("claims index `{host}` with top_k {}", config.retrieval.top_k),
        ),
        (None, _) => DoctorCheck::new(
            "retrieval_readiness",
            CheckStatus::Skipped,
            "claims index host not configured; compliance checks will run degraded",
        ),
        (Some(_), None) => DoctorCheck::new(
            "retrieval_readiness",
            CheckStatus::Skipped,
            "claims index api key not configured; compliance checks will run degraded",
        ),
    }
}

fn check_shop_domain(config: &AppConfig) -> DoctorCheck {
    match &config.shop.domain {
        Some(domain) => DoctorCheck::new(
            "shop_domain",
            CheckStatus::Pass,
            format!("product catalog at https://{domain}/api/mcp"),
        ),
        None => DoctorCheck::new(
            "shop_domain",
            CheckStatus::Skipped,
            "shop domain not configured; product lookups will report a configuration error",
        ),
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck::new(
            "database_connectivity",
            CheckStatus::Pass,
            format!("connected using `{}`", config.database.url),
        ),
        Err(error) => DoctorCheck::new("database_connectivity", CheckStatus::Fail, error),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
