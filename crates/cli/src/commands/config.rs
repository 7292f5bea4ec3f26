use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use soof_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct ConfigField<'a> {
    key_path: &'static str,
    value: String,
    env_keys: &'a [&'static str],
}

impl<'a> ConfigField<'a> {
    fn new(key_path: &'static str, value: impl Into<String>, env_keys: &'a [&'static str]) -> Self {
        Self { key_path, value: value.into(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField<'static>> {
    let routing = &config.routing;
    vec![
        ConfigField::new("database.url", config.database.url.clone(), &["SOOF_DATABASE_URL"]),
        ConfigField::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["SOOF_DATABASE_MAX_CONNECTIONS"],
        ),
        ConfigField::new(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["SOOF_DATABASE_TIMEOUT_SECS"],
        ),
        ConfigField::new("llm.provider", config.llm.provider.as_str(), &["SOOF_LLM_PROVIDER"]),
        ConfigField::new("llm.model", config.llm.model.clone(), &["SOOF_LLM_MODEL"]),
        ConfigField::new("llm.base_url", config.llm_base_url(), &["SOOF_LLM_BASE_URL"]),
        ConfigField::new("llm.api_key", redact_secret(config.llm.api_key.as_ref()), &["SOOF_LLM_API_KEY"]),
        ConfigField::new(
            "retrieval.index_host",
            config.retrieval.index_host.as_deref().unwrap_or("<unset>"),
            &["SOOF_RETRIEVAL_INDEX_HOST"],
        ),
        ConfigField::new(
            "retrieval.api_key",
            redact_secret(config.retrieval.api_key.as_ref()),
            &["SOOF_RETRIEVAL_API_KEY"],
        ),
        ConfigField::new(
            "retrieval.embedding_model",
            config.retrieval.embedding_model.clone(),
            &["SOOF_RETRIEVAL_EMBEDDING_MODEL"],
        ),
        ConfigField::new("retrieval.top_k", config.retrieval.top_k.to_string(), &["SOOF_RETRIEVAL_TOP_K"]),
        ConfigField::new(
            "shop.domain",
            config.shop.domain.as_deref().unwrap_or("<unset>"),
            &["SOOF_SHOP_DOMAIN"],
        ),
        ConfigField::new("shop.chatbot_name", config.shop.chatbot_name.clone(), &["SOOF_SHOP_CHATBOT_NAME"]),
        ConfigField::new("shop.shop_name", config.shop.shop_name.clone(), &["SOOF_SHOP_NAME"]),
        ConfigField::new(
            "shop.product_category",
            config.shop.product_category.clone(),
            &["SOOF_SHOP_PRODUCT_CATEGORY"],
        ),
        ConfigField::new(
            "routing.claims_validation_threshold",
            routing.claims_validation_threshold.to_string(),
            &["SOOF_ROUTING_CLAIMS_THRESHOLD"],
        ),
        ConfigField::new(
            "routing.max_regeneration_attempts",
            routing.max_regeneration_attempts.to_string(),
            &["SOOF_ROUTING_MAX_REGENERATION_ATTEMPTS"],
        ),
        ConfigField::new(
            "routing.context_window_size",
            routing.context_window_size.to_string(),
            &["SOOF_ROUTING_CONTEXT_WINDOW_SIZE"],
        ),
        ConfigField::new("routing.history_cap", routing.history_cap.to_string(), &["SOOF_ROUTING_HISTORY_CAP"]),
        ConfigField::new(
            "routing.max_tool_rounds",
            routing.max_tool_rounds.to_string(),
            &["SOOF_ROUTING_MAX_TOOL_ROUNDS"],
        ),
        ConfigField::new(
            "routing.min_intent_confidence",
            routing.min_intent_confidence.to_string(),
            &["SOOF_ROUTING_MIN_INTENT_CONFIDENCE"],
        ),
        ConfigField::new(
            "routing.passthrough_rewrite",
            routing.passthrough_rewrite.to_string(),
            &["SOOF_ROUTING_PASSTHROUGH_REWRITE"],
        ),
        ConfigField::new(
            "routing.call_timeout_secs",
            routing.call_timeout_secs.to_string(),
            &["SOOF_ROUTING_CALL_TIMEOUT_SECS"],
        ),
        ConfigField::new(
            "logging.level",
            config.logging.level.clone(),
            &["SOOF_LOGGING_LEVEL", "SOOF_LOG_LEVEL"],
        ),
        ConfigField::new(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["SOOF_LOGGING_FORMAT", "SOOF_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("soof.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/soof.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    // Short vendor prefixes such as `sk-` stay visible.
    if let Some((prefix, _)) = trimmed.split_once(|c: char| c == '-' || c == '_') {
        if prefix.len() <= 6 {
            return format!("{prefix}-***");
        }
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use toml::Value;

    use super::{contains_path, redact_secret};

    #[test]
    fn redaction_keeps_only_short_vendor_prefix() {
        let openai = SecretString::from("sk-live-abcdef".to_string());
        let opaque = SecretString::from("averylongopaquekeywithoutdelimiters".to_string());

        assert_eq!(redact_secret(Some(&openai)), "sk-***");
        assert_eq!(redact_secret(Some(&opaque)), "<redacted>");
        assert_eq!(redact_secret(None), "<unset>");
    }

    #[test]
    fn nested_key_paths_resolve_against_file_document() {
        let doc: Value = "[shop]\ndomain = \"example.com\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "shop.domain"));
        assert!(!contains_path(&doc, "shop.shop_name"));
        assert!(!contains_path(&doc, "routing.history_cap"));
    }
}
