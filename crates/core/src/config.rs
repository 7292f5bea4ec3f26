use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::RoutingConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub shop: ShopConfig,
    pub routing: RoutingSettings,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Claims index access. Embeddings are requested from the OpenAI-compatible
/// endpoint configured under `[llm]`.
#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    pub index_host: Option<String>,
    pub api_key: Option<SecretString>,
    pub namespace: Option<String>,
    pub embedding_model: String,
    pub top_k: usize,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ShopConfig {
    pub domain: Option<String>,
    pub chatbot_name: String,
    pub shop_name: String,
    pub product_category: String,
}

#[derive(Clone, Debug)]
pub struct RoutingSettings {
    pub claims_validation_threshold: f64,
    pub max_regeneration_attempts: u32,
    pub context_window_size: usize,
    pub history_cap: usize,
    pub max_tool_rounds: u32,
    pub min_intent_confidence: f64,
    pub passthrough_rewrite: bool,
    pub call_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub shop_domain: Option<String>,
    pub claims_validation_threshold: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        let routing = RoutingConfig::default();
        Self {
            database: DatabaseConfig {
                url: "sqlite://soof.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            retrieval: RetrievalConfig {
                index_host: None,
                api_key: None,
                namespace: None,
                embedding_model: "text-embedding-3-small".to_string(),
                top_k: crate::compliance::DEFAULT_TOP_K,
                timeout_secs: 10,
            },
            shop: ShopConfig {
                domain: None,
                chatbot_name: "Soof".to_string(),
                shop_name: "de webshop".to_string(),
                product_category: "voedingssupplementen".to_string(),
            },
            routing: RoutingSettings {
                claims_validation_threshold: routing.claims_validation_threshold,
                max_regeneration_attempts: routing.max_regeneration_attempts,
                context_window_size: routing.context_window_size,
                history_cap: crate::history::DEFAULT_HISTORY_CAP,
                max_tool_rounds: 5,
                min_intent_confidence: 0.5,
                passthrough_rewrite: routing.passthrough_rewrite,
                call_timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("soof.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Per-turn routing derived from the loaded settings.
    pub fn routing_config(&self) -> RoutingConfig {
        RoutingConfig {
            claims_validation_threshold: self.routing.claims_validation_threshold,
            max_regeneration_attempts: self.routing.max_regeneration_attempts,
            context_window_size: self.routing.context_window_size,
            shop_domain: self.shop.domain.clone(),
            passthrough_rewrite: self.routing.passthrough_rewrite,
        }
    }

    pub fn llm_base_url(&self) -> String {
        self.llm
            .base_url
            .clone()
            .unwrap_or_else(|| self.llm.provider.default_base_url().to_string())
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(retrieval) = patch.retrieval {
            if let Some(index_host) = retrieval.index_host {
                self.retrieval.index_host = Some(index_host);
            }
            if let Some(retrieval_api_key_value) = retrieval.api_key {
                self.retrieval.api_key = Some(secret_value(retrieval_api_key_value));
            }
            if let Some(namespace) = retrieval.namespace {
                self.retrieval.namespace = Some(namespace);
            }
            if let Some(embedding_model) = retrieval.embedding_model {
                self.retrieval.embedding_model = embedding_model;
            }
            if let Some(top_k) = retrieval.top_k {
                self.retrieval.top_k = top_k;
            }
            if let Some(timeout_secs) = retrieval.timeout_secs {
                self.retrieval.timeout_secs = timeout_secs;
            }
        }

        if let Some(shop) = patch.shop {
            if let Some(domain) = shop.domain {
                self.shop.domain = Some(domain);
            }
            if let Some(chatbot_name) = shop.chatbot_name {
                self.shop.chatbot_name = chatbot_name;
            }
            if let Some(shop_name) = shop.shop_name {
                self.shop.shop_name = shop_name;
            }
            if let Some(product_category) = shop.product_category {
                self.shop.product_category = product_category;
            }
        }

        if let Some(routing) = patch.routing {
            if let Some(threshold) = routing.claims_validation_threshold {
                self.routing.claims_validation_threshold = threshold;
            }
            if let Some(attempts) = routing.max_regeneration_attempts {
                self.routing.max_regeneration_attempts = attempts;
            }
            if let Some(window) = routing.context_window_size {
                self.routing.context_window_size = window;
            }
            if let Some(history_cap) = routing.history_cap {
                self.routing.history_cap = history_cap;
            }
            if let Some(max_tool_rounds) = routing.max_tool_rounds {
                self.routing.max_tool_rounds = max_tool_rounds;
            }
            if let Some(min_intent_confidence) = routing.min_intent_confidence {
                self.routing.min_intent_confidence = min_intent_confidence;
            }
            if let Some(passthrough_rewrite) = routing.passthrough_rewrite {
                self.routing.passthrough_rewrite = passthrough_rewrite;
            }
            if let Some(call_timeout_secs) = routing.call_timeout_secs {
                self.routing.call_timeout_secs = call_timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SOOF_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SOOF_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("SOOF_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SOOF_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("SOOF_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOOF_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("SOOF_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SOOF_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("SOOF_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SOOF_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("SOOF_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SOOF_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("SOOF_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("SOOF_RETRIEVAL_INDEX_HOST") {
            self.retrieval.index_host = Some(value);
        }
        if let Some(value) = read_env("SOOF_RETRIEVAL_API_KEY") {
            self.retrieval.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SOOF_RETRIEVAL_NAMESPACE") {
            self.retrieval.namespace = Some(value);
        }
        if let Some(value) = read_env("SOOF_RETRIEVAL_EMBEDDING_MODEL") {
            self.retrieval.embedding_model = value;
        }
        if let Some(value) = read_env("SOOF_RETRIEVAL_TOP_K") {
            self.retrieval.top_k = parse_env("SOOF_RETRIEVAL_TOP_K", &value)?;
        }
        if let Some(value) = read_env("SOOF_RETRIEVAL_TIMEOUT_SECS") {
            self.retrieval.timeout_secs = parse_env("SOOF_RETRIEVAL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOOF_SHOP_DOMAIN") {
            self.shop.domain = Some(value);
        }
        if let Some(value) = read_env("SOOF_SHOP_CHATBOT_NAME") {
            self.shop.chatbot_name = value;
        }
        if let Some(value) = read_env("SOOF_SHOP_NAME") {
            self.shop.shop_name = value;
        }
        if let Some(value) = read_env("SOOF_SHOP_PRODUCT_CATEGORY") {
            self.shop.product_category = value;
        }

        if let Some(value) = read_env("SOOF_ROUTING_CLAIMS_THRESHOLD") {
            self.routing.claims_validation_threshold =
                parse_env("SOOF_ROUTING_CLAIMS_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("SOOF_ROUTING_MAX_REGENERATION_ATTEMPTS") {
            self.routing.max_regeneration_attempts =
                parse_env("SOOF_ROUTING_MAX_REGENERATION_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("SOOF_ROUTING_CONTEXT_WINDOW_SIZE") {
            self.routing.context_window_size =
                parse_env("SOOF_ROUTING_CONTEXT_WINDOW_SIZE", &value)?;
        }
        if let Some(value) = read_env("SOOF_ROUTING_HISTORY_CAP") {
            self.routing.history_cap = parse_env("SOOF_ROUTING_HISTORY_CAP", &value)?;
        }
        if let Some(value) = read_env("SOOF_ROUTING_MAX_TOOL_ROUNDS") {
            self.routing.max_tool_rounds = parse_env("SOOF_ROUTING_MAX_TOOL_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("SOOF_ROUTING_MIN_INTENT_CONFIDENCE") {
            self.routing.min_intent_confidence =
                parse_env("SOOF_ROUTING_MIN_INTENT_CONFIDENCE", &value)?;
        }
        if let Some(value) = read_env("SOOF_ROUTING_PASSTHROUGH_REWRITE") {
            self.routing.passthrough_rewrite =
                parse_env("SOOF_ROUTING_PASSTHROUGH_REWRITE", &value)?;
        }
        if let Some(value) = read_env("SOOF_ROUTING_CALL_TIMEOUT_SECS") {
            self.routing.call_timeout_secs = parse_env("SOOF_ROUTING_CALL_TIMEOUT_SECS", &value)?;
        }

        let log_level = read_env("SOOF_LOGGING_LEVEL").or_else(|| read_env("SOOF_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("SOOF_LOGGING_FORMAT").or_else(|| read_env("SOOF_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(shop_domain) = overrides.shop_domain {
            self.shop.domain = Some(shop_domain);
        }
        if let Some(threshold) = overrides.claims_validation_threshold {
            self.routing.claims_validation_threshold = threshold;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_retrieval(&self.retrieval)?;
        validate_shop(&self.shop)?;
        validate_routing(&self.routing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("soof.toml"), PathBuf::from("config/soof.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.provider == LlmProvider::OpenAi {
        let missing =
            llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "llm.api_key is required for the openai provider. Set SOOF_LLM_API_KEY or [llm].api_key"
                    .to_string(),
            ));
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_retrieval(retrieval: &RetrievalConfig) -> Result<(), ConfigError> {
    if retrieval.top_k == 0 || retrieval.top_k > 100 {
        return Err(ConfigError::Validation("retrieval.top_k must be in range 1..=100".to_string()));
    }

    if retrieval.timeout_secs == 0 || retrieval.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "retrieval.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if let Some(host) = &retrieval.index_host {
        if !is_http_url(host) {
            return Err(ConfigError::Validation(
                "retrieval.index_host must start with http:// or https:// (copy it from the index overview page)"
                    .to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_shop(shop: &ShopConfig) -> Result<(), ConfigError> {
    if let Some(domain) = &shop.domain {
        let domain = domain.trim();
        if domain.is_empty() || domain.contains("://") || domain.contains('/') {
            return Err(ConfigError::Validation(
                "shop.domain must be a bare host such as `example.myshopify.com`".to_string(),
            ));
        }
    }

    if shop.chatbot_name.trim().is_empty() {
        return Err(ConfigError::Validation("shop.chatbot_name must not be empty".to_string()));
    }

    Ok(())
}

fn validate_routing(routing: &RoutingSettings) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&routing.claims_validation_threshold) {
        return Err(ConfigError::Validation(
            "routing.claims_validation_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if routing.max_regeneration_attempts == 0 {
        return Err(ConfigError::Validation(
            "routing.max_regeneration_attempts must be greater than zero".to_string(),
        ));
    }

    if routing.context_window_size == 0 {
        return Err(ConfigError::Validation(
            "routing.context_window_size must be greater than zero".to_string(),
        ));
    }

    if routing.history_cap < routing.context_window_size {
        return Err(ConfigError::Validation(
            "routing.history_cap must be at least routing.context_window_size".to_string(),
        ));
    }

    if routing.max_tool_rounds == 0 {
        return Err(ConfigError::Validation(
            "routing.max_tool_rounds must be greater than zero".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&routing.min_intent_confidence) {
        return Err(ConfigError::Validation(
            "routing.min_intent_confidence must be in range 0.0..=1.0".to_string(),
        ));
    }

    if routing.call_timeout_secs == 0 || routing.call_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "routing.call_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    retrieval: Option<RetrievalPatch>,
    shop: Option<ShopPatch>,
    routing: Option<RoutingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalPatch {
    index_host: Option<String>,
    api_key: Option<String>,
    namespace: Option<String>,
    embedding_model: Option<String>,
    top_k: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ShopPatch {
    domain: Option<String>,
    chatbot_name: Option<String>,
    shop_name: Option<String>,
    product_category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    claims_validation_threshold: Option<f64>,
    max_regeneration_attempts: Option<u32>,
    context_window_size: Option<usize>,
    history_cap: Option<usize>,
    max_tool_rounds: Option<u32>,
    min_intent_confidence: Option<f64>,
    passthrough_rewrite: Option<bool>,
    call_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
