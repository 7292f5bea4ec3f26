use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compliance::DEFAULT_CLAIMS_THRESHOLD;
use crate::context::DEFAULT_WINDOW_SIZE;

pub const DEFAULT_MAX_REGENERATION_ATTEMPTS: u32 = 3;

/// Per-turn knobs. Immutable for the duration of one turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub claims_validation_threshold: f64,
    pub max_regeneration_attempts: u32,
    pub context_window_size: usize,
    #[serde(default)]
    pub shop_domain: Option<String>,
    #[serde(default)]
    pub passthrough_rewrite: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            claims_validation_threshold: DEFAULT_CLAIMS_THRESHOLD,
            max_regeneration_attempts: DEFAULT_MAX_REGENERATION_ATTEMPTS,
            context_window_size: DEFAULT_WINDOW_SIZE,
            shop_domain: None,
            passthrough_rewrite: false,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum RoutingConfigError {
    #[error("claims_validation_threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),
    #[error("max_regeneration_attempts must be at least 1")]
    NoRegenerationAttempts,
    #[error("context_window_size must be at least 1")]
    EmptyContextWindow,
    #[error("shop_domain must not be blank when provided")]
    BlankShopDomain,
}

impl RoutingConfig {
    pub fn with_shop_domain(mut self, domain: impl Into<String>) -> Self {
        self.shop_domain = Some(domain.into());
        self
    }

    pub fn validate(&self) -> Result<(), RoutingConfigError> {
        let threshold = self.claims_validation_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(RoutingConfigError::ThresholdOutOfRange(threshold));
        }
        if self.max_regeneration_attempts == 0 {
            return Err(RoutingConfigError::NoRegenerationAttempts);
        }
        if self.context_window_size == 0 {
            return Err(RoutingConfigError::EmptyContextWindow);
        }
        if self.shop_domain.as_deref().is_some_and(|domain| domain.trim().is_empty()) {
            return Err(RoutingConfigError::BlankShopDomain);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{RoutingConfig, RoutingConfigError};

    #[test]
    fn defaults_are_valid() {
        let config = RoutingConfig::default();
        assert_eq!(config.claims_validation_threshold, 0.75);
        assert_eq!(config.max_regeneration_attempts, 3);
        assert_eq!(config.context_window_size, 10);
        assert!(!config.passthrough_rewrite);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let nan = RoutingConfig { claims_validation_threshold: f64::NAN, ..RoutingConfig::default() };
        assert!(matches!(nan.validate(), Err(RoutingConfigError::ThresholdOutOfRange(_))));

        let zero_attempts = RoutingConfig { max_regeneration_attempts: 0, ..RoutingConfig::default() };
        assert_eq!(zero_attempts.validate(), Err(RoutingConfigError::NoRegenerationAttempts));

        let zero_window = RoutingConfig { context_window_size: 0, ..RoutingConfig::default() };
        assert_eq!(zero_window.validate(), Err(RoutingConfigError::EmptyContextWindow));

        let blank = RoutingConfig::default().with_shop_domain("  ");
        assert_eq!(blank.validate(), Err(RoutingConfigError::BlankShopDomain));
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let config: RoutingConfig = serde_json::from_str(
            r#"{"claims_validation_threshold":0.8,"max_regeneration_attempts":2,"context_window_size":6}"#,
        )
        .expect("routing config");
        assert_eq!(config.shop_domain, None);
        assert!(!config.passthrough_rewrite);
    }
}
