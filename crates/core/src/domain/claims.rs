use serde::{Deserialize, Serialize};

/// Regulatory classification of a health or nutrition claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Allowed,
    Forbidden,
    General,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Forbidden => "forbidden",
            Self::General => "general",
        }
    }

    /// Unknown labels are informational, never violations.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "allowed" => Self::Allowed,
            "forbidden" => Self::Forbidden,
            _ => Self::General,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub claim_text: String,
    pub claim_type: ClaimType,
    pub nutrient_or_topic: String,
    pub scope: String,
    pub similarity_score: f64,
}

impl ClaimRecord {
    pub fn new(claim_text: impl Into<String>, claim_type: ClaimType, similarity_score: f64) -> Self {
        Self {
            claim_text: claim_text.into(),
            claim_type,
            nutrient_or_topic: String::new(),
            scope: String::new(),
            similarity_score,
        }
    }

    pub fn with_topic(mut self, nutrient_or_topic: impl Into<String>) -> Self {
        self.nutrient_or_topic = nutrient_or_topic.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimsValidationResult {
    pub is_compliant: bool,
    pub violated_claims: Vec<String>,
    pub allowed_claims: Vec<String>,
    pub suggestions: Vec<String>,
    pub compliance_score: f64,
    /// Set when the retrieval backend could not be consulted and the gate was skipped.
    #[serde(default)]
    pub degraded: bool,
}

impl ClaimsValidationResult {
    /// Verdict for text with no significant claim matches.
    pub fn vacuous() -> Self {
        Self {
            is_compliant: true,
            violated_claims: Vec::new(),
            allowed_claims: Vec::new(),
            suggestions: Vec::new(),
            compliance_score: 1.0,
            degraded: false,
        }
    }

    pub fn skipped() -> Self {
        Self { degraded: true, ..Self::vacuous() }
    }
}
