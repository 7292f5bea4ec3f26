use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ProductInfo,
    Recommendation,
    OrderLookup,
    Handoff,
    GeneralChat,
}

impl Intent {
    pub const ALL: [Intent; 5] =
        [Self::ProductInfo, Self::Recommendation, Self::OrderLookup, Self::Handoff, Self::GeneralChat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductInfo => "product_info",
            Self::Recommendation => "recommendation",
            Self::OrderLookup => "order_lookup",
            Self::Handoff => "handoff",
            Self::GeneralChat => "general_chat",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f64,
    pub reasoning: String,
}

impl IntentClassification {
    pub fn fallback() -> Self {
        Self { intent: Intent::GeneralChat, confidence: 0.0, reasoning: "fallback".to_string() }
    }

    pub fn routing_reason(&self) -> String {
        format!("{} (Confidence: {:.1}%)", self.reasoning, self.confidence * 100.0)
    }
}
