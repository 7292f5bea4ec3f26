//! Retrieval-backed claims compliance gate.
//!
//! The verdict is computed here from similarity scores alone; no model is
//! involved in deciding whether a text may be released.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::claims::{ClaimRecord, ClaimType, ClaimsValidationResult};

pub const DEFAULT_TOP_K: usize = 25;
pub const DEFAULT_CLAIMS_THRESHOLD: f64 = 0.75;
pub const DEFAULT_RETRIEVAL_TIMEOUT: Duration = Duration::from_secs(10);

pub const REWRITE_SUGGESTIONS: [&str; 3] = [
    "Remove or rephrase every claim listed as forbidden",
    "Use only the wording of claims listed as allowed for the relevant nutrient",
    "Keep the same helpful and professional tone",
];

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("claim retrieval backend unavailable: {0}")]
    Unavailable(String),
    #[error("claim retrieval backend misconfigured: {0}")]
    Misconfigured(String),
    #[error("claim retrieval timed out after {0:?}")]
    Timeout(Duration),
}

/// Similarity search over the claims index, results sorted by descending score.
#[async_trait]
pub trait ClaimRetriever: Send + Sync {
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ClaimRecord>, RetrievalError>;
}

#[async_trait]
impl<T> ClaimRetriever for Arc<T>
where
    T: ClaimRetriever + ?Sized,
{
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ClaimRecord>, RetrievalError> {
        (**self).query(text, top_k).await
    }
}

/// Anything that can turn a candidate text into a verdict without failing.
#[async_trait]
pub trait ComplianceCheck: Send + Sync {
    async fn evaluate(&self, candidate_text: &str, threshold: f64) -> ClaimsValidationResult;
}

pub struct ComplianceEvaluator<R> {
    retriever: R,
    top_k: usize,
    timeout: Duration,
}

impl<R> ComplianceEvaluator<R>
where
    R: ClaimRetriever,
{
    pub fn new(retriever: R) -> Self {
        Self { retriever, top_k: DEFAULT_TOP_K, timeout: DEFAULT_RETRIEVAL_TIMEOUT }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<R> ComplianceCheck for ComplianceEvaluator<R>
where
    R: ClaimRetriever,
{
    async fn evaluate(&self, candidate_text: &str, threshold: f64) -> ClaimsValidationResult {
        if candidate_text.trim().is_empty() {
            return ClaimsValidationResult::vacuous();
        }

        let records =
            match tokio::time::timeout(self.timeout, self.retriever.query(candidate_text, self.top_k))
                .await
            {
                Ok(Ok(records)) => records,
                Ok(Err(error)) => return degraded(error),
                Err(_) => return degraded(RetrievalError::Timeout(self.timeout)),
            };

        let verdict = classify_claims(&records, threshold);
        debug!(
            event_name = "core.compliance.evaluated",
            retrieved = records.len(),
            violated = verdict.violated_claims.len(),
            compliance_score = verdict.compliance_score,
            "claims evaluated"
        );
        verdict
    }
}

fn degraded(error: RetrievalError) -> ClaimsValidationResult {
    warn!(
        event_name = "core.compliance.degraded",
        error = %error,
        "claims retrieval failed, compliance check skipped"
    );
    ClaimsValidationResult::skipped()
}

/// Pure verdict over retrieved records. `general` matches count towards the
/// retained total but never decide pass/fail.
pub fn classify_claims(records: &[ClaimRecord], threshold: f64) -> ClaimsValidationResult {
    let significant: Vec<&ClaimRecord> =
        records.iter().filter(|record| record.similarity_score >= threshold).collect();

    if significant.is_empty() {
        return ClaimsValidationResult::vacuous();
    }

    let forbidden_count =
        significant.iter().filter(|record| record.claim_type == ClaimType::Forbidden).count();
    let violated_claims = unique_claims(&significant, ClaimType::Forbidden);
    let allowed_claims = unique_claims(&significant, ClaimType::Allowed);

    let retained = significant.len();
    let compliance_score = (retained - forbidden_count) as f64 / retained as f64;
    let suggestions = if forbidden_count > 0 {
        REWRITE_SUGGESTIONS.iter().map(|suggestion| suggestion.to_string()).collect()
    } else {
        Vec::new()
    };

    ClaimsValidationResult {
        is_compliant: forbidden_count == 0,
        violated_claims,
        allowed_claims,
        suggestions,
        compliance_score,
        degraded: false,
    }
}

fn unique_claims(records: &[&ClaimRecord], claim_type: ClaimType) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| record.claim_type == claim_type)
        .filter(|record| seen.insert(record.claim_text.as_str()))
        .map(|record| record.claim_text.clone())
        .collect()
}

/// Deterministic retriever for tests and offline runs.
///
/// Rules are checked in insertion order; the first rule whose phrase occurs in
/// the query text (case-insensitive) supplies the records.
#[derive(Default)]
pub struct StaticClaimRetriever {
    rules: Vec<(String, Vec<ClaimRecord>)>,
    fallback: Vec<ClaimRecord>,
    unavailable: bool,
    calls: AtomicUsize,
}

impl StaticClaimRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self { unavailable: true, ..Self::default() }
    }

    pub fn always(records: Vec<ClaimRecord>) -> Self {
        Self { fallback: records, ..Self::default() }
    }

    pub fn when_contains(mut self, phrase: impl Into<String>, records: Vec<ClaimRecord>) -> Self {
        self.rules.push((phrase.into().to_lowercase(), records));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ClaimRetriever for StaticClaimRetriever {
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ClaimRecord>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.unavailable {
            return Err(RetrievalError::Unavailable("static retriever marked unavailable".into()));
        }

        let lowered = text.to_lowercase();
        let mut records = self
            .rules
            .iter()
            .find(|(phrase, _)| lowered.contains(phrase.as_str()))
            .map(|(_, records)| records.clone())
            .unwrap_or_else(|| self.fallback.clone());

        records.sort_by(|left, right| right.similarity_score.total_cmp(&left.similarity_score));
        records.truncate(top_k);
        Ok(records)
    }
}
