//! Claim retrieval against a Pinecone index queried over its REST API.
//! Query text is embedded through the OpenAI-compatible `/embeddings` route.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use soof_core::compliance::{ClaimRetriever, RetrievalError};
use soof_core::config::RetrievalConfig;
use soof_core::domain::claims::{ClaimRecord, ClaimType};
use tracing::debug;

use crate::llm::OpenAiCompatibleClient;

#[derive(Clone)]
pub struct PineconeClaimRetriever {
    http: Client,
    index_host: Option<String>,
    api_key: Option<SecretString>,
    namespace: Option<String>,
    embedder: Arc<OpenAiCompatibleClient>,
    embedding_model: String,
}

impl PineconeClaimRetriever {
    /// Missing host or key is reported per query as
    /// [`RetrievalError::Misconfigured`], so the gate degrades instead of the
    /// process refusing to start.
    pub fn from_config(
        config: &RetrievalConfig,
        embedder: Arc<OpenAiCompatibleClient>,
    ) -> Result<Self, RetrievalError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| RetrievalError::Misconfigured(format!("http client: {error}")))?;

        Ok(Self {
            http,
            index_host: config.index_host.clone(),
            api_key: config.api_key.clone(),
            namespace: config.namespace.clone(),
            embedder,
            embedding_model: config.embedding_model.clone(),
        })
    }

    fn query_url(&self) -> Result<String, RetrievalError> {
        let host = self
            .index_host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .ok_or_else(|| RetrievalError::Misconfigured("retrieval.index_host is not set".into()))?;
        Ok(index_query_url(host))
    }
}

pub fn index_query_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}/query")
    } else {
        format!("https://{host}/query")
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: Vec<f32>,
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub matches: Vec<QueryMatch>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryMatch {
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl QueryMatch {
    pub fn into_record(self) -> ClaimRecord {
        let metadata = self.metadata.unwrap_or_default();
        let text = |key: &str| metadata.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

        let mut record = ClaimRecord::new(
            text("claim"),
            ClaimType::parse_lenient(&text("claimType")),
            self.score.unwrap_or_default().clamp(0.0, 1.0),
        )
        .with_topic(text("nutrient"));
        record.scope = text("scope");
        record
    }
}

/// Records in descending score order, truncated to `top_k`.
pub fn records_from_response(response: QueryResponse, top_k: usize) -> Vec<ClaimRecord> {
    let mut records: Vec<ClaimRecord> =
        response.matches.into_iter().map(QueryMatch::into_record).collect();
    records.sort_by(|left, right| right.similarity_score.total_cmp(&left.similarity_score));
    records.truncate(top_k);
    records
}

#[async_trait]
impl ClaimRetriever for PineconeClaimRetriever {
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<ClaimRecord>, RetrievalError> {
        let url = self.query_url()?;
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| RetrievalError::Misconfigured("retrieval.api_key is not set".into()))?;

        let vector = self
            .embedder
            .embed(&self.embedding_model, text)
            .await
            .map_err(|error| RetrievalError::Unavailable(format!("embedding failed: {error}")))?;

        let body = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace: self.namespace.as_deref(),
        };
        let response = self
            .http
            .post(url)
            .header("Api-Key", api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| RetrievalError::Unavailable(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Unavailable(format!("index returned {status}: {detail}")));
        }

        let decoded: QueryResponse = response
            .json()
            .await
            .map_err(|error| RetrievalError::Unavailable(format!("undecodable index reply: {error}")))?;
        let records = records_from_response(decoded, top_k);
        debug!(event_name = "agent.retrieval.queried", matches = records.len(), "claims retrieved");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use soof_core::compliance::{ClaimRetriever, RetrievalError};
    use soof_core::config::AppConfig;
    use soof_core::domain::claims::ClaimType;

    use super::{index_query_url, records_from_response, PineconeClaimRetriever, QueryResponse};
    use crate::llm::OpenAiCompatibleClient;

    #[test]
    fn matches_map_claim_metadata() {
        let response: QueryResponse = serde_json::from_value(json!({
            "matches": [
                { "id": "a", "score": 0.62, "metadata": { "claim": "draagt bij aan energie", "claimType": "allowed", "nutrient": "vitamine B12" } },
                { "id": "b", "score": 0.91, "metadata": { "claim": "geneest kanker", "claimType": "Forbidden", "nutrient": "curcuma", "scope": "EU" } },
                { "id": "c", "metadata": { "claimType": "unknown" } }
            ]
        }))
        .expect("decode response");

        let records = records_from_response(response, 2);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].claim_text, "geneest kanker");
        assert_eq!(records[0].claim_type, ClaimType::Forbidden);
        assert_eq!(records[0].nutrient_or_topic, "curcuma");
        assert_eq!(records[0].scope, "EU");
        assert_eq!(records[1].claim_type, ClaimType::Allowed);
    }

    #[test]
    fn bare_hosts_get_https_scheme() {
        assert_eq!(index_query_url("claims-abc.svc.pinecone.io"), "https://claims-abc.svc.pinecone.io/query");
        assert_eq!(index_query_url("http://localhost:5080/"), "http://localhost:5080/query");
    }

    #[tokio::test]
    async fn missing_index_host_is_misconfigured() {
        let embedder = OpenAiCompatibleClient::new("http://localhost:1/v1", None, "m", Duration::from_secs(1), 0)
            .expect("client");
        let retriever =
            PineconeClaimRetriever::from_config(&AppConfig::default().retrieval, Arc::new(embedder)).expect("retriever");

        let result = retriever.query("foliumzuur", 25).await;

        assert!(matches!(result, Err(RetrievalError::Misconfigured(_))));
    }
}
