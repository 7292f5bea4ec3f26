use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use soof_core::domain::message::Message;
use thiserror::Error;

pub mod openai;
pub mod scripted;

pub use openai::OpenAiCompatibleClient;
pub use scripted::ScriptedLlmClient;

/// Function tool advertised to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// JSON schema the reply content must satisfy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub output_schema: Option<OutputSchema>,
}

impl ModelRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages, ..Self::default() }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model request failed: {0}")]
    Transport(String),
    #[error("model endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model response could not be decoded: {0}")]
    Decode(String),
    #[error("model returned no choices")]
    EmptyResponse,
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("structured output did not match `{schema}`: {reason}")]
    Schema { schema: String, reason: String },
    #[error("model client misconfigured: {0}")]
    Configuration(String),
}

/// Chat-completion style model adapter. The reply is an assistant message that
/// may carry tool calls when tools were bound.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(&self, request: ModelRequest) -> Result<Message, LlmError>;
}

#[async_trait]
impl<T> LlmClient for std::sync::Arc<T>
where
    T: LlmClient + ?Sized,
{
    async fn invoke(&self, request: ModelRequest) -> Result<Message, LlmError> {
        (**self).invoke(request).await
    }
}

/// Invokes the model under a deadline.
pub async fn invoke_with_timeout(
    client: &dyn LlmClient,
    request: ModelRequest,
    timeout: Duration,
) -> Result<Message, LlmError> {
    tokio::time::timeout(timeout, client.invoke(request))
        .await
        .map_err(|_| LlmError::Timeout(timeout))?
}

/// Requests schema-constrained output and parses the reply into `T`.
pub async fn invoke_structured<T>(
    client: &dyn LlmClient,
    messages: Vec<Message>,
    schema: OutputSchema,
    timeout: Duration,
) -> Result<T, LlmError>
where
    T: DeserializeOwned,
{
    let schema_name = schema.name.clone();
    let reply =
        invoke_with_timeout(client, ModelRequest::new(messages).with_output_schema(schema), timeout)
            .await?;
    parse_structured(&schema_name, &reply.content)
}

pub fn parse_structured<T>(schema_name: &str, content: &str) -> Result<T, LlmError>
where
    T: DeserializeOwned,
{
    let trimmed = strip_code_fence(content.trim());
    serde_json::from_str(trimmed).map_err(|error| LlmError::Schema {
        schema: schema_name.to_string(),
        reason: error.to_string(),
    })
}

fn strip_code_fence(content: &str) -> &str {
    content
        .strip_prefix("```json")
        .or_else(|| content.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(content)
}
