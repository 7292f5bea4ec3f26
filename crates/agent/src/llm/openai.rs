//! Client for OpenAI-compatible `/chat/completions` and `/embeddings`
//! endpoints (OpenAI itself, or Ollama's `/v1` surface).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use soof_core::config::LlmConfig;
use soof_core::domain::message::{Message, Role, ToolCall};
use tracing::{debug, warn};

use crate::llm::{LlmClient, LlmError, ModelRequest};

#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        model: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LlmError::Configuration(format!("failed to build http client: {error}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            max_retries,
        })
    }

    pub fn from_config(config: &LlmConfig, base_url: impl Into<String>) -> Result<Self, LlmError> {
        Self::new(
            base_url,
            config.api_key.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embeds `input` with `model` and returns the first vector.
    pub async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, LlmError> {
        let body = EmbeddingRequest { model, input };
        let response: EmbeddingResponse = self.post_json("embeddings", &body).await?;
        response
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or(LlmError::EmptyResponse)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{path}", self.base_url);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut request = self.client.post(&url).json(body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key.expose_secret());
            }

            let (retryable, error) = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<R>()
                            .await
                            .map_err(|error| LlmError::Decode(error.to_string()));
                    }
                    let body = response.text().await.unwrap_or_default();
                    (retryable_status(status), LlmError::Status { status: status.as_u16(), body })
                }
                Err(error) => (true, LlmError::Transport(error.to_string())),
            };

            if !retryable || attempt > self.max_retries {
                return Err(error);
            }
            warn!(
                event_name = "agent.llm.retry",
                attempt,
                error = %error,
                "model request failed, retrying"
            );
            tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
        }
    }
}

fn retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn invoke(&self, request: ModelRequest) -> Result<Message, LlmError> {
        let body = ChatRequest::from_model_request(&self.model, &request);
        debug!(
            event_name = "agent.llm.request",
            model = %self.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map(Vec::len).unwrap_or(0),
            structured = body.response_format.is_some(),
            "invoking model"
        );

        let response: ChatResponse = self.post_json("chat/completions", &body).await?;
        let choice = response.choices.into_iter().next().ok_or(LlmError::EmptyResponse)?;
        Ok(choice.message.into_message())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

impl<'a> ChatRequest<'a> {
    fn from_model_request(model: &'a str, request: &ModelRequest) -> Self {
        let tools = (!request.tools.is_empty()).then(|| {
            request
                .tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect()
        });
        let response_format = request.output_schema.as_ref().map(|schema| {
            serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": schema.name, "schema": schema.schema, "strict": true }
            })
        });

        Self {
            model,
            messages: request.messages.iter().map(WireMessage::from_message).collect(),
            tools,
            response_format,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl WireMessage {
    fn from_message(message: &Message) -> Self {
        let tool_calls = message.has_tool_calls().then(|| {
            message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: WireCallFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect()
        });

        Self {
            role: message.role.as_str().to_string(),
            content: Some(message.content.clone()),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
            name: (message.role == Role::Tool).then(|| message.name.clone()).flatten(),
        }
    }

    fn into_message(self) -> Message {
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::String(call.function.arguments)),
            })
            .collect();

        Message::assistant_with_tool_calls(self.content.unwrap_or_default(), tool_calls)
    }
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireCallFunction,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize)]
struct WireCallFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use soof_core::domain::message::{Message, ToolCall};

    use super::{ChatRequest, ChatResponse};
    use crate::llm::{ModelRequest, OutputSchema, ToolSpec};

    #[test]
    fn request_carries_tools_and_schema() {
        let request = ModelRequest::new(vec![
            Message::system("base"),
            Message::assistant_with_tool_calls(
                "",
                vec![ToolCall {
                    id: "call-1".into(),
                    name: "product_info".into(),
                    arguments: json!({ "search_query": "omega 3" }),
                }],
            ),
            Message::tool_result("call-1", "product_info", "{}"),
        ])
        .with_tools(vec![ToolSpec {
            name: "product_info".into(),
            description: "catalog".into(),
            parameters: json!({ "type": "object" }),
        }])
        .with_output_schema(OutputSchema { name: "probe".into(), schema: json!({}) });

        let wire = serde_json::to_value(ChatRequest::from_model_request("gpt-4o-mini", &request))
            .expect("serialize request");

        assert_eq!(wire["model"], "gpt-4o-mini");
        assert_eq!(wire["tools"][0]["type"], "function");
        assert_eq!(wire["response_format"]["type"], "json_schema");
        assert_eq!(wire["messages"][1]["tool_calls"][0]["function"]["name"], "product_info");
        assert_eq!(
            wire["messages"][1]["tool_calls"][0]["function"]["arguments"],
            Value::String(r#"{"search_query":"omega 3"}"#.into())
        );
        assert_eq!(wire["messages"][2]["tool_call_id"], "call-1");
        assert_eq!(wire["messages"][2]["name"], "product_info");
        assert!(wire["messages"][0].get("tool_calls").is_none());
    }

    #[test]
    fn response_tool_calls_are_decoded() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call-9",
                        "type": "function",
                        "function": { "name": "handoff", "arguments": "{}" }
                    }]
                }
            }]
        }))
        .expect("decode response");

        let message = response.choices.into_iter().next().expect("choice").message.into_message();
        assert!(message.has_tool_calls());
        assert_eq!(message.content, "");
        assert_eq!(message.tool_calls[0].arguments, json!({}));
    }
}
