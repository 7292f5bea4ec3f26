use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use soof_core::domain::message::{Message, ToolCall};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::ToolSpec;

pub mod handoff;
pub mod product_info;

pub use handoff::HandoffTool;
pub use product_info::ProductInfoTool;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),
    #[error("tool misconfigured: {0}")]
    Configuration(String),
    #[error("upstream call failed: {0}")]
    Upstream(String),
    #[error("tool call timed out after {0:?}")]
    Timeout(Duration),
}

/// Per-turn data a tool may read besides its arguments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolContext {
    pub shop_domain: Option<String>,
    pub latest_user_text: String,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> Value;

    /// Drafts produced after this tool ran must pass the compliance gate.
    fn requires_compliance(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<Value, ToolError>;
}

/// Result of one executed tool call, ready to append to the conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolExecution {
    pub message: Message,
    pub requires_compliance: bool,
    pub failed: bool,
}

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
    timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self { tools: BTreeMap::new(), timeout: DEFAULT_TOOL_TIMEOUT }
    }
}

impl ToolRegistry {
    /// Deadline applied to every tool call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn with_tool<T>(mut self, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        self.register(tool);
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Runs one call. Failures become an `{"error": ...}` payload in the tool
    /// message; this never returns an error to the caller.
    pub async fn execute(&self, call: &ToolCall, context: &ToolContext) -> ToolExecution {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(
                event_name = "agent.tools.failed",
                tool = %call.name,
                tool_call_id = %call.id,
                reason = "unknown_tool",
                "model requested an unregistered tool"
            );
            return ToolExecution {
                message: error_message(call, &format!("unknown tool `{}`", call.name)),
                requires_compliance: false,
                failed: true,
            };
        };

        let requires_compliance = tool.requires_compliance();
        let result = match tokio::time::timeout(self.timeout, tool.execute(call.arguments.clone(), context)).await
        {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout(self.timeout)),
        };
        match result {
            Ok(payload) => {
                debug!(
                    event_name = "agent.tools.executed",
                    tool = %call.name,
                    tool_call_id = %call.id,
                    "tool call succeeded"
                );
                ToolExecution {
                    message: Message::tool_result(call.id.clone(), call.name.clone(), payload.to_string()),
                    requires_compliance,
                    failed: false,
                }
            }
            Err(error) => {
                warn!(
                    event_name = "agent.tools.failed",
                    tool = %call.name,
                    tool_call_id = %call.id,
                    error = %error,
                    "tool call failed"
                );
                ToolExecution { message: error_message(call, &error.to_string()), requires_compliance, failed: true }
            }
        }
    }
}

fn error_message(call: &ToolCall, reason: &str) -> Message {
    Message::tool_result(call.id.clone(), call.name.clone(), json!({ "error": reason }).to_string())
}
