use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::{Tool, ToolContext, ToolError};

pub const HANDOFF_CONFIRMATION: &str =
    "Your chat has been forwarded to the support team. Please wait for a response.";

/// Forwards the chat to human support.
#[derive(Clone, Copy, Debug, Default)]
pub struct HandoffTool;

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &'static str {
        "handoff"
    }

    fn description(&self) -> &'static str {
        "Forward the chat to the support team."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: Value, _context: &ToolContext) -> Result<Value, ToolError> {
        Ok(Value::String(HANDOFF_CONFIRMATION.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{HandoffTool, HANDOFF_CONFIRMATION};
    use crate::tools::{Tool, ToolContext};

    #[tokio::test]
    async fn confirms_forwarding_without_compliance() {
        let result = HandoffTool.execute(json!({}), &ToolContext::default()).await.expect("handoff");

        assert_eq!(result, Value::String(HANDOFF_CONFIRMATION.to_string()));
        assert!(!HandoffTool.requires_compliance());
    }
}
