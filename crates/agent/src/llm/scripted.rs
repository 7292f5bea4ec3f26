use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use soof_core::domain::message::{Message, ToolCall};

use crate::llm::{LlmClient, LlmError, ModelRequest};

#[derive(Clone, Debug)]
enum ScriptedReply {
    Message(Message),
    Failure(String),
    Stall(Duration),
}

/// Replays queued replies in order and records every request it receives.
/// An exhausted script answers with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, message: Message) -> Self {
        self.push(ScriptedReply::Message(message))
    }

    pub fn reply_text(self, content: impl Into<String>) -> Self {
        self.reply(Message::assistant(content))
    }

    pub fn reply_json(self, value: Value) -> Self {
        self.reply(Message::assistant(value.to_string()))
    }

    pub fn reply_tool_call(self, id: &str, name: &str, arguments: Value) -> Self {
        self.reply(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall { id: id.to_string(), name: name.to_string(), arguments }],
        ))
    }

    pub fn fail(self, reason: impl Into<String>) -> Self {
        self.push(ScriptedReply::Failure(reason.into()))
    }

    pub fn stall(self, duration: Duration) -> Self {
        self.push(ScriptedReply::Stall(duration))
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn remaining(&self) -> usize {
        match self.replies.lock() {
            Ok(replies) => replies.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn push(self, reply: ScriptedReply) -> Self {
        match self.replies.lock() {
            Ok(mut replies) => replies.push_back(reply),
            Err(poisoned) => poisoned.into_inner().push_back(reply),
        }
        self
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        match self.replies.lock() {
            Ok(mut replies) => replies.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn invoke(&self, request: ModelRequest) -> Result<Message, LlmError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }

        match self.next_reply() {
            Some(ScriptedReply::Message(message)) => Ok(message),
            Some(ScriptedReply::Failure(reason)) => Err(LlmError::Transport(reason)),
            Some(ScriptedReply::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Err(LlmError::Timeout(duration))
            }
            None => Err(LlmError::Transport("scripted replies exhausted".to_string())),
        }
    }
}
