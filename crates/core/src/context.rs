//! Context window assembly for model calls.
//!
//! Output order is fixed: base system prompt (when configured), then the
//! caller's task-specific system messages, then the rolling window over the
//! deduplicated history, oldest first. Assembly is pure.

use serde_json::Value;

use crate::domain::message::{Message, Role};
use crate::history::dedup_consecutive;

pub const DEFAULT_WINDOW_SIZE: usize = 10;

#[derive(Clone, Debug, PartialEq)]
pub struct ContextWindowBuilder {
    base_system_prompt: Option<String>,
    window_size: usize,
}

impl Default for ContextWindowBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl ContextWindowBuilder {
    pub fn new(window_size: usize) -> Self {
        Self { base_system_prompt: None, window_size }
    }

    pub fn with_base_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.base_system_prompt = Some(prompt.into());
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn build(&self, history: &[Message], injected_system_messages: &[Message]) -> Vec<Message> {
        let base = self.base_system_prompt.as_ref().map(Message::system);
        build_context(base.as_ref(), history, injected_system_messages, self.window_size)
    }
}

pub fn build_context(
    base_system_message: Option<&Message>,
    history: &[Message],
    injected_system_messages: &[Message],
    window_size: usize,
) -> Vec<Message> {
    let window = rolling_window(history, window_size);

    let mut context =
        Vec::with_capacity(usize::from(base_system_message.is_some()) + injected_system_messages.len() + window.len());
    context.extend(base_system_message.cloned());
    context.extend(injected_system_messages.iter().cloned());
    context.extend(window);
    context
}

/// Last `window_size` deduplicated messages, never starting on a tool result.
pub fn rolling_window(history: &[Message], window_size: usize) -> Vec<Message> {
    let deduped = dedup_consecutive(history);
    let start = deduped.len().saturating_sub(window_size);

    deduped
        .into_iter()
        .skip(start)
        .skip_while(|message| message.role == Role::Tool)
        .map(strip_tool_metadata)
        .collect()
}

/// Removes the top-level `metadata` key from JSON tool payloads.
pub fn strip_tool_metadata(message: Message) -> Message {
    if message.role != Role::Tool {
        return message;
    }

    let Ok(Value::Object(mut payload)) = serde_json::from_str::<Value>(&message.content) else {
        return message;
    };
    if payload.remove("metadata").is_none() {
        return message;
    }

    match serde_json::to_string(&Value::Object(payload)) {
        Ok(content) => Message { content, ..message },
        Err(_) => message,
    }
}
