//! Append-only conversation log.
//!
//! Every append runs the same reducer: a message identical to the current
//! tail (see [`Message::duplicates`]) is dropped, then the
//! log is trimmed from the front to the hard ceiling. Nothing else mutates
//! the log.

use serde::{Deserialize, Serialize};

use crate::domain::message::Message;

pub const DEFAULT_HISTORY_CAP: usize = 30;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct History {
    messages: Vec<Message>,
    cap: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_cap(DEFAULT_HISTORY_CAP)
    }
}

impl History {
    pub fn with_cap(cap: usize) -> Self {
        Self { messages: Vec::new(), cap: cap.max(1) }
    }

    /// Rebuilds a log from persisted messages, applying the reducer to each.
    pub fn from_messages(messages: impl IntoIterator<Item = Message>, cap: usize) -> Self {
        let mut history = Self::with_cap(cap);
        history.extend(messages);
        history
    }

    /// Returns `false` when the message was dropped as a consecutive duplicate.
    pub fn append(&mut self, message: Message) -> bool {
        if self.messages.last().is_some_and(|last| last.duplicates(&message)) {
            return false;
        }

        self.messages.push(message);
        if self.messages.len() > self.cap {
            let overflow = self.messages.len() - self.cap;
            self.messages.drain(..overflow);
        }
        true
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.append(message);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

/// Drops every message that duplicates its immediate predecessor.
pub fn dedup_consecutive(messages: &[Message]) -> Vec<Message> {
    let mut deduped: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages {
        if deduped.last().is_some_and(|last| last.duplicates(message)) {
            continue;
        }
        deduped.push(message.clone());
    }
    deduped
}
