use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::claims::ClaimsValidationResult;
use crate::domain::intent::IntentClassification;
use crate::domain::message::Message;
use crate::domain::thread::ThreadId;

/// Out-of-band evidence stored next to the turn's messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnAudit {
    pub intent: IntentClassification,
    pub routing_reason: String,
    pub claims_validation: Option<ClaimsValidationResult>,
    pub original_response: Option<String>,
    pub regeneration_attempts: u32,
    pub compliance_exhausted: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub thread_id: ThreadId,
    pub messages: Vec<Message>,
    pub audit: TurnAudit,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("thread store unavailable: {0}")]
    Unavailable(String),
    #[error("stored thread data is corrupt: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Full persisted history, oldest first. Unknown threads are empty.
    async fn load_history(&self, thread_id: &ThreadId) -> Result<Vec<Message>, StoreError>;
    async fn append_turn(&self, record: &TurnRecord) -> Result<(), StoreError>;
}

#[async_trait]
impl<T> ThreadStore for Arc<T>
where
    T: ThreadStore + ?Sized,
{
    async fn load_history(&self, thread_id: &ThreadId) -> Result<Vec<Message>, StoreError> {
        (**self).load_history(thread_id).await
    }

    async fn append_turn(&self, record: &TurnRecord) -> Result<(), StoreError> {
        (**self).append_turn(record).await
    }
}

#[derive(Clone, Default)]
pub struct InMemoryThreadStore {
    threads: Arc<Mutex<HashMap<ThreadId, Vec<Message>>>>,
    audits: Arc<Mutex<Vec<TurnAudit>>>,
}

impl InMemoryThreadStore {
    pub fn with_thread(self, thread_id: ThreadId, messages: Vec<Message>) -> Self {
        match self.threads.lock() {
            Ok(mut threads) => threads.insert(thread_id, messages),
            Err(poisoned) => poisoned.into_inner().insert(thread_id, messages),
        };
        self
    }

    pub fn messages(&self, thread_id: &ThreadId) -> Vec<Message> {
        let read = |threads: &HashMap<ThreadId, Vec<Message>>| {
            threads.get(thread_id).cloned().unwrap_or_default()
        };
        match self.threads.lock() {
            Ok(threads) => read(&*threads),
            Err(poisoned) => read(&*poisoned.into_inner()),
        }
    }

    pub fn audits(&self) -> Vec<TurnAudit> {
        match self.audits.lock() {
            Ok(audits) => audits.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn load_history(&self, thread_id: &ThreadId) -> Result<Vec<Message>, StoreError> {
        Ok(self.messages(thread_id))
    }

    async fn append_turn(&self, record: &TurnRecord) -> Result<(), StoreError> {
        let mut threads = self
            .threads
            .lock()
            .map_err(|_| StoreError::Unavailable("thread map lock poisoned".to_owned()))?;
        threads.entry(record.thread_id.clone()).or_default().extend(record.messages.iter().cloned());
        drop(threads);

        let mut audits = self
            .audits
            .lock()
            .map_err(|_| StoreError::Unavailable("audit log lock poisoned".to_owned()))?;
        audits.push(record.audit.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryThreadStore, ThreadStore, TurnAudit, TurnRecord};
    use crate::domain::intent::IntentClassification;
    use crate::domain::message::Message;
    use crate::domain::thread::ThreadId;

    fn record(thread: &str, messages: Vec<Message>) -> TurnRecord {
        TurnRecord {
            thread_id: ThreadId::new(thread),
            messages,
            audit: TurnAudit {
                intent: IntentClassification::fallback(),
                routing_reason: "fallback (Confidence: 0.0%)".into(),
                claims_validation: None,
                original_response: None,
                regeneration_attempts: 0,
                compliance_exhausted: false,
            },
        }
    }

    #[tokio::test]
    async fn unknown_thread_has_empty_history() {
        let store = InMemoryThreadStore::default();
        let history = store.load_history(&ThreadId::new("nope")).await.expect("load");
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn turns_append_in_order_per_thread() {
        let store = InMemoryThreadStore::default()
            .with_thread(ThreadId::new("a"), vec![Message::user("eerste")]);

        store
            .append_turn(&record("a", vec![Message::user("tweede"), Message::assistant("antwoord")]))
            .await
            .expect("append");
        store.append_turn(&record("b", vec![Message::user("ander")])).await.expect("append");

        let history = store.load_history(&ThreadId::new("a")).await.expect("load");
        let contents: Vec<&str> = history.iter().map(|message| message.content.as_str()).collect();
        assert_eq!(contents, vec!["eerste", "tweede", "antwoord"]);
        assert_eq!(store.audits().len(), 2);
    }
}
