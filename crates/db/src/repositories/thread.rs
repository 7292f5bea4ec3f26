use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use soof_core::domain::intent::{Intent, IntentClassification};
use soof_core::domain::message::{Message, Role, ToolCall};
use soof_core::domain::thread::ThreadId;
use soof_core::store::{StoreError, ThreadStore, TurnAudit, TurnRecord};

use super::RepositoryError;
use crate::DbPool;

/// SQLite thread store. Messages are kept in full; callers cap on load.
#[derive(Clone)]
pub struct SqlThreadStore {
    pool: DbPool,
}

impl SqlThreadStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn messages(&self, thread_id: &ThreadId) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role, content, tool_calls_json, tool_call_id, tool_name
             FROM thread_message WHERE thread_id = ? ORDER BY seq ASC",
        )
        .bind(thread_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    pub async fn audits(&self, thread_id: &ThreadId) -> Result<Vec<TurnAudit>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT intent, confidence, routing_reason, claims_validation_json, original_response,
                    regeneration_attempts, compliance_exhausted
             FROM turn_audit WHERE thread_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(thread_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_audit).collect()
    }

    pub async fn save_turn(&self, record: &TurnRecord) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO thread (id, created_at, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(record.thread_id.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let next_seq: i64 = sqlx::query(
            "SELECT COALESCE(MAX(seq), 0) + 1 AS next_seq FROM thread_message WHERE thread_id = ?",
        )
        .bind(record.thread_id.as_str())
        .fetch_one(&mut *tx)
        .await?
        .try_get("next_seq")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        for (offset, message) in record.messages.iter().enumerate() {
            let tool_calls_json = if message.tool_calls.is_empty() {
                None
            } else {
                Some(
                    serde_json::to_string(&message.tool_calls)
                        .map_err(|e| RepositoryError::Decode(e.to_string()))?,
                )
            };

            sqlx::query(
                "INSERT INTO thread_message (thread_id, seq, role, content, tool_calls_json,
                                             tool_call_id, tool_name, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(record.thread_id.as_str())
            .bind(next_seq + offset as i64)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(tool_calls_json)
            .bind(message.tool_call_id.as_deref())
            .bind(message.name.as_deref())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        let audit = &record.audit;
        let claims_validation_json = audit
            .claims_validation
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO turn_audit (id, thread_id, intent, confidence, routing_reason,
                                     claims_validation_json, original_response,
                                     regeneration_attempts, compliance_exhausted, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(record.thread_id.as_str())
        .bind(audit.intent.intent.as_str())
        .bind(audit.intent.confidence)
        .bind(&audit.routing_reason)
        .bind(claims_validation_json)
        .bind(audit.original_response.as_deref())
        .bind(i64::from(audit.regeneration_attempts))
        .bind(audit.compliance_exhausted)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RepositoryError> {
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content: String =
        row.try_get("content").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tool_calls_json: Option<String> =
        row.try_get("tool_calls_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tool_call_id: Option<String> =
        row.try_get("tool_call_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tool_name: Option<String> =
        row.try_get("tool_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let role = Role::parse(&role)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role}`")))?;
    let tool_calls: Vec<ToolCall> = match tool_calls_json {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| RepositoryError::Decode(e.to_string()))?,
        None => Vec::new(),
    };

    Ok(Message { role, content, tool_calls, tool_call_id, name: tool_name })
}

fn row_to_audit(row: &sqlx::sqlite::SqliteRow) -> Result<TurnAudit, RepositoryError> {
    let intent: String = row.try_get("intent").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let confidence: f64 =
        row.try_get("confidence").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let routing_reason: String =
        row.try_get("routing_reason").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let claims_validation_json: Option<String> =
        row.try_get("claims_validation_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let original_response: Option<String> =
        row.try_get("original_response").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let regeneration_attempts: i64 =
        row.try_get("regeneration_attempts").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let compliance_exhausted: bool =
        row.try_get("compliance_exhausted").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let intent_label = intent;
    let intent = Intent::ALL
        .into_iter()
        .find(|candidate| candidate.as_str() == intent_label)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown intent `{intent_label}`")))?;
    let claims_validation = claims_validation_json
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(TurnAudit {
        intent: IntentClassification { intent, confidence, reasoning: String::new() },
        routing_reason,
        claims_validation,
        original_response,
        regeneration_attempts: u32::try_from(regeneration_attempts).unwrap_or_default(),
        compliance_exhausted,
    })
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => Self::Unavailable(error.to_string()),
            RepositoryError::Decode(reason) => Self::Corrupt(reason),
        }
    }
}

#[async_trait]
impl ThreadStore for SqlThreadStore {
    async fn load_history(&self, thread_id: &ThreadId) -> Result<Vec<Message>, StoreError> {
        Ok(self.messages(thread_id).await?)
    }

    async fn append_turn(&self, record: &TurnRecord) -> Result<(), StoreError> {
        Ok(self.save_turn(record).await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use soof_core::domain::claims::ClaimsValidationResult;
    use soof_core::domain::intent::{Intent, IntentClassification};
    use soof_core::domain::message::{Message, Role, ToolCall};
    use soof_core::domain::thread::ThreadId;
    use soof_core::store::{ThreadStore, TurnAudit, TurnRecord};

    use super::SqlThreadStore;
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqlThreadStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlThreadStore::new(pool)
    }

    fn record(thread: &str, messages: Vec<Message>, validation: Option<ClaimsValidationResult>) -> TurnRecord {
        TurnRecord {
            thread_id: ThreadId::new(thread),
            messages,
            audit: TurnAudit {
                intent: IntentClassification {
                    intent: Intent::ProductInfo,
                    confidence: 0.9,
                    reasoning: "product question".into(),
                },
                routing_reason: "product question (Confidence: 90.0%)".into(),
                claims_validation: validation,
                original_response: Some("Het is 100% veilig!".into()),
                regeneration_attempts: 1,
                compliance_exhausted: false,
            },
        }
    }

    #[tokio::test]
    async fn unknown_thread_loads_empty_history() {
        let store = store().await;
        let history = store.load_history(&ThreadId::new("missing")).await.expect("load");
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn turns_round_trip_with_tool_messages_in_order() {
        let store = store().await;
        let tool_call = ToolCall {
            id: "call-1".into(),
            name: "product_info".into(),
            arguments: json!({ "search_query": "foliumzuur" }),
        };
        let first_turn = vec![
            Message::user("Is foliumzuur veilig?"),
            Message::assistant_with_tool_calls("", vec![tool_call.clone()]),
            Message::tool_result("call-1", "product_info", r#"{"product":{"title":"Foliumzuur"}}"#),
            Message::assistant("Foliumzuur draagt bij aan de groei van het weefsel van de moeder."),
        ];

        store
            .append_turn(&record("t-1", first_turn.clone(), Some(ClaimsValidationResult::vacuous())))
            .await
            .expect("append first");
        store
            .append_turn(&record("t-1", vec![Message::user("Dank je"), Message::assistant("Graag gedaan!")], None))
            .await
            .expect("append second");

        let history = store.load_history(&ThreadId::new("t-1")).await.expect("load");
        assert_eq!(history.len(), 6);
        assert_eq!(&history[..4], first_turn.as_slice());
        assert_eq!(history[1].tool_calls, vec![tool_call]);
        assert_eq!(history[2].role, Role::Tool);
        assert_eq!(history[5].content, "Graag gedaan!");
    }

    #[tokio::test]
    async fn audit_rows_keep_compliance_evidence() {
        let store = store().await;
        let validation = ClaimsValidationResult {
            is_compliant: false,
            violated_claims: vec!["veilig tijdens de zwangerschap".into()],
            allowed_claims: Vec::new(),
            suggestions: vec!["Remove the claim".into()],
            compliance_score: 0.0,
            degraded: false,
        };

        store
            .append_turn(&record("t-2", vec![Message::user("vraag")], Some(validation.clone())))
            .await
            .expect("append");

        let audits = store.audits(&ThreadId::new("t-2")).await.expect("audits");
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].intent.intent, Intent::ProductInfo);
        assert_eq!(audits[0].claims_validation.as_ref(), Some(&validation));
        assert_eq!(audits[0].original_response.as_deref(), Some("Het is 100% veilig!"));
        assert_eq!(audits[0].regeneration_attempts, 1);
    }
}
