use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use libdesk_core::conversation::{Message, MessageRole, SessionId, ToolCallRecord};

use super::{parse_rfc3339, ConversationRepository, RepositoryError};
use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRecord {
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let role = MessageRole::parse(&value.role).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid message role: {}", value.role))
        })?;

        Ok(Self {
            session_id: SessionId(value.session_id),
            role,
            content: value.content,
            created_at: parse_rfc3339("message created_at", &value.created_at)?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallRow {
    pub session_id: String,
    pub name: String,
    pub args_json: String,
    pub result_json: String,
    pub created_at: String,
}

impl TryFrom<ToolCallRow> for ToolCallRecord {
    type Error = RepositoryError;

    fn try_from(value: ToolCallRow) -> Result<Self, Self::Error> {
        Ok(Self {
            session_id: SessionId(value.session_id),
            name: value.name,
            args: serde_json::from_str(&value.args_json)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?,
            result: serde_json::from_str(&value.result_json)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?,
            created_at: parse_rfc3339("tool call created_at", &value.created_at)?,
        })
    }
}

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn record_message(&self, message: &Message) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(message.session_id.as_str())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_tool_call(&self, call: &ToolCallRecord) -> Result<(), RepositoryError> {
        let args_json = serde_json::to_string(&call.args)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let result_json = serde_json::to_string(&call.result)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO tool_calls (session_id, name, args_json, result_json, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(call.session_id.as_str())
        .bind(&call.name)
        .bind(args_json)
        .bind(result_json)
        .bind(call.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT session_id, role, content, created_at FROM messages
             WHERE session_id = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(session_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(|row| Message::try_from(message_record_from_row(row)?))
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn tool_calls(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ToolCallRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT session_id, name, args_json, result_json, created_at FROM tool_calls
             WHERE session_id = ?
             ORDER BY id",
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| ToolCallRecord::try_from(tool_call_row_from_row(row)?)).collect()
    }
}

fn message_record_from_row(row: &SqliteRow) -> Result<MessageRecord, RepositoryError> {
    Ok(MessageRecord {
        session_id: row.try_get("session_id")?,
        role: row.try_get("role")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

fn tool_call_row_from_row(row: &SqliteRow) -> Result<ToolCallRow, RepositoryError> {
    Ok(ToolCallRow {
        session_id: row.try_get("session_id")?,
        name: row.try_get("name")?,
        args_json: row.try_get("args_json")?,
        result_json: row.try_get("result_json")?,
        created_at: row.try_get("created_at")?,
    })
}
