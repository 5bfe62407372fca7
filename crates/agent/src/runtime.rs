use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use libdesk_core::config::AgentConfig;
use libdesk_core::conversation::{Message, MessageRole, SessionId, ToolCallRecord};
use libdesk_db::repositories::{ConversationRepository, RepositoryError};

use crate::conversation::build_messages;
use crate::llm::{ChatMessage, Completion, CompletionRequest, LlmClient};
use crate::tools::{tool_definitions, ToolExecutor};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("language model request failed: {0:#}")]
    Llm(anyhow::Error),
    #[error("tool execution failed: {0}")]
    Repository(#[from] RepositoryError),
    #[error("no final reply after {0} tool rounds")]
    ToolRoundsExhausted(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgentSettings {
    pub max_tool_rounds: u32,
    pub history_limit: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self { max_tool_rounds: 5, history_limit: 20 }
    }
}

impl From<&AgentConfig> for AgentSettings {
    fn from(config: &AgentConfig) -> Self {
        Self { max_tool_rounds: config.max_tool_rounds, history_limit: config.history_limit }
    }
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    conversations: Arc<dyn ConversationRepository>,
    settings: AgentSettings,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        conversations: Arc<dyn ConversationRepository>,
        settings: AgentSettings,
    ) -> Self {
        Self { llm, executor, conversations, settings }
    }

    /// Answers one chat turn. The user message, every tool call and the final
    /// reply are appended to the session log; log failures never fail the turn.
    pub async fn handle_message(
        &self,
        session_id: &SessionId,
        text: &str,
    ) -> Result<String, AgentError> {
        let history = match self
            .conversations
            .recent_messages(session_id, self.settings.history_limit)
            .await
        {
            Ok(history) => history,
            Err(error) => {
                warn!(
                    event_name = "agent.history_unavailable",
                    session_id = %session_id,
                    error = %error,
                    "continuing without conversation history"
                );
                Vec::new()
            }
        };

        self.record_message(Message::new(session_id.clone(), MessageRole::User, text)).await;

        let mut request =
            CompletionRequest { messages: build_messages(&history, text), tools: tool_definitions() };

        for round in 1..=self.settings.max_tool_rounds {
            let completion = self.llm.complete(&request).await.map_err(AgentError::Llm)?;

            let calls = match completion {
                Completion::Reply(reply) => {
                    info!(
                        event_name = "agent.reply",
                        session_id = %session_id,
                        rounds = round,
                        "agent produced final reply"
                    );
                    self.record_message(Message::new(
                        session_id.clone(),
                        MessageRole::Assistant,
                        reply.clone(),
                    ))
                    .await;
                    return Ok(reply);
                }
                Completion::ToolCalls(calls) => calls,
            };

            request.messages.push(ChatMessage::assistant_tool_calls(calls.clone()));
            for call in calls {
                debug!(
                    event_name = "agent.tool_call",
                    session_id = %session_id,
                    tool = %call.name,
                    round,
                    "dispatching tool call"
                );
                let result = self.executor.dispatch(&call.name, call.arguments.clone()).await?;

                self.record_tool_call(ToolCallRecord::new(
                    session_id.clone(),
                    call.name.clone(),
                    call.arguments,
                    result.clone(),
                ))
                .await;
                request.messages.push(ChatMessage::tool_result(call.id, result.to_string()));
            }
        }

        warn!(
            event_name = "agent.tool_rounds_exhausted",
            session_id = %session_id,
            max_tool_rounds = self.settings.max_tool_rounds,
            "model kept requesting tools"
        );
        Err(AgentError::ToolRoundsExhausted(self.settings.max_tool_rounds))
    }

    async fn record_message(&self, message: Message) {
        if let Err(error) = self.conversations.record_message(&message).await {
            warn!(
                event_name = "agent.message_log_failed",
                session_id = %message.session_id,
                role = message.role.as_str(),
                error = %error,
                "failed to record chat message"
            );
        }
    }

    async fn record_tool_call(&self, call: ToolCallRecord) {
        if let Err(error) = self.conversations.record_tool_call(&call).await {
            warn!(
                event_name = "agent.tool_call_log_failed",
                session_id = %call.session_id,
                tool = %call.name,
                error = %error,
                "failed to record tool call"
            );
        }
    }
}
