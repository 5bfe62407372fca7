use libdesk_core::conversation::{Message, MessageRole};

use crate::llm::ChatMessage;

pub const SYSTEM_PROMPT: &str = "\
You are a helpful library desk agent for a small library. You can search books, \
create orders, restock books, update prices, check order status and review low-stock \
inventory by calling the provided tools.

Rules:
- Always call a tool when the user asks to list or search books, sell or order copies, \
restock, change a price, check an order, or review inventory. Never pretend a change \
happened without calling the tool.
- Whenever you create an order, include its id in your final answer in exactly this \
format: \"Order ID: <number>\". Also say briefly which book, how many copies, and the \
resulting stock when known.
- If a tool returns an error, explain it plainly and do not retry with invented data.
- Reply in the same language as the user.";

/// Rebuilds model context from the stored turns of a session followed by
/// the new user message.
pub fn build_messages(history: &[Message], text: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(history.iter().map(|message| match message.role {
        MessageRole::User => ChatMessage::user(message.content.clone()),
        MessageRole::Assistant => ChatMessage::assistant(message.content.clone()),
    }));
    messages.push(ChatMessage::user(text));
    messages
}
