//! Chat agent for the library desk.
//!
//! The agent turns a user's message into calls against the library
//! repositories:
//! 1. **Context** (`conversation`) - system prompt plus the session's recent turns
//! 2. **Model** (`llm`) - pluggable `LlmClient`, with an OpenAI-compatible HTTP client
//! 3. **Tools** (`tools`) - closed `LibraryTool` set, parsed strictly and executed
//! 4. **Loop** (`runtime`) - bounded tool rounds with every step logged per session
//!
//! The model only chooses operations. Stock checks, price snapshots and all
//! other rules are enforced by the repositories.

pub mod conversation;
pub mod llm;
pub mod runtime;
pub mod tools;

pub use llm::{LlmClient, OpenAiCompatibleClient};
pub use runtime::{AgentError, AgentRuntime, AgentSettings};
pub use tools::{LibraryTool, ToolExecutor};
