//! MCP `ask_knowledge` tool parameter definition.

use mneme::agent::{Message, Role};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `ask_knowledge` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AskKnowledgeParams {
    /// The user's question.
    #[schemars(description = "Question about the knowledge base, in natural language")]
    pub query: String,

    /// Prior conversation, oldest first.
    #[schemars(
        description = "Prior conversation, oldest first. Used to resolve references like 'it' or 'that project'."
    )]
    pub history: Option<Vec<HistoryEntry>>,
}

/// One prior message.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HistoryEntry {
    #[schemars(description = "'user' or 'assistant'")]
    pub role: String,
    pub content: String,
}

impl HistoryEntry {
    pub fn into_message(self) -> Result<Message, String> {
        let role = match self.role.trim().to_ascii_lowercase().as_str() {
            "user" => Role::User,
            "assistant" | "agent" => Role::Assistant,
            other => return Err(format!("unknown history role: {other}")),
        };
        Ok(Message {
            role,
            content: self.content,
        })
    }
}
