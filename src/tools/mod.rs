pub mod ask_knowledge;

use ask_knowledge::AskKnowledgeParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use std::sync::Arc;

use mneme::agent::{Agent, Message};

/// The Mneme MCP tool handler. Holds the shared agent and exposes it via the
/// `#[tool_router]` macro. Each call is an independent turn; the client keeps
/// the conversation and resends it as `history`.
#[derive(Clone)]
pub struct MnemeTools {
    tool_router: ToolRouter<Self>,
    agent: Arc<Agent>,
}

#[tool_router]
impl MnemeTools {
    pub fn new(agent: Arc<Agent>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            agent,
        }
    }

    /// Answer a question from the knowledge base.
    #[tool(description = "Answer a question from the personal knowledge base. Combines vector search and knowledge-graph traversal, reasons over the results (retrieving again if needed), and returns the answer with cited sources.")]
    async fn ask_knowledge(
        &self,
        Parameters(params): Parameters<AskKnowledgeParams>,
    ) -> Result<String, String> {
        if params.query.trim().is_empty() {
            return Err("query must not be empty".into());
        }

        let history: Vec<Message> = params
            .history
            .unwrap_or_default()
            .into_iter()
            .map(|entry| entry.into_message())
            .collect::<Result<_, _>>()?;

        tracing::info!(
            query_len = params.query.len(),
            history = history.len(),
            "ask_knowledge called"
        );

        let result = self.agent.run_turn(&params.query, history).await;

        serde_json::to_string(&result).map_err(|e| format!("serialization failed: {e}"))
    }
}

#[tool_handler]
impl ServerHandler for MnemeTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Mneme answers questions about a personal knowledge base. Use ask_knowledge \
                 with the user's question and, for follow-ups, the prior conversation."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
