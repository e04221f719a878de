//! Agent wiring and the MCP stdio server.
//!
//! [`build_agent`] loads the corpus and the language model client described by
//! the config; [`serve_stdio`] exposes the resulting agent as an MCP tool.

use crate::tools::MnemeTools;
use anyhow::{Context, Result};
use mneme::agent::Agent;
use mneme::config::MnemeConfig;
use mneme::knowledge::memory::MemoryKnowledgeBase;
use mneme::llm::openrouter::OpenRouterModel;
use rmcp::ServiceExt;
use std::sync::Arc;

/// Shared setup: load the corpus, create the model client, assemble the agent.
pub fn build_agent(config: &MnemeConfig) -> Result<Arc<Agent>> {
    let corpus_path = config.resolved_corpus_path();
    let kb = Arc::new(
        MemoryKnowledgeBase::from_path(&corpus_path)
            .context("failed to load corpus (set MNEME_CORPUS or corpus.path)")?,
    );
    tracing::info!(corpus = %corpus_path.display(), "knowledge base ready");

    if config.llm.api_key.is_empty() {
        tracing::warn!(
            "no language model API key configured; classification will use keywords \
             and reasoning will fail until MNEME_LLM_API_KEY is set"
        );
    }
    let model = Arc::new(OpenRouterModel::new(&config.llm).context("failed to build HTTP client")?);
    tracing::info!(model = %config.llm.model, "language model ready");

    Ok(Arc::new(Agent::new(kb.clone(), kb, model, config)))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: MnemeConfig) -> Result<()> {
    tracing::info!("starting Mneme MCP server on stdio");

    let agent = build_agent(&config)?;

    let tools = MnemeTools::new(agent);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}
