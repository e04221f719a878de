//! Knowledge store collaborators.
//!
//! The agent only talks to the stores through the [`VectorStore`] and
//! [`GraphStore`] traits defined here. [`memory::MemoryKnowledgeBase`] is the
//! bundled in-memory implementation of both, loaded from a JSON corpus.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Public types ──────────────────────────────────────────────────────────────

/// Errors raised by a knowledge store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or is not initialised.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer within the allotted time.
    #[error("store timed out after {0} ms")]
    Timeout(u64),

    /// The store answered with an error.
    #[error("query failed: {0}")]
    Query(String),
}

/// One nearest-neighbour hit from the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    /// Text of the matched chunk.
    pub text: String,
    /// Similarity in `[0.0, 1.0]`, higher is closer.
    pub score: f32,
    /// Id of the document the chunk belongs to.
    pub source_id: String,
}

/// A node of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    /// Node kind, e.g. `Document`, `Project`, `Concept`, `Person`.
    pub label: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// File path or other reference shown to the user as a citation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl GraphNode {
    /// Citation reference for this node: its source path, or its id.
    pub fn reference(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.id)
    }

    /// Render the node as evidence text.
    pub fn render(&self) -> String {
        let mut text = format!("[{}] {}", self.label, self.name);
        if !self.description.is_empty() {
            text.push('\n');
            text.push_str(&self.description);
        }
        if let Some(source) = &self.source {
            text.push_str("\nSource: ");
            text.push_str(source);
        }
        text
    }
}

/// A node matched by an entity lookup, with the path that led to it if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMatch {
    pub node: GraphNode,
    /// The entity phrase that matched this node.
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<GraphNode>>,
}

// ── Collaborator traits ───────────────────────────────────────────────────────

/// Similarity search over text chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top-`k` nearest chunks for `text`, ranked by similarity descending.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<VectorHit>, StoreError>;
}

/// Entity lookup and traversal over the knowledge graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Nodes matching any of `entities`, in entity order.
    async fn query_by_entities(&self, entities: &[String]) -> Result<Vec<GraphMatch>, StoreError>;

    /// Shortest path between two nodes, endpoints included. `None` if unconnected.
    async fn shortest_path(&self, from: &str, to: &str)
        -> Result<Option<Vec<GraphNode>>, StoreError>;

    /// Nodes within `depth` hops of `id`, nearest first. Excludes `id` itself.
    async fn neighbors(&self, id: &str, depth: usize) -> Result<Vec<GraphNode>, StoreError>;

    /// Members of the structural grouping named by `group_ref` (folder or project).
    async fn containment_query(&self, group_ref: &str) -> Result<Vec<GraphNode>, StoreError>;
}
