//! Turn-scoped state and the types that flow between the agent's stages.
//!
//! [`TurnState`] is created fresh for each user turn, owned by the controller,
//! and dropped once the [`TurnResult`] has been produced.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse handling strategy for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Looking for specific information or documents.
    Search,
    /// Exploring connections between topics.
    Explore,
    /// Asking the agent to remember something.
    Add,
    /// Requesting a summary.
    Summarize,
    /// Multi-hop reasoning across documents.
    Reason,
    /// Greeting or small talk.
    General,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Self::Search,
        Self::Explore,
        Self::Add,
        Self::Summarize,
        Self::Reason,
        Self::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Explore => "explore",
            Self::Add => "add",
            Self::Summarize => "summarize",
            Self::Reason => "reason",
            Self::General => "general",
        }
    }

    /// Intents whose answer must be backed by retrieved evidence.
    pub fn needs_evidence(&self) -> bool {
        matches!(
            self,
            Self::Search | Self::Explore | Self::Summarize | Self::Reason
        )
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "explore" => Ok(Self::Explore),
            "add" => Ok(Self::Add),
            "summarize" | "summarise" => Ok(Self::Summarize),
            "reason" => Ok(Self::Reason),
            "general" => Ok(Self::General),
            other => Err(format!("unknown intent: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    #[serde(alias = "agent")]
    Assistant,
}

/// One prior message of the conversation, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Which retrieval source(s) produced a context item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    #[serde(rename = "vector")]
    Vector,
    #[serde(rename = "graph")]
    Graph,
    #[serde(rename = "vector+graph")]
    VectorGraph,
}

impl Origin {
    /// Origin after merging in evidence from `other`.
    pub fn combine(self, other: Origin) -> Origin {
        if self == other {
            self
        } else {
            Origin::VectorGraph
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Graph => "graph",
            Self::VectorGraph => "vector+graph",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of retrieved evidence. Identity is `id` (document or entity id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    pub text: String,
    pub origin: Origin,
    /// Best similarity score, when the vector store contributed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    /// Position in the graph traversal order, when the graph contributed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_rank: Option<usize>,
    /// Citation reference (file path, title, or id).
    pub source_reference: String,
}

impl ContextItem {
    /// Fold `other` (same id) into this item: keep position, retag origin,
    /// keep the best score, and append text not already present.
    pub fn absorb(&mut self, other: ContextItem) {
        self.origin = self.origin.combine(other.origin);
        self.similarity = match (self.similarity, other.similarity) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.graph_rank = self.graph_rank.or(other.graph_rank);
        if !other.text.is_empty() && !self.text.contains(&other.text) {
            self.text.push_str("\n\n");
            self.text.push_str(&other.text);
        }
    }
}

/// Outcome status of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Answered,
    /// The language model failed during reasoning; `response` is an apology.
    Failed,
}

/// What the agent hands back to the caller at the end of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub turn_id: Uuid,
    pub status: TurnStatus,
    pub response: String,
    pub citations: Vec<String>,
    pub intent: Intent,
    pub entities: Vec<String>,
    pub reasoning_steps_used: u32,
    /// At least one retrieval source failed or timed out during the turn.
    pub partial: bool,
}

/// Mutable state threaded through one turn.
#[derive(Debug)]
pub struct TurnState {
    pub turn_id: Uuid,
    query: String,
    classification: Option<(Intent, Vec<String>)>,
    pub history: Vec<Message>,
    context: Vec<ContextItem>,
    pub reasoning_steps: u32,
    pub should_continue: bool,
    /// Refinement terms proposed by the last reasoning step.
    pub follow_up: Vec<String>,
    /// Context came from a structural (containment) query.
    pub structural: bool,
    pub partial: bool,
    pub draft: String,
    response: Option<String>,
}

impl TurnState {
    pub fn new(query: impl Into<String>, history: Vec<Message>) -> Self {
        Self {
            turn_id: Uuid::now_v7(),
            query: query.into(),
            classification: None,
            history,
            context: Vec::new(),
            reasoning_steps: 0,
            should_continue: false,
            follow_up: Vec::new(),
            structural: false,
            partial: false,
            draft: String::new(),
            response: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Record the classifier's verdict. Only the first call has any effect.
    pub fn classify(&mut self, intent: Intent, entities: Vec<String>) {
        if self.classification.is_none() {
            self.classification = Some((intent, entities));
        }
    }

    pub fn intent(&self) -> Intent {
        self.classification
            .as_ref()
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::General)
    }

    pub fn entities(&self) -> &[String] {
        self.classification
            .as_ref()
            .map(|(_, entities)| entities.as_slice())
            .unwrap_or(&[])
    }

    pub fn context(&self) -> &[ContextItem] {
        &self.context
    }

    /// Add retrieved items. Items whose id is already present are merged in
    /// place; the context never shrinks. Returns the number of new items.
    pub fn extend_context(&mut self, items: Vec<ContextItem>) -> usize {
        let before = self.context.len();
        for item in items {
            match self.context.iter_mut().find(|c| c.id == item.id) {
                Some(existing) => existing.absorb(item),
                None => self.context.push(item),
            }
        }
        self.context.len() - before
    }

    /// Set the final answer. Only the first call has any effect.
    pub fn set_response(&mut self, text: String) {
        if self.response.is_none() {
            self.response = Some(text);
        }
    }

    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }
}
