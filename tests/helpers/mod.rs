#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mneme::agent::Agent;
use mneme::config::MnemeConfig;
use mneme::knowledge::{GraphMatch, GraphNode, GraphStore, StoreError, VectorHit, VectorStore};
use mneme::llm::{CompletionRequest, LanguageModel, LlmError, ResponseFormat};

// ── Language model ────────────────────────────────────────────────────────────

/// Replays queued replies. JSON requests (classification) and text requests
/// (reasoning) draw from separate queues; an empty queue yields a transport error.
#[derive(Default)]
pub struct ScriptedModel {
    classify: Mutex<VecDeque<Result<String, LlmError>>>,
    reason: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify_as(self, intent: &str, entities: &[&str]) -> Self {
        let reply = serde_json::json!({ "intent": intent, "entities": entities }).to_string();
        self.classify.lock().unwrap().push_back(Ok(reply));
        self
    }

    pub fn classify_reply(self, reply: Result<String, LlmError>) -> Self {
        self.classify.lock().unwrap().push_back(reply);
        self
    }

    pub fn reason_reply(self, reply: Result<String, LlmError>) -> Self {
        self.reason.lock().unwrap().push_back(reply);
        self
    }

    pub fn answers(self, text: &str) -> Self {
        self.reason_reply(Ok(text.to_string()))
    }

    /// Prompts of the text (reasoning) requests, in call order.
    pub fn reason_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.format == ResponseFormat::Text)
            .map(|r| r.prompt.clone())
            .collect()
    }

    pub fn reason_calls(&self) -> usize {
        self.reason_prompts().len()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let queue = match request.format {
            ResponseFormat::Json => &self.classify,
            ResponseFormat::Text => &self.reason,
        };
        queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".into())))
    }
}

// ── Stores ────────────────────────────────────────────────────────────────────

pub fn hit(source: &str, score: f32) -> VectorHit {
    VectorHit {
        text: format!("chunk from {source} ({score})"),
        score,
        source_id: source.to_string(),
    }
}

pub fn node(id: &str, name: &str) -> GraphNode {
    GraphNode {
        id: id.to_string(),
        label: "Concept".to_string(),
        name: name.to_string(),
        description: String::new(),
        source: None,
    }
}

pub fn doc(id: &str, source: &str) -> GraphNode {
    GraphNode {
        id: id.to_string(),
        label: "Document".to_string(),
        name: source.rsplit('/').next().unwrap_or(source).to_string(),
        description: String::new(),
        source: Some(source.to_string()),
    }
}

pub fn matched(node: GraphNode, entity: &str) -> GraphMatch {
    GraphMatch {
        node,
        entity: entity.to_string(),
        path: None,
    }
}

/// Returns a fixed hit list (first `k`) and records every query.
#[derive(Default)]
pub struct FakeVectorStore {
    hits: Vec<VectorHit>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl FakeVectorStore {
    pub fn new(hits: Vec<VectorHit>) -> Self {
        Self {
            hits,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for FakeVectorStore {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<VectorHit>, StoreError> {
        self.queries.lock().unwrap().push((text.to_string(), k));
        Ok(self.hits.iter().take(k).cloned().collect())
    }
}

/// Canned graph answers with call recording.
#[derive(Default)]
pub struct FakeGraphStore {
    pub matches: Vec<GraphMatch>,
    pub path: Option<Vec<GraphNode>>,
    pub neighbors: Vec<GraphNode>,
    pub members: Vec<GraphNode>,
    pub entity_queries: Mutex<Vec<Vec<String>>>,
    pub path_queries: Mutex<Vec<(String, String)>>,
    pub neighbor_queries: Mutex<Vec<(String, usize)>>,
    pub containment_queries: Mutex<Vec<String>>,
}

impl FakeGraphStore {
    pub fn with_matches(matches: Vec<GraphMatch>) -> Self {
        Self {
            matches,
            ..Self::default()
        }
    }
}

#[async_trait]
impl GraphStore for FakeGraphStore {
    async fn query_by_entities(&self, entities: &[String]) -> Result<Vec<GraphMatch>, StoreError> {
        self.entity_queries.lock().unwrap().push(entities.to_vec());
        Ok(self.matches.clone())
    }

    async fn shortest_path(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Option<Vec<GraphNode>>, StoreError> {
        self.path_queries
            .lock()
            .unwrap()
            .push((from.to_string(), to.to_string()));
        Ok(self.path.clone())
    }

    async fn neighbors(&self, id: &str, depth: usize) -> Result<Vec<GraphNode>, StoreError> {
        self.neighbor_queries
            .lock()
            .unwrap()
            .push((id.to_string(), depth));
        Ok(self.neighbors.clone())
    }

    async fn containment_query(&self, group_ref: &str) -> Result<Vec<GraphNode>, StoreError> {
        self.containment_queries
            .lock()
            .unwrap()
            .push(group_ref.to_string());
        Ok(self.members.clone())
    }
}

/// Every call fails with `Unavailable`.
pub struct FailingStore;

#[async_trait]
impl VectorStore for FailingStore {
    async fn query(&self, _text: &str, _k: usize) -> Result<Vec<VectorHit>, StoreError> {
        Err(StoreError::Unavailable("vector index offline".into()))
    }
}

#[async_trait]
impl GraphStore for FailingStore {
    async fn query_by_entities(&self, _entities: &[String]) -> Result<Vec<GraphMatch>, StoreError> {
        Err(StoreError::Unavailable("graph offline".into()))
    }

    async fn shortest_path(
        &self,
        _from: &str,
        _to: &str,
    ) -> Result<Option<Vec<GraphNode>>, StoreError> {
        Err(StoreError::Unavailable("graph offline".into()))
    }

    async fn neighbors(&self, _id: &str, _depth: usize) -> Result<Vec<GraphNode>, StoreError> {
        Err(StoreError::Unavailable("graph offline".into()))
    }

    async fn containment_query(&self, _group_ref: &str) -> Result<Vec<GraphNode>, StoreError> {
        Err(StoreError::Unavailable("graph offline".into()))
    }
}

/// Sleeps for an hour before answering with nothing. Use with paused time.
pub struct SlowStore;

const SLOW: Duration = Duration::from_secs(3600);

#[async_trait]
impl VectorStore for SlowStore {
    async fn query(&self, _text: &str, _k: usize) -> Result<Vec<VectorHit>, StoreError> {
        tokio::time::sleep(SLOW).await;
        Ok(Vec::new())
    }
}

#[async_trait]
impl GraphStore for SlowStore {
    async fn query_by_entities(&self, _entities: &[String]) -> Result<Vec<GraphMatch>, StoreError> {
        tokio::time::sleep(SLOW).await;
        Ok(Vec::new())
    }

    async fn shortest_path(
        &self,
        _from: &str,
        _to: &str,
    ) -> Result<Option<Vec<GraphNode>>, StoreError> {
        tokio::time::sleep(SLOW).await;
        Ok(None)
    }

    async fn neighbors(&self, _id: &str, _depth: usize) -> Result<Vec<GraphNode>, StoreError> {
        tokio::time::sleep(SLOW).await;
        Ok(Vec::new())
    }

    async fn containment_query(&self, _group_ref: &str) -> Result<Vec<GraphNode>, StoreError> {
        tokio::time::sleep(SLOW).await;
        Ok(Vec::new())
    }
}

// ── Agent ─────────────────────────────────────────────────────────────────────

pub fn agent(
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    model: Arc<dyn LanguageModel>,
) -> Agent {
    Agent::new(vector, graph, model, &MnemeConfig::default())
}
