//! Dual retrieval: vector similarity and graph traversal, fused into one ranked context.
//!
//! Both sources are queried concurrently, each under its own timeout. A failed
//! or slow source only costs its own results; the turn carries on with the
//! other one and is flagged `partial`.
//!
//! Fusion order: vector hits by similarity descending, then graph hits in
//! traversal order. A graph hit whose id is already present is merged into the
//! existing item (which keeps its position) and retagged `vector+graph`.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::state::{ContextItem, Intent, Origin};
use crate::config::RetrievalConfig;
use crate::knowledge::{GraphNode, GraphStore, StoreError, VectorHit, VectorStore};

const STRUCTURE_CUES: &[&str] = &[
    "folder", "directory", "project", "what's in", "what is in", "contents of", "files in",
    "documents in", "notes in", "structure", "organize", "organise", "hierarchy",
];

/// Phrasings that ask how things connect rather than what a group holds.
const RELATION_CUES: &[&str] = &[
    "relate", "relation", "connect", "link between", "links between",
];

/// Words stripped when extracting a group name from a structure query.
const STRUCTURE_NOISE: &[&str] = &[
    "folder", "folders", "project", "projects", "directory", "directories", "dir", "files",
    "file", "documents", "document", "notes", "note", "my", "the",
];

// ── Public types ──────────────────────────────────────────────────────────────

/// Inputs to one retrieval round.
pub struct RetrievalRequest<'a> {
    pub query: &'a str,
    pub intent: Intent,
    pub entities: &'a [String],
    pub context_so_far: &'a [ContextItem],
    pub reasoning_steps: u32,
    /// Refinement terms from the previous reasoning step.
    pub follow_up: &'a [String],
}

/// Fused output of one retrieval round.
#[derive(Debug, Default)]
pub struct Retrieval {
    pub items: Vec<ContextItem>,
    /// A source failed or timed out.
    pub partial: bool,
    /// Items came from a containment query rather than similarity ranking.
    pub structural: bool,
}

pub struct DualRetriever {
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    config: RetrievalConfig,
}

/// Graph branch output: items in traversal order, plus whether an expansion step failed.
struct GraphHits {
    items: Vec<ContextItem>,
    degraded: bool,
}

// ── Retriever ─────────────────────────────────────────────────────────────────

impl DualRetriever {
    pub fn new(
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            vector,
            graph,
            config,
        }
    }

    /// Run one retrieval round. Never fails; source failures set `partial`.
    ///
    /// New items are capped by what is left of `max_context_items` once the
    /// context gathered so far is counted.
    pub async fn retrieve(&self, request: &RetrievalRequest<'_>) -> Retrieval {
        let exclude: HashSet<&str> = if request.reasoning_steps > 0 {
            request.context_so_far.iter().map(|c| c.id.as_str()).collect()
        } else {
            HashSet::new()
        };

        let budget = self
            .config
            .max_context_items
            .saturating_sub(request.context_so_far.len());
        if budget == 0 {
            tracing::debug!(step = request.reasoning_steps, "context full, skipping retrieval");
            return Retrieval::default();
        }

        let mut partial = false;

        if let Some(group) = self.structure_group(request) {
            match self.bounded(self.graph.containment_query(&group)).await {
                Ok(nodes) if !nodes.is_empty() => {
                    let items: Vec<ContextItem> = nodes
                        .iter()
                        .enumerate()
                        .map(|(rank, node)| self.graph_item(node, rank))
                        .filter(|item| !exclude.contains(item.id.as_str()))
                        .take(budget)
                        .collect();
                    if !items.is_empty() {
                        tracing::debug!(group = %group, members = items.len(), "structure query");
                        return Retrieval {
                            items,
                            partial,
                            structural: true,
                        };
                    }
                    tracing::debug!(group = %group, "no new group members, using dual retrieval");
                }
                Ok(_) => {
                    tracing::debug!(group = %group, "empty containment result, using dual retrieval");
                }
                Err(e) => {
                    tracing::warn!(group = %group, error = %e, "containment query failed");
                    partial = true;
                }
            }
        }

        let (query_text, entities) = shape_query(request);
        let k = self.config.vector_top_k + exclude.len();

        // Both sub-queries are created before either is awaited.
        let vector_fut = self.bounded(self.vector.query(&query_text, k));
        let graph_fut = self.bounded(self.graph_hits(request.intent, &entities));
        let (vector_result, graph_result) = tokio::join!(vector_fut, graph_fut);

        let vector_items: Vec<ContextItem> = match vector_result {
            Ok(hits) => hits
                .into_iter()
                .filter(|h| !exclude.contains(h.source_id.as_str()))
                .map(|h| self.vector_item(h))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "vector retrieval failed");
                partial = true;
                Vec::new()
            }
        };

        let graph_items: Vec<ContextItem> = match graph_result {
            Ok(hits) => {
                partial |= hits.degraded;
                hits.items
                    .into_iter()
                    .filter(|item| !exclude.contains(item.id.as_str()))
                    .collect()
            }
            Err(e) => {
                tracing::warn!(error = %e, "graph retrieval failed");
                partial = true;
                Vec::new()
            }
        };

        let items = fuse(vector_items, graph_items, budget);
        tracing::debug!(
            items = items.len(),
            partial,
            step = request.reasoning_steps,
            "retrieval fused"
        );

        Retrieval {
            items,
            partial,
            structural: false,
        }
    }

    /// Group to list for a containment-style question, if this round is one.
    ///
    /// Explore and reason turns never take the containment path, nor does a
    /// later round that carries follow-up terms.
    fn structure_group(&self, request: &RetrievalRequest<'_>) -> Option<String> {
        if matches!(request.intent, Intent::Explore | Intent::Reason) {
            return None;
        }
        if request.reasoning_steps > 0 && !request.follow_up.is_empty() {
            return None;
        }
        structure_target(request.query, request.entities)
    }

    /// Entity lookup plus intent-specific expansion, in traversal order.
    async fn graph_hits(&self, intent: Intent, entities: &[String]) -> Result<GraphHits, StoreError> {
        let entities = &entities[..entities.len().min(self.config.max_entities)];
        let mut hits = GraphHits {
            items: Vec::new(),
            degraded: false,
        };
        if entities.is_empty() {
            return Ok(hits);
        }

        let matches = self.graph.query_by_entities(entities).await?;

        let mut nodes: Vec<GraphNode> = Vec::new();
        for m in &matches {
            nodes.push(m.node.clone());
            nodes.extend(m.path.iter().flatten().cloned());
        }

        // First matched node of two distinct entities.
        let endpoints = matches.first().and_then(|first| {
            matches
                .iter()
                .find(|m| !m.entity.eq_ignore_ascii_case(&first.entity))
                .map(|second| (first.node.id.clone(), second.node.id.clone()))
        });

        let mut path_note = None;
        if matches!(intent, Intent::Explore | Intent::Reason) {
            if let Some((from, to)) = &endpoints {
                match self.graph.shortest_path(from, to).await {
                    Ok(Some(path)) => {
                        let names: Vec<&str> = path.iter().map(|n| n.name.as_str()).collect();
                        path_note = Some(format!("Connection path: {}", names.join(" -> ")));
                        nodes.extend(path);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(from = %from, to = %to, error = %e, "shortest path failed");
                        hits.degraded = true;
                    }
                }
            }
        }

        if intent == Intent::Explore && path_note.is_none() {
            let depth = self.config.neighbor_depth.clamp(1, 3);
            for m in matches.iter().take(2) {
                match self.graph.neighbors(&m.node.id, depth).await {
                    Ok(neighbors) => {
                        nodes.extend(neighbors.into_iter().take(self.config.neighbor_limit))
                    }
                    Err(e) => {
                        tracing::warn!(id = %m.node.id, error = %e, "neighbor expansion failed");
                        hits.degraded = true;
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        for node in &nodes {
            let item = self.graph_item(node, hits.items.len());
            if seen.insert(item.id.clone()) {
                hits.items.push(item);
            }
        }
        if let (Some(note), Some(first)) = (path_note, hits.items.first_mut()) {
            first.text.push('\n');
            first.text.push_str(&note);
        }

        Ok(hits)
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let limit: Duration = self.config.store_timeout();
        tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(StoreError::Timeout(self.config.store_timeout_ms)))
    }

    fn vector_item(&self, hit: VectorHit) -> ContextItem {
        ContextItem {
            text: truncate_chars(&hit.text, self.config.max_item_chars),
            origin: Origin::Vector,
            similarity: Some(hit.score),
            graph_rank: None,
            source_reference: hit.source_id.clone(),
            id: hit.source_id,
        }
    }

    fn graph_item(&self, node: &GraphNode, rank: usize) -> ContextItem {
        ContextItem {
            id: node.reference().to_string(),
            text: truncate_chars(&node.render(), self.config.max_item_chars),
            origin: Origin::Graph,
            similarity: None,
            graph_rank: Some(rank),
            source_reference: node.reference().to_string(),
        }
    }
}

// ── Fusion and query shaping ──────────────────────────────────────────────────

/// Fuse vector and graph items into one list capped at `max_items`.
///
/// Vector items are ordered by similarity descending (ties keep input order)
/// and deduplicated by id. Graph items follow in their given order; one whose
/// id is already present is merged in place and never appended.
pub fn fuse(
    mut vector_items: Vec<ContextItem>,
    graph_items: Vec<ContextItem>,
    max_items: usize,
) -> Vec<ContextItem> {
    vector_items.sort_by(|a, b| {
        let (a, b) = (a.similarity.unwrap_or(0.0), b.similarity.unwrap_or(0.0));
        b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut fused: Vec<ContextItem> = Vec::new();
    for item in vector_items.into_iter().chain(graph_items) {
        match fused.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => existing.absorb(item),
            None => fused.push(item),
        }
    }
    fused.truncate(max_items);
    fused
}

/// Query text and entity set for this round.
///
/// Later rounds fold the reasoner's follow-up terms into the query and use
/// them as the (narrower) entity set.
fn shape_query(request: &RetrievalRequest<'_>) -> (String, Vec<String>) {
    if request.reasoning_steps > 0 && !request.follow_up.is_empty() {
        let terms = request.follow_up.join(" ");
        (
            format!("{} {}", request.query, terms),
            request.follow_up.to_vec(),
        )
    } else {
        (request.query.to_string(), request.entities.to_vec())
    }
}

/// If the query asks what a folder/project contains, the group to look up.
///
/// Returns `Some("")` when the query is structural but names no group.
pub fn structure_target(query: &str, entities: &[String]) -> Option<String> {
    let lower = query.to_lowercase();
    if !STRUCTURE_CUES.iter().any(|cue| lower.contains(cue))
        || RELATION_CUES.iter().any(|cue| lower.contains(cue))
    {
        return None;
    }

    for entity in entities {
        let name = strip_noise(entity);
        if name.chars().count() > 1 {
            return Some(name);
        }
    }

    // Capitalised words after the first, e.g. "show me the Kubernetes folder".
    let capitalised = query
        .split(|c: char| !c.is_alphanumeric())
        .skip_while(|w| w.is_empty())
        .skip(1)
        .find(|w| {
            w.chars().count() > 1
                && w.chars().next().is_some_and(char::is_uppercase)
                && !STRUCTURE_NOISE.contains(&w.to_lowercase().as_str())
        });

    Some(capitalised.unwrap_or_default().to_string())
}

fn strip_noise(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .filter(|w| !STRUCTURE_NOISE.contains(&w.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncate to `max_chars` characters, appending "..." if truncated.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
