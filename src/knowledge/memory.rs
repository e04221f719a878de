//! In-memory knowledge base loaded from a JSON corpus.
//!
//! Implements both [`VectorStore`] and [`GraphStore`]. Chunk similarity is a
//! bag-of-words cosine score, which keeps the crate free of an embedding model
//! while still ranking chunks the way a vector index would. Graph traversal is
//! breadth-first over undirected edges.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use super::{GraphMatch, GraphNode, GraphStore, StoreError, VectorHit, VectorStore};

/// Maximum hops considered by [`GraphStore::shortest_path`].
pub const MAX_PATH_HOPS: usize = 3;

/// Relation name of containment edges (member → group).
pub const PART_OF: &str = "PART_OF";

/// Node labels treated as structural groupings.
const GROUP_LABELS: &[&str] = &["Project", "Folder"];

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "what", "which", "about", "from", "have",
    "are", "was", "were", "how", "why", "who", "does", "did", "can", "you", "your", "my",
    "into", "its", "his", "her", "their", "there", "then", "than", "any", "all", "do", "is",
    "of", "to", "in", "on", "at", "an", "as", "be", "by", "or", "it", "me", "we",
];

// ── Corpus file format ────────────────────────────────────────────────────────

/// Serialized corpus: chunks for similarity search plus a node/edge graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub relation: String,
}

/// Counts reported by `mneme corpus stats`.
#[derive(Debug, Serialize)]
pub struct CorpusStats {
    pub chunks: usize,
    pub sources: usize,
    pub nodes: usize,
    pub edges: usize,
    pub groups: usize,
}

// ── Knowledge base ────────────────────────────────────────────────────────────

pub struct MemoryKnowledgeBase {
    corpus: Corpus,
    chunk_terms: Vec<HashMap<String, f32>>,
    node_index: HashMap<String, usize>,
    adjacency: HashMap<String, Vec<String>>,
}

impl MemoryKnowledgeBase {
    pub fn from_corpus(corpus: Corpus) -> Self {
        let chunk_terms = corpus.chunks.iter().map(|c| term_vector(&c.text)).collect();

        let node_index = corpus
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for edge in &corpus.edges {
            push_unique(adjacency.entry(edge.from.clone()).or_default(), &edge.to);
            push_unique(adjacency.entry(edge.to.clone()).or_default(), &edge.from);
        }

        Self {
            corpus,
            chunk_terms,
            node_index,
            adjacency,
        }
    }

    /// Load a corpus from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read corpus file {}", path.display()))?;
        let corpus: Corpus = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse corpus JSON {}", path.display()))?;
        let kb = Self::from_corpus(corpus);
        tracing::info!(
            path = %path.display(),
            chunks = kb.corpus.chunks.len(),
            nodes = kb.corpus.nodes.len(),
            edges = kb.corpus.edges.len(),
            "corpus loaded"
        );
        Ok(kb)
    }

    pub fn stats(&self) -> CorpusStats {
        let sources: HashSet<&str> = self
            .corpus
            .chunks
            .iter()
            .map(|c| c.source_id.as_str())
            .collect();
        CorpusStats {
            chunks: self.corpus.chunks.len(),
            sources: sources.len(),
            nodes: self.corpus.nodes.len(),
            edges: self.corpus.edges.len(),
            groups: self.groups().count(),
        }
    }

    fn node(&self, id: &str) -> Option<&GraphNode> {
        self.node_index.get(id).map(|&i| &self.corpus.nodes[i])
    }

    fn groups(&self) -> impl Iterator<Item = &GraphNode> {
        self.corpus
            .nodes
            .iter()
            .filter(|n| GROUP_LABELS.iter().any(|l| n.label.eq_ignore_ascii_case(l)))
    }

    /// Breadth-first distances from `start`, up to `max_depth` hops.
    ///
    /// Returns visited ids in discovery order together with each id's parent.
    fn bfs(&self, start: &str, max_depth: usize) -> (Vec<(String, usize)>, HashMap<String, String>) {
        let mut order = Vec::new();
        let mut parents = HashMap::new();
        let mut seen = HashSet::from([start.to_string()]);
        let mut queue = VecDeque::from([(start.to_string(), 0usize)]);

        while let Some((id, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for next in self.adjacency.get(&id).into_iter().flatten() {
                if seen.insert(next.clone()) {
                    parents.insert(next.clone(), id.clone());
                    order.push((next.clone(), depth + 1));
                    queue.push_back((next.clone(), depth + 1));
                }
            }
        }
        (order, parents)
    }
}

#[async_trait]
impl VectorStore for MemoryKnowledgeBase {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<VectorHit>, StoreError> {
        let query_terms = term_vector(text);
        if query_terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, usize)> = self
            .chunk_terms
            .iter()
            .enumerate()
            .map(|(i, terms)| (cosine(&query_terms, terms), i))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        // Stable sort keeps corpus order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, i)| {
                let chunk = &self.corpus.chunks[i];
                VectorHit {
                    text: chunk.text.clone(),
                    score,
                    source_id: chunk.source_id.clone(),
                }
            })
            .collect())
    }
}

#[async_trait]
impl GraphStore for MemoryKnowledgeBase {
    async fn query_by_entities(&self, entities: &[String]) -> Result<Vec<GraphMatch>, StoreError> {
        let mut seen = HashSet::new();
        let mut matches = Vec::new();

        for entity in entities {
            let needle = entity.trim().to_lowercase();
            if needle.len() < 2 {
                continue;
            }
            for node in &self.corpus.nodes {
                if node.name.to_lowercase().contains(&needle) && seen.insert(node.id.clone()) {
                    matches.push(GraphMatch {
                        node: node.clone(),
                        entity: entity.clone(),
                        path: None,
                    });
                }
            }
        }
        Ok(matches)
    }

    async fn shortest_path(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Option<Vec<GraphNode>>, StoreError> {
        if self.node(from).is_none() || self.node(to).is_none() {
            return Ok(None);
        }
        if from == to {
            return Ok(self.node(from).map(|n| vec![n.clone()]));
        }

        let (order, parents) = self.bfs(from, MAX_PATH_HOPS);
        if !order.iter().any(|(id, _)| id == to) {
            return Ok(None);
        }

        let mut ids = vec![to.to_string()];
        let mut current = to;
        while let Some(parent) = parents.get(current) {
            ids.push(parent.clone());
            current = parent;
        }
        ids.reverse();

        Ok(Some(
            ids.iter()
                .filter_map(|id| self.node(id).cloned())
                .collect(),
        ))
    }

    async fn neighbors(&self, id: &str, depth: usize) -> Result<Vec<GraphNode>, StoreError> {
        let (order, _) = self.bfs(id, depth);
        Ok(order
            .iter()
            .filter_map(|(id, _)| self.node(id).cloned())
            .collect())
    }

    async fn containment_query(&self, group_ref: &str) -> Result<Vec<GraphNode>, StoreError> {
        let needle = group_ref.trim().to_lowercase();

        if needle.is_empty() {
            let mut groups: Vec<GraphNode> = self.groups().cloned().collect();
            groups.sort_by(|a, b| a.name.cmp(&b.name));
            return Ok(groups);
        }

        let group_ids: HashSet<&str> = self
            .groups()
            .filter(|g| g.name.to_lowercase().contains(&needle))
            .map(|g| g.id.as_str())
            .collect();

        let mut seen = HashSet::new();
        let mut members: Vec<GraphNode> = self
            .corpus
            .edges
            .iter()
            .filter(|e| e.relation.eq_ignore_ascii_case(PART_OF))
            .filter(|e| group_ids.contains(e.to.as_str()))
            .filter_map(|e| self.node(&e.from))
            .filter(|n| seen.insert(n.id.clone()))
            .cloned()
            .collect();

        if members.is_empty() {
            members = self
                .corpus
                .nodes
                .iter()
                .filter(|n| {
                    n.source
                        .as_deref()
                        .is_some_and(|s| s.to_lowercase().starts_with(&needle))
                })
                .cloned()
                .collect();
        }

        members.sort_by(|a, b| a.reference().cmp(b.reference()));
        Ok(members)
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
}

/// Term-frequency vector over lowercase alphanumeric tokens, stopwords removed.
fn term_vector(text: &str) -> HashMap<String, f32> {
    let mut terms = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(&t.as_str()))
    {
        *terms.entry(token).or_insert(0.0) += 1.0;
    }
    terms
}

fn cosine(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f32 {
    let dot: f32 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm_a: f32 = a.values().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.values().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
