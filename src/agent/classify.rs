//! Intent and entity classification.
//!
//! The primary path asks the language model for a JSON verdict. Any failure
//! (transport, timeout, unparseable reply, unknown label) drops to
//! [`keyword_classify`], which is deterministic and never touches the network.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::state::{Intent, Message, Role};
use crate::llm::{complete_with_retry, extract_json, CompletionRequest, LanguageModel, LlmError};

/// History messages shown to the classifier for resolving references.
const CLASSIFY_HISTORY: usize = 4;

const RELATIONAL_CUES: &[&str] = &["connect", "relationship", "related", "relate", "link between"];
const MEMORY_CUES: &[&str] = &["remember that", "note that"];
const SUMMARY_CUES: &[&str] = &["summarize", "summarise", "summary"];

/// Words that never start or continue an entity phrase.
const STOPWORDS: &[&str] = &[
    "a", "about", "all", "am", "an", "and", "any", "are", "as", "at", "be", "between", "but",
    "by", "can", "could", "did", "do", "does", "for", "from", "give", "had", "has", "have",
    "hello", "hey", "hi", "how", "i", "in", "into", "is", "it", "its", "know", "me", "my",
    "of", "on", "or", "our", "please", "show", "so", "tell", "thank", "thanks", "that", "the",
    "there", "these", "this", "those", "to", "us", "was", "we", "were", "what", "when",
    "where", "which", "who", "why", "with", "would", "you", "your",
    // cue verbs
    "connect", "connected", "relate", "related", "relationship", "remember", "note",
    "summarize", "summarise", "summary", "find", "search", "explain", "list",
    // generic corpus nouns
    "notes", "documents", "document", "files", "file", "things", "stuff", "anything",
    "something", "everything", "info", "information",
];

/// Classifies a query into an [`Intent`] plus salient entity phrases.
pub struct Classifier {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct Verdict {
    intent: String,
    #[serde(default)]
    entities: Vec<String>,
}

impl Classifier {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        timeout: Duration,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            model,
            timeout,
            max_tokens,
            temperature,
        }
    }

    /// Classify `query`. Never fails: model problems fall back to keywords.
    pub async fn classify(&self, query: &str, history: &[Message]) -> (Intent, Vec<String>) {
        let request = CompletionRequest::json(
            classify_prompt(query, history),
            self.max_tokens,
            self.temperature,
        );

        let verdict = complete_with_retry(self.model.as_ref(), &request, self.timeout)
            .await
            .and_then(|reply| parse_verdict(&reply));

        match verdict {
            Ok((intent, entities)) => {
                tracing::debug!(intent = %intent, entities = ?entities, "model classification");
                (intent, entities)
            }
            Err(e) => {
                let (intent, entities) = keyword_classify(query);
                tracing::warn!(
                    error = %e,
                    intent = %intent,
                    "classification fell back to keywords"
                );
                (intent, entities)
            }
        }
    }
}

fn classify_prompt(query: &str, history: &[Message]) -> String {
    let recent = &history[history.len().saturating_sub(CLASSIFY_HISTORY)..];
    let history_section = if recent.is_empty() {
        String::new()
    } else {
        let lines: Vec<String> = recent
            .iter()
            .map(|m| match m.role {
                Role::User => format!("User: {}", m.content),
                Role::Assistant => format!("Assistant: {}", m.content),
            })
            .collect();
        format!("\nRecent conversation:\n{}\n", lines.join("\n"))
    };

    format!(
        r#"Analyze this user query about a personal knowledge base.
{history_section}
Query: "{query}"

Classify the intent as one of:
- search: Looking for specific information or documents
- explore: Exploring connections between topics
- add: User wants to add or remember new information
- summarize: Requesting a summary of content
- reason: Requires multi-hop reasoning across multiple documents
- general: General conversation or greeting

Also extract any entities mentioned (names of projects, people, concepts, technologies).
Resolve pronouns using the recent conversation when possible.

Return JSON:
{{"intent": "one of the above", "entities": ["entity1", "entity2"]}}

Return ONLY the JSON."#
    )
}

/// Parse the model's JSON verdict, rejecting unknown intent labels.
fn parse_verdict(reply: &str) -> Result<(Intent, Vec<String>), LlmError> {
    let json = extract_json(reply)
        .ok_or_else(|| LlmError::Parse("no JSON object in classifier reply".into()))?;
    let verdict: Verdict =
        serde_json::from_str(json).map_err(|e| LlmError::Parse(e.to_string()))?;
    let intent = verdict.intent.parse::<Intent>().map_err(LlmError::Parse)?;
    Ok((intent, dedup_entities(verdict.entities)))
}

/// Deterministic keyword classifier used when the model is unavailable.
pub fn keyword_classify(query: &str) -> (Intent, Vec<String>) {
    let lower = query.to_lowercase();
    let entities = extract_entities(query);

    let intent = if RELATIONAL_CUES.iter().any(|cue| lower.contains(cue)) {
        Intent::Explore
    } else if MEMORY_CUES.iter().any(|cue| lower.contains(cue)) {
        Intent::Add
    } else if SUMMARY_CUES.iter().any(|cue| lower.contains(cue)) {
        Intent::Summarize
    } else if !entities.is_empty() {
        Intent::Search
    } else {
        Intent::General
    };

    (intent, entities)
}

/// Noun-phrase heuristic: maximal runs of non-stopword tokens.
///
/// Tokens keep their original casing; phrases are deduplicated case-insensitively.
pub fn extract_entities(query: &str) -> Vec<String> {
    let mut phrases = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let tokens = query.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_' || c == '\''));
    for raw in tokens {
        let token = raw.trim_matches(|c| c == '-' || c == '\'');
        let lower = token.to_lowercase();
        let lower = lower.strip_suffix("'s").unwrap_or(&lower);
        if token.chars().count() < 2 || STOPWORDS.contains(&lower) {
            if !current.is_empty() {
                phrases.push(current.join(" "));
                current.clear();
            }
            continue;
        }
        current.push(token.strip_suffix("'s").unwrap_or(token));
    }
    if !current.is_empty() {
        phrases.push(current.join(" "));
    }

    dedup_entities(phrases)
}

/// Trim, drop empties, and remove case-insensitive duplicates keeping first order.
fn dedup_entities(entities: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    entities
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty() && seen.insert(e.to_lowercase()))
        .collect()
}
