//! Reasoner: turns accumulated context into a draft answer and a continuation signal.
//!
//! The model is asked to close its reply with two control lines:
//!
//! ```text
//! CONTINUE: yes|no
//! SEARCH: <comma-separated terms>
//! ```
//!
//! Both are stripped from the draft. Anything other than an explicit `yes`
//! means stop.

use std::sync::Arc;
use std::time::Duration;

use super::state::{ContextItem, Intent, Message, Role};
use crate::llm::{complete_with_retry, CompletionRequest, LanguageModel, LlmError};

pub const NO_INFORMATION: &str =
    "I found no information about that in your knowledge base.";

const SOURCES_UNAVAILABLE: &str =
    "Some knowledge sources could not be reached, so this answer may be incomplete.";

// ── Public types ──────────────────────────────────────────────────────────────

/// Everything one reasoning step looks at.
pub struct ReasonRequest<'a> {
    pub query: &'a str,
    pub intent: Intent,
    pub context: &'a [ContextItem],
    pub history: &'a [Message],
    /// Context came from a containment query.
    pub structural: bool,
    pub partial: bool,
    /// No further retrieval will happen this turn.
    pub final_step: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reasoning {
    pub draft: String,
    pub should_continue: bool,
    /// Terms to refine the next retrieval with. Empty unless continuing.
    pub follow_up: Vec<String>,
}

pub struct Reasoner {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
    history_window: usize,
}

// ── Reasoner ──────────────────────────────────────────────────────────────────

impl Reasoner {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        timeout: Duration,
        max_tokens: u32,
        temperature: f32,
        history_window: usize,
    ) -> Self {
        Self {
            model,
            timeout,
            max_tokens,
            temperature,
            history_window,
        }
    }

    /// One reasoning step. Errors only when the model fails after its retry.
    pub async fn reason(&self, request: &ReasonRequest<'_>) -> Result<Reasoning, LlmError> {
        if request.context.is_empty() && request.intent.needs_evidence() {
            tracing::info!(intent = %request.intent, partial = request.partial, "no context, skipping model");
            let draft = if request.partial {
                format!("{NO_INFORMATION} {SOURCES_UNAVAILABLE}")
            } else {
                NO_INFORMATION.to_string()
            };
            return Ok(Reasoning {
                draft,
                should_continue: false,
                follow_up: Vec::new(),
            });
        }

        let prompt = build_prompt(request, self.history_window);
        let completion = CompletionRequest::text(prompt, self.max_tokens, self.temperature);
        let reply = complete_with_retry(self.model.as_ref(), &completion, self.timeout).await?;

        let reasoning = parse_reply(&reply);
        tracing::debug!(
            should_continue = reasoning.should_continue,
            follow_up = ?reasoning.follow_up,
            draft_chars = reasoning.draft.len(),
            "reasoning step"
        );
        Ok(reasoning)
    }
}

// ── Prompting ─────────────────────────────────────────────────────────────────

fn build_prompt(request: &ReasonRequest<'_>, history_window: usize) -> String {
    let query = request.query;
    let context = render_context(request.context);
    let history = render_history(request.history, history_window);

    let body = if request.structural {
        format!(
            "The user is asking how part of their knowledge base is organised.\n\
             {history}\n\
             These are the members of the relevant folder or project:\n\n\
             {context}\n\n\
             Question: {query}\n\n\
             Answer from the structure above. List the files and their kinds, point out \
             patterns, and suggest reorganisation only if asked."
        )
    } else {
        match request.intent {
            Intent::Search => format!(
                "Answer the user's question from the context below, taken from their personal \
                 knowledge base.\n\
                 {history}\n\
                 Context:\n{context}\n\n\
                 Question: {query}\n\n\
                 Answer directly when the context allows it, otherwise say what is missing. \
                 Cite file paths where you can. Use the conversation to resolve references \
                 like \"it\" or \"those\"."
            ),
            Intent::Explore => format!(
                "The user wants to explore how topics in their knowledge base connect.\n\
                 {history}\n\
                 Related material:\n{context}\n\n\
                 Query: {query}\n\n\
                 Describe the connections: direct relationships first, then indirect links \
                 through shared concepts, then any patterns worth noting."
            ),
            Intent::Reason => format!(
                "Reason step by step across the context below to answer the question.\n\
                 {history}\n\
                 Context:\n{context}\n\n\
                 Question: {query}\n\n\
                 Work out what the context establishes, how the pieces connect, and what \
                 follows. If a link in the chain is missing, say which."
            ),
            Intent::Summarize => format!(
                "Summarise the following material from the user's knowledge base.\n\
                 {history}\n\
                 Context:\n{context}\n\n\
                 Request: {query}\n\n\
                 Write a clear, organised summary that groups related points."
            ),
            Intent::Add => format!(
                "The user wants you to remember something.\n\n\
                 Their message: {query}\n\n\
                 Restate the main topic, what should be remembered, and any related concepts, \
                 in a short confirmation addressed to the user."
            ),
            Intent::General => format!(
                "You are a helpful assistant with access to a personal knowledge base.\n\
                 {history}\n\
                 Context from the knowledge base:\n{context}\n\n\
                 Message: {query}\n\n\
                 Reply helpfully. Use the context if it is relevant; otherwise just converse."
            ),
        }
    };

    if request.intent == Intent::Add {
        return body;
    }

    let control = if request.final_step {
        "No more material can be retrieved. Answer from what you have, then end with the \
         line:\nCONTINUE: no"
    } else {
        "End your reply with a line `CONTINUE: yes` if answering properly needs material \
         that is not in the context, followed by a line `SEARCH: <comma-separated terms to \
         look up>`. Otherwise end with `CONTINUE: no`."
    };
    format!("{body}\n\n{control}\n\nAnswer:")
}

/// Numbered `[Source n: ref]` blocks separated by `---`.
pub fn render_context(context: &[ContextItem]) -> String {
    if context.is_empty() {
        return "No relevant context found.".to_string();
    }
    context
        .iter()
        .enumerate()
        .map(|(i, item)| format!("[Source {}: {}]\n{}\n", i + 1, item.source_reference, item.text))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Trailing `window` messages as "User:"/"Assistant:" lines, or "" when empty.
fn render_history(history: &[Message], window: usize) -> String {
    let recent = &history[history.len().saturating_sub(window)..];
    if recent.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = recent
        .iter()
        .map(|m| match m.role {
            Role::User => format!("User: {}", m.content),
            Role::Assistant => format!("Assistant: {}", m.content),
        })
        .collect();
    format!("\nPrevious conversation:\n{}\n", lines.join("\n"))
}

// ── Reply parsing ─────────────────────────────────────────────────────────────

/// Split a model reply into draft text and control signals.
pub fn parse_reply(reply: &str) -> Reasoning {
    let mut should_continue = false;
    let mut follow_up = Vec::new();
    let mut kept = Vec::new();

    for line in reply.lines() {
        let bare = line.trim().trim_matches(|c| c == '*' || c == '`').trim();
        if let Some(value) = control_value(bare, "CONTINUE:") {
            should_continue = matches!(value.to_ascii_lowercase().as_str(), "yes" | "true");
        } else if let Some(value) = control_value(bare, "SEARCH:") {
            follow_up = value
                .split(',')
                .map(|t| t.trim().trim_matches('"').trim())
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        } else {
            kept.push(line);
        }
    }

    if !should_continue {
        follow_up.clear();
    }

    Reasoning {
        draft: kept.join("\n").trim().to_string(),
        should_continue,
        follow_up,
    }
}

/// Case-insensitive `KEY: value` match.
fn control_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let head = line.get(..key.len())?;
    head.eq_ignore_ascii_case(key)
        .then(|| line[key.len()..].trim().trim_matches(|c| c == '*' || c == '`').trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::Origin;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Fixed {
        reply: Result<String, LlmError>,
        calls: AtomicUsize,
        last_prompt: Mutex<String>,
    }

    impl Fixed {
        fn new(reply: Result<String, LlmError>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(String::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for Fixed {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = request.prompt.clone();
            self.reply.clone()
        }
    }

    fn item(id: &str, text: &str) -> ContextItem {
        ContextItem {
            id: id.into(),
            text: text.into(),
            origin: Origin::Vector,
            similarity: Some(0.9),
            graph_rank: None,
            source_reference: format!("notes/{id}.md"),
        }
    }

    fn request<'a>(intent: Intent, context: &'a [ContextItem], history: &'a [Message]) -> ReasonRequest<'a> {
        ReasonRequest {
            query: "How does raft elect a leader?",
            intent,
            context,
            history,
            structural: false,
            partial: false,
            final_step: false,
        }
    }

    fn reasoner(model: Arc<Fixed>, window: usize) -> Reasoner {
        Reasoner::new(model, Duration::from_secs(5), 1000, 0.7, window)
    }

    #[test]
    fn parse_reply_strips_control_lines() {
        let r = parse_reply("Raft uses randomized timeouts.\n\nCONTINUE: yes\nSEARCH: leader election, terms");
        assert_eq!(r.draft, "Raft uses randomized timeouts.");
        assert!(r.should_continue);
        assert_eq!(r.follow_up, vec!["leader election", "terms"]);
    }

    #[test]
    fn missing_signal_means_stop() {
        let r = parse_reply("Just an answer.");
        assert_eq!(r.draft, "Just an answer.");
        assert!(!r.should_continue);
    }

    #[test]
    fn unrecognised_signal_means_stop() {
        let r = parse_reply("Answer\nCONTINUE: maybe\nSEARCH: x");
        assert!(!r.should_continue);
        assert!(r.follow_up.is_empty());
        assert_eq!(r.draft, "Answer");
    }

    #[test]
    fn signal_tolerates_markdown_and_case() {
        let r = parse_reply("Answer\n**Continue:** Yes\n`search: quorum`");
        assert!(r.should_continue);
        assert_eq!(r.follow_up, vec!["quorum"]);
    }

    #[test]
    fn context_renders_numbered_sources() {
        let text = render_context(&[item("a", "alpha"), item("b", "beta")]);
        assert_eq!(text, "[Source 1: notes/a.md]\nalpha\n\n---\n[Source 2: notes/b.md]\nbeta\n");
        assert_eq!(render_context(&[]), "No relevant context found.");
    }

    #[test]
    fn history_window_keeps_most_recent() {
        let history: Vec<Message> = (0..5).map(|i| Message::user(format!("turn {i}"))).collect();
        let text = render_history(&history, 2);
        assert!(!text.contains("turn 2"));
        assert!(text.contains("User: turn 3\nUser: turn 4"));
        assert_eq!(render_history(&[], 20), "");
    }

    #[test]
    fn structural_context_uses_structure_template() {
        let ctx = [item("a", "alpha")];
        let mut req = request(Intent::Search, &ctx, &[]);
        req.structural = true;
        assert!(build_prompt(&req, 20).contains("organised"));
    }

    #[test]
    fn add_prompt_has_no_control_protocol() {
        let prompt = build_prompt(&request(Intent::Add, &[], &[]), 20);
        assert!(!prompt.contains("CONTINUE"));
    }

    #[test]
    fn final_step_asks_model_to_stop() {
        let ctx = [item("a", "alpha")];
        let mut req = request(Intent::Reason, &ctx, &[]);
        req.final_step = true;
        let prompt = build_prompt(&req, 20);
        assert!(prompt.contains("CONTINUE: no"));
        assert!(!prompt.contains("SEARCH:"));
    }

    #[tokio::test]
    async fn empty_context_skips_model_for_evidence_intents() {
        let model = Arc::new(Fixed::new(Ok("should not be used".into())));
        let out = reasoner(model.clone(), 20)
            .reason(&request(Intent::Search, &[], &[]))
            .await
            .unwrap();
        assert_eq!(out.draft, NO_INFORMATION);
        assert!(!out.should_continue);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn general_intent_without_context_still_calls_model() {
        let model = Arc::new(Fixed::new(Ok("Hi there!\nCONTINUE: no".into())));
        let out = reasoner(model.clone(), 20)
            .reason(&request(Intent::General, &[], &[]))
            .await
            .unwrap();
        assert_eq!(out.draft, "Hi there!");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn source_failure_does_not_silence_general_or_add() {
        for intent in [Intent::General, Intent::Add] {
            let model = Arc::new(Fixed::new(Ok("Noted.\nCONTINUE: no".into())));
            let mut req = request(intent, &[], &[]);
            req.partial = true;
            let out = reasoner(model.clone(), 20).reason(&req).await.unwrap();
            assert_eq!(out.draft, "Noted.");
            assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn source_failure_with_evidence_intent_says_so() {
        let model = Arc::new(Fixed::new(Ok("should not be used".into())));
        let mut req = request(Intent::Search, &[], &[]);
        req.partial = true;
        let out = reasoner(model.clone(), 20).reason(&req).await.unwrap();
        assert_eq!(out.draft, format!("{NO_INFORMATION} {SOURCES_UNAVAILABLE}"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn prompt_carries_context_and_history() {
        let model = Arc::new(Fixed::new(Ok("Answer\nCONTINUE: no".into())));
        let ctx = [item("raft", "Raft elects a leader by majority vote.")];
        let history = [Message::user("tell me about consensus"), Message::assistant("Sure.")];
        reasoner(model.clone(), 20)
            .reason(&request(Intent::Search, &ctx, &history))
            .await
            .unwrap();
        let prompt = model.last_prompt.lock().unwrap().clone();
        assert!(prompt.contains("[Source 1: notes/raft.md]"));
        assert!(prompt.contains("User: tell me about consensus"));
        assert!(prompt.contains("Assistant: Sure."));
    }

    #[tokio::test]
    async fn model_failure_is_returned() {
        let model = Arc::new(Fixed::new(Err(LlmError::Transport("refused".into()))));
        let ctx = [item("a", "alpha")];
        let err = reasoner(model, 20)
            .reason(&request(Intent::Search, &ctx, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Transport(_)));
    }
}
