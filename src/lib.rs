//! Personal knowledge agent with iterative dual retrieval.
//!
//! Mneme answers questions about a personal knowledge base by combining two
//! retrieval sources, a vector similarity index and a knowledge graph, and
//! reasoning over the fused context with a language model. When the model
//! decides the evidence is insufficient it asks for another retrieval round,
//! up to a fixed budget.
//!
//! | Phase | What happens |
//! |-------|--------------|
//! | **Understand** | Classify intent and extract entities (model, with keyword fallback) |
//! | **Retrieve** | Query vector and graph stores concurrently, fuse and deduplicate |
//! | **Reason** | Draft an answer; optionally request another retrieval round |
//! | **Respond** | Attach ordered, deduplicated citations |
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`knowledge`]: Vector/graph store traits and the bundled in-memory corpus
//! - [`llm`]: Language model trait, retry policy, and the OpenRouter client
//! - [`agent`]: Classifier, dual retriever, reasoner, composer, and the loop controller

pub mod agent;
pub mod config;
pub mod knowledge;
pub mod llm;
