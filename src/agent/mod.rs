//! The iterative dual-retrieval reasoning agent.
//!
//! A turn moves through classification, retrieval, reasoning (possibly looping
//! back to retrieval a bounded number of times) and response composition.
//! [`Agent`] is the entry point; the stage modules are usable on their own.

pub mod classify;
pub mod controller;
pub mod reason;
pub mod respond;
pub mod retrieve;
pub mod state;

pub use controller::{Agent, Phase};
pub use state::{ContextItem, Intent, Message, Origin, Role, TurnResult, TurnStatus};
