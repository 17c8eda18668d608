//! Conversation engine for Parley.
//!
//! Decides which turns are sent to the model under a token budget, keeps a
//! rolling summary of older history, and coordinates cancellable streaming
//! exchanges. Persistence and the model transport are ports (`SessionStore`,
//! `LlmProvider`) implemented in `parley-infra` -- this crate never touches
//! a database, the network, or the filesystem.

pub mod context;
pub mod engine;
pub mod exchange;
pub mod llm;
pub mod memory;
pub mod session;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{ChatEngine, UserInput};
