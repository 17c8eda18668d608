//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`: the
//! OpenAI-compatible streaming model transport, an in-memory session store,
//! and the `config.toml` loader.

pub mod config;
pub mod llm;
pub mod store;
