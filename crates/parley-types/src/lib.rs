//! Shared domain types for Parley.
//!
//! This crate contains the domain types used across the Parley engine:
//! turns and sessions, exchange identity, LLM request/stream shapes,
//! configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod exchange;
pub mod llm;
