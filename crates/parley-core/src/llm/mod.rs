//! Model transport abstractions for Parley.
//!
//! - `LlmProvider`: RPITIT trait for concrete transport implementations
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch

pub mod box_provider;
pub mod provider;
