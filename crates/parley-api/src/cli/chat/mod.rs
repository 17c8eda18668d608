//! Interactive CLI chat for Parley.
//!
//! Streams replies as they arrive, maps slash commands onto engine
//! operations, and lets Ctrl+C cancel a reply in flight. Entry point:
//! `loop_runner::run_chat_loop`.

pub mod banner;
pub mod commands;
pub mod input;
pub mod loop_runner;
pub mod renderer;
