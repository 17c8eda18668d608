//! Streaming exchanges with the model transport and their cancellation.

pub mod coordinator;
pub mod registry;

pub use coordinator::{ExchangeCoordinator, ExchangeHandle, error_block};
pub use registry::CancellationRegistry;
