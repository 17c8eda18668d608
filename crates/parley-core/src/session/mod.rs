//! Session persistence seam and live session snapshots.

pub mod hub;
pub mod store;

pub use hub::SessionHub;
pub use store::SessionStore;
