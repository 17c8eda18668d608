//! Rolling memory: summary compaction and topic derivation.
//!
//! Both run as detached background tasks after a turn completes. Each keeps
//! a per-session in-flight set so a second trigger while one call is
//! outstanding is a no-op.

pub mod compaction;
pub mod title;

use std::sync::Arc;

use dashmap::DashSet;
use uuid::Uuid;

use parley_types::chat::{RollingMemory, Turn};

pub use compaction::{CompactionOutcome, CompactionPlan, CompactionScheduler, plan_compaction};
pub use title::{TitleDeriver, TitleOutcome, trim_topic};

/// Prefix of the system turn that carries the rolling summary.
pub const SUMMARY_PREFIX: &str = "This is a summary of the chat history as a recap: ";

/// The rolling summary as a system turn, if there is one.
pub fn summary_turn(memory: &RollingMemory) -> Option<Turn> {
    memory
        .has_summary()
        .then(|| Turn::system(format!("{SUMMARY_PREFIX}{}", memory.summary)))
}

/// Marks a session busy in an in-flight set until dropped.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    set: Arc<DashSet<Uuid>>,
    session_id: Uuid,
}

impl InFlightGuard {
    /// `None` when the session is already marked.
    pub(crate) fn acquire(set: &Arc<DashSet<Uuid>>, session_id: Uuid) -> Option<Self> {
        set.insert(session_id).then(|| Self {
            set: Arc::clone(set),
            session_id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.session_id);
    }
}
