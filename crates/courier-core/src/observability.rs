use serde::{Deserialize, Serialize};

use crate::domain::RecordState;

/// Per-pass counters, one bucket per final record state.
///
/// `failed` covers claim, execution and finalize failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub due: usize,
    pub persisted: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl PassSummary {
    pub fn new(due: usize) -> Self {
        Self {
            due,
            ..Self::default()
        }
    }

    /// Count one record that reached `state`.
    pub fn observe(&mut self, state: RecordState) {
        match state {
            RecordState::Persisted => self.persisted += 1,
            RecordState::Removed => self.removed += 1,
            RecordState::Skipped => self.skipped += 1,
            RecordState::Cancelled => self.cancelled += 1,
            failed if failed.is_failure() => self.failed += 1,
            _ => {}
        }
    }

    /// Records that were executed and finalized.
    pub fn succeeded(&self) -> usize {
        self.persisted + self.removed
    }

    /// Records that reached a final state; equals `due` once a pass has finished.
    pub fn settled(&self) -> usize {
        self.succeeded() + self.skipped + self.failed + self.cancelled
    }
}
