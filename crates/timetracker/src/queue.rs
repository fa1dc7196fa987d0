//! Deferred removal of timer ids.
//!
//! The queue has its own lock so `cancel` never waits behind the registry
//! while a dispatch pass is firing actions. Only the dispatch cleanup phase
//! drains it.

use parking_lot::Mutex;

use crate::record::TimerId;

#[derive(Debug, Default)]
pub(crate) struct CleanupQueue {
    pending: Mutex<Vec<TimerId>>,
}

impl CleanupQueue {
    pub(crate) fn push(&self, id: TimerId) {
        self.pending.lock().push(id);
    }

    /// Take every queued id, leaving the queue empty.
    pub(crate) fn drain(&self) -> Vec<TimerId> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }
}
