//! Event registry: the id map and the trigger-ordered sequence.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{TimerError, TimerResult};
use crate::record::{TimerId, TimerRecord};
use crate::time::Timestamp;

/// Both views of the live records. Callers hold the registry lock.
///
/// A record is in `by_id` exactly when it is in `sorted`.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    next_id: u64,
    by_id: HashMap<TimerId, Arc<TimerRecord>>,
    sorted: Vec<Arc<TimerRecord>>,
}

impl Registry {
    /// Hand out the next id. The counter never goes backwards.
    pub(crate) fn allocate_id(&mut self) -> TimerResult<TimerId> {
        let id = TimerId::from_raw(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or(TimerError::IdSpaceExhausted)?;
        Ok(id)
    }

    pub(crate) fn insert(&mut self, record: Arc<TimerRecord>) {
        self.by_id.insert(record.id(), Arc::clone(&record));
        self.sorted.push(record);
        self.sort();
    }

    /// Stable sort by trigger time; equal triggers keep registration order.
    fn sort(&mut self) {
        self.sorted.sort_by_cached_key(|record| record.trigger_at());
    }

    /// Re-sort and copy the ordered sequence for a dispatch pass.
    pub(crate) fn snapshot_sorted(&mut self) -> Vec<Arc<TimerRecord>> {
        self.sort();
        self.sorted.clone()
    }

    /// Remove `id` from both views. False if it was not present.
    pub(crate) fn erase(&mut self, id: TimerId) -> bool {
        if self.by_id.remove(&id).is_none() {
            return false;
        }
        if let Some(pos) = self.sorted.iter().position(|record| record.id() == id) {
            self.sorted.remove(pos);
        }
        true
    }

    pub(crate) fn get(&self, id: TimerId) -> Option<&Arc<TimerRecord>> {
        self.by_id.get(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Ids in current sequence order.
    pub(crate) fn ordered_ids(&self) -> Vec<TimerId> {
        self.sorted.iter().map(|record| record.id()).collect()
    }

    /// Earliest trigger among records that can still fire.
    pub(crate) fn next_trigger(&self) -> Option<Timestamp> {
        self.sorted
            .iter()
            .filter(|record| record.is_active())
            .map(|record| record.trigger_at())
            .min()
    }
}
