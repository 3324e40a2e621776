use std::collections::BTreeMap;
use std::time::Duration;

use super::object::{PopulationObject, SchedulerKey};

/// Keyed queue of population objects awaiting materialization. Objects
/// leave in due-time order, ties in insertion order.
#[derive(Debug, Clone)]
pub struct SpawnScheduler {
    key: SchedulerKey,
    queue: BTreeMap<(Duration, u64), PopulationObject>,
    next_sequence: u64,
}

impl SpawnScheduler {
    pub fn new(key: SchedulerKey) -> Self {
        Self {
            key,
            queue: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    pub fn key(&self) -> &SchedulerKey {
        &self.key
    }

    pub fn push(&mut self, mut object: PopulationObject) -> &PopulationObject {
        object.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.entry((object.due, object.sequence)).or_insert(object)
    }

    /// Puts back an object taken by `take_due`, keeping its original
    /// insertion order.
    pub fn restore(&mut self, object: PopulationObject) {
        self.queue.insert((object.due, object.sequence), object);
    }

    /// True while any object is queued.
    pub fn any(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    pub fn has_due(&self, now: Duration) -> bool {
        self.next_due().map_or(false, |due| due <= now)
    }

    /// Removes up to `limit` objects whose due time has elapsed.
    pub fn take_due(&mut self, now: Duration, limit: usize) -> Vec<PopulationObject> {
        let mut taken = Vec::new();
        while taken.len() < limit {
            match self.queue.first_key_value() {
                Some(((due, _), _)) if *due <= now => {}
                _ => break,
            }
            if let Some((_, object)) = self.queue.pop_first() {
                taken.push(object);
            }
        }
        taken
    }

    pub fn pending(&self) -> impl Iterator<Item = &PopulationObject> {
        self.queue.values()
    }

    /// Drops everything still queued and returns how many objects were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }
}
