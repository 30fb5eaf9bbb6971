//! Remembered mutation outcomes, keyed by (owner, idempotency key).
//!
//! A repeated request with a known key gets the original answer back instead
//! of being applied again. Only successes are remembered; a failed attempt is
//! re-evaluated on retry. Bounded FIFO: the oldest keys are forgotten first.

use std::collections::{HashMap, VecDeque};

use sv_core::{IdempotencyKey, RecordId, WireRecord};

pub(crate) const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Created(WireRecord),
    Replaced(WireRecord),
    Deleted(RecordId),
}

type Slot = (String, IdempotencyKey);

#[derive(Debug)]
pub(crate) struct ReplayCache {
    outcomes: HashMap<Slot, Outcome>,
    order: VecDeque<Slot>,
    capacity: usize,
}

impl ReplayCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            outcomes: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn get(&self, owner: &str, key: &IdempotencyKey) -> Option<&Outcome> {
        self.outcomes.get(&(owner.to_string(), key.clone()))
    }

    pub(crate) fn remember(&mut self, owner: &str, key: &IdempotencyKey, outcome: Outcome) {
        let slot = (owner.to_string(), key.clone());
        if self.outcomes.insert(slot.clone(), outcome).is_none() {
            self.order.push_back(slot);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.outcomes.remove(&oldest);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.outcomes.len()
    }
}
