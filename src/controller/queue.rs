// src/controller/queue.rs

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::model::ObjectKey;

/// FIFO queue of run keys awaiting reconciliation.
///
/// A key that is already pending is not queued a second time; bursts of
/// events for one run collapse into a single reconcile.
#[derive(Debug, Default)]
pub struct WorkQueue {
    order: VecDeque<ObjectKey>,
    pending: HashSet<ObjectKey>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `key`. Returns `false` if it was already pending.
    pub fn push(&mut self, key: ObjectKey) -> bool {
        if !self.pending.insert(key.clone()) {
            debug!(run = %key, "run already queued; collapsing");
            return false;
        }
        self.order.push_back(key);
        true
    }

    pub fn pop(&mut self) -> Option<ObjectKey> {
        let key = self.order.pop_front()?;
        self.pending.remove(&key);
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
