//! Duplicate Suppression
//!
//! Retransmissions of a message already delivered must be acknowledged again
//! (the first ack may have been lost) but not delivered twice. The filter
//! remembers the most recent `(origin, PRN)` pairs in arrival order and
//! forgets the oldest once full.

use crate::address::Address;
use crate::prn::Prn;
use std::collections::{HashSet, VecDeque};

/// Default number of remembered messages
pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// Identity of a delivered message
pub type MessageId = (Address, Prn);

/// Bounded FIFO set of recently delivered messages
#[derive(Debug, Clone)]
pub struct RecentPrns {
    order: VecDeque<MessageId>,
    seen: HashSet<MessageId>,
    capacity: usize,
}

impl RecentPrns {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DEDUP_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RecentPrns {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, origin: Address, prn: Prn) -> bool {
        self.seen.contains(&(origin, prn))
    }

    /// Record a message, returning `true` if it had not been seen
    pub fn insert(&mut self, origin: Address, prn: Prn) -> bool {
        let id = (origin, prn);
        if !self.seen.insert(id) {
            return false;
        }

        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

impl Default for RecentPrns {
    fn default() -> Self {
        Self::new()
    }
}
