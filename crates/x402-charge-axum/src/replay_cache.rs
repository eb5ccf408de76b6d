//! Bounded set of transaction ids that already admitted a request.
//!
//! The cache only short-circuits obvious replays. It is not the source of truth for
//! double spending: the payment service's atomic claim is.

use std::collections::{HashSet, VecDeque};
use x402_charge_types::transaction_id::TransactionId;

/// FIFO-evicting set of accepted transaction ids.
#[derive(Debug)]
pub struct ReplayCache {
    capacity: usize,
    members: HashSet<TransactionId>,
    order: VecDeque<TransactionId>,
}

impl ReplayCache {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            members: HashSet::with_capacity(capacity.min(1024)),
            order: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &TransactionId) -> bool {
        self.members.contains(id)
    }

    /// Inserts `id`, evicting the oldest entry first when full.
    ///
    /// Returns the evicted id, if any. Inserting an id already present changes nothing.
    pub fn insert(&mut self, id: TransactionId) -> Option<TransactionId> {
        if self.members.contains(&id) {
            return None;
        }
        let evicted = if self.order.len() >= self.capacity {
            let oldest = self.order.pop_front();
            if let Some(oldest) = &oldest {
                self.members.remove(oldest);
            }
            oldest
        } else {
            None
        };
        self.members.insert(id.clone());
        self.order.push_back(id);
        evicted
    }
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> TransactionId {
        format!("{n:08x}-0000-0000-0000-000000000000").parse().unwrap()
    }

    #[test]
    fn remembers_inserted_ids() {
        let mut cache = ReplayCache::new(4);
        assert!(cache.is_empty());
        assert!(!cache.contains(&id(1)));
        assert_eq!(cache.insert(id(1)), None);
        assert!(cache.contains(&id(1)));
        assert!(!cache.is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut cache = ReplayCache::new(3);
        cache.insert(id(1));
        cache.insert(id(2));
        cache.insert(id(3));
        assert_eq!(cache.insert(id(4)), Some(id(1)));
        assert_eq!(cache.insert(id(5)), Some(id(2)));
        assert!(!cache.contains(&id(1)));
        assert!(!cache.contains(&id(2)));
        assert!(cache.contains(&id(3)));
        assert!(cache.contains(&id(4)));
        assert!(cache.contains(&id(5)));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn duplicate_insert_does_not_refresh_position() {
        let mut cache = ReplayCache::new(2);
        cache.insert(id(1));
        cache.insert(id(2));
        assert_eq!(cache.insert(id(1)), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.insert(id(3)), Some(id(1)));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut cache = ReplayCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert(id(1));
        assert_eq!(cache.insert(id(2)), Some(id(1)));
        assert!(cache.contains(&id(2)));
    }
}
