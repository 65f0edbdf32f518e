use crate::model::{SyncQueueItem, UserState};

const MS_PER_DAY: i64 = 86_400_000;

/// Offline mutations waiting for replay. Owned by the reconciler of one
/// session; persisted through the local store after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncQueue {
    items: Vec<SyncQueueItem>,
    max_items: usize,
    retention_ms: i64,
}

impl SyncQueue {
    #[cfg(test)]
    pub fn new(max_items: usize, retention_days: i64) -> Self {
        Self::from_items(Vec::new(), max_items, retention_days)
    }

    pub fn from_items(items: Vec<SyncQueueItem>, max_items: usize, retention_days: i64) -> Self {
        let mut queue = Self {
            items,
            max_items: max_items.max(1),
            retention_ms: retention_days.max(0) * MS_PER_DAY,
        };
        queue.items.sort_by_key(|i| i.enqueued_at_ms);
        queue.evict_overflow();
        queue
    }

    pub fn items(&self) -> &[SyncQueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn evict_overflow(&mut self) {
        if self.items.len() > self.max_items {
            let excess = self.items.len() - self.max_items;
            self.items.drain(..excess);
        }
    }

    /// Keeps only the newest pending snapshot per owner; the oldest items are
    /// evicted once the cap is exceeded.
    pub fn enqueue(&mut self, owner_id: i64, payload: UserState, now_ms: i64) {
        self.items.retain(|i| i.owner_id != owner_id);
        self.items.push(SyncQueueItem {
            owner_id,
            payload,
            enqueued_at_ms: now_ms,
        });
        self.evict_overflow();
    }

    pub fn has_owner(&self, owner_id: i64) -> bool {
        self.items.iter().any(|i| i.owner_id == owner_id)
    }

    /// Drops the owner's pending snapshot, once a newer one reached the
    /// backend. Returns whether there was one.
    pub fn remove_owner(&mut self, owner_id: i64) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.owner_id != owner_id);
        before != self.items.len()
    }

    /// Drops items older than the retention window. Returns how many went.
    pub fn prune_expired(&mut self, now_ms: i64) -> usize {
        let before = self.items.len();
        let horizon = now_ms - self.retention_ms;
        self.items.retain(|i| i.enqueued_at_ms >= horizon);
        before - self.items.len()
    }

    /// Replays items in enqueue order. Items the processor accepts are
    /// removed; failed ones stay for a later attempt. Returns the number
    /// processed successfully.
    pub fn process_queue<E, F>(&mut self, now_ms: i64, mut processor: F) -> usize
    where
        F: FnMut(&SyncQueueItem) -> Result<(), E>,
    {
        self.prune_expired(now_ms);
        let mut done = 0usize;
        self.items.retain(|item| match processor(item) {
            Ok(()) => {
                done += 1;
                false
            }
            Err(_) => true,
        });
        done
    }
}
