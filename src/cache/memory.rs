//! In-process cache tier
//!
//! A bounded map of JSON values with per-entry TTL. Insertion order is kept in
//! a sequence-keyed `BTreeMap` so eviction of the oldest entries is a pop from
//! the front rather than a scan.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
    seq: u64,
    tags: Vec<String>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }
}

#[derive(Debug)]
pub struct MemoryTier {
    entries: HashMap<String, MemoryEntry>,
    insertion_order: BTreeMap<u64, String>,
    next_seq: u64,
    max_entries: usize,
}

impl MemoryTier {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: BTreeMap::new(),
            next_seq: 0,
            max_entries,
        }
    }

    /// Look up a live entry; an expired entry is removed on the way out
    pub fn get(&mut self, key: &str, now: Instant) -> Option<Value> {
        let expired = self.entries.get(key)?.is_expired(now);
        if expired {
            self.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store a value, evicting if the tier grows past its bound
    ///
    /// Returns the number of entries evicted by the cleanup pass.
    pub fn insert(
        &mut self,
        key: String,
        value: Value,
        ttl: Duration,
        tags: Vec<String>,
        now: Instant,
    ) -> usize {
        // re-inserting refreshes the entry's position in the eviction order
        self.remove(&key);

        let seq = self.next_seq;
        self.next_seq += 1;
        self.insertion_order.insert(seq, key.clone());
        self.entries.insert(
            key,
            MemoryEntry {
                value,
                stored_at: now,
                ttl,
                seq,
                tags,
            },
        );

        if self.entries.len() > self.max_entries {
            self.cleanup(now)
        } else {
            0
        }
    }

    /// Drop expired entries, then the oldest until back under the bound
    pub fn cleanup(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        let mut removed = 0;
        for key in expired {
            if self.remove(&key) {
                removed += 1;
            }
        }

        while self.entries.len() > self.max_entries {
            let Some((_, key)) = self.insertion_order.pop_first() else {
                break;
            };
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.insertion_order.remove(&entry.seq);
                true
            }
            None => false,
        }
    }

    /// Remove every key containing `pattern`
    pub fn remove_matching(&mut self, pattern: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.contains(pattern))
            .cloned()
            .collect();
        keys.iter().filter(|key| self.remove(key)).count()
    }

    /// Remove every entry stored with `tag`
    pub fn remove_tagged(&mut self, tag: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.tags.iter().any(|t| t == tag))
            .map(|(key, _)| key.clone())
            .collect();
        keys.iter().filter(|key| self.remove(key)).count()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.insertion_order.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order, oldest first
    pub fn keys(&self) -> Vec<String> {
        self.insertion_order.values().cloned().collect()
    }
}
