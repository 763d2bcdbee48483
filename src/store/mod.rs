//! Sharded concurrent key-value store (§4.C).
//!
//! Grounded on `data_struct/dict/sharded_dict.go`: a fixed array of
//! shards selected by FNV-1a, one atomic counter for total size. The
//! original shards a `sync.Map`; here each shard is a plain
//! `RwLock<HashMap<..>>`, since Rust's stdlib has no sharded-map
//! primitive and per-shard locking already bounds contention to 1/16th
//! of the keyspace.

mod entity;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use bytes::Bytes;
use rand::Rng;

pub use entity::{Entity, Value};

const NUM_SHARDS: usize = 16;

/// Thread-safe key/value store, sharded for reduced lock contention.
#[derive(Debug)]
pub struct ShardedDict {
    shards: Vec<RwLock<HashMap<Bytes, Entity>>>,
    count: AtomicI64,
}

impl Default for ShardedDict {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardedDict {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        ShardedDict {
            shards,
            count: AtomicI64::new(0),
        }
    }

    fn shard_for(&self, key: &[u8]) -> &RwLock<HashMap<Bytes, Entity>> {
        &self.shards[fnv1a(key) as usize % NUM_SHARDS]
    }

    pub fn get(&self, key: &[u8]) -> Option<Entity> {
        let shard = self.shard_for(key);
        let guard = shard.read().unwrap_or_else(|e| e.into_inner());
        guard.get(key).cloned()
    }

    /// Stores unconditionally. Returns 1 if the key was new, 0 if it
    /// already existed (its value is replaced either way).
    pub fn set(&self, key: Bytes, value: Entity) -> u64 {
        let shard = self.shard_for(&key);
        let mut guard = shard.write().unwrap_or_else(|e| e.into_inner());
        let existed = guard.insert(key, value).is_some();
        drop(guard);
        if existed {
            0
        } else {
            self.count.fetch_add(1, Ordering::SeqCst);
            1
        }
    }

    pub fn set_if_absent(&self, key: Bytes, value: Entity) -> u64 {
        let shard = self.shard_for(&key);
        let mut guard = shard.write().unwrap_or_else(|e| e.into_inner());
        if guard.contains_key(&key) {
            0
        } else {
            guard.insert(key, value);
            drop(guard);
            self.count.fetch_add(1, Ordering::SeqCst);
            1
        }
    }

    pub fn set_if_exists(&self, key: Bytes, value: Entity) -> u64 {
        let shard = self.shard_for(&key);
        let mut guard = shard.write().unwrap_or_else(|e| e.into_inner());
        if guard.contains_key(&key) {
            guard.insert(key, value);
            1
        } else {
            0
        }
    }

    pub fn delete(&self, key: &[u8]) -> u64 {
        let shard = self.shard_for(key);
        let mut guard = shard.write().unwrap_or_else(|e| e.into_inner());
        let removed = guard.remove(key).is_some();
        drop(guard);
        if removed {
            self.count.fetch_sub(1, Ordering::SeqCst);
            1
        } else {
            0
        }
    }

    pub fn get_and_delete(&self, key: &[u8]) -> Option<Entity> {
        let shard = self.shard_for(key);
        let mut guard = shard.write().unwrap_or_else(|e| e.into_inner());
        let removed = guard.remove(key);
        drop(guard);
        if removed.is_some() {
            self.count.fetch_sub(1, Ordering::SeqCst);
        }
        removed
    }

    pub fn length(&self) -> usize {
        self.count.load(Ordering::SeqCst).max(0) as usize
    }

    /// Visits every (key, entity, expiration) triple; `f` returning
    /// `false` aborts the traversal early. Each shard is snapshotted
    /// independently, so concurrent mutations produce a
    /// weakly-consistent view.
    pub fn for_each(&self, mut f: impl FnMut(&Bytes, &Entity, Option<i64>) -> bool) {
        for shard in &self.shards {
            let guard = shard.read().unwrap_or_else(|e| e.into_inner());
            for (key, entity) in guard.iter() {
                if !f(key, entity, entity.expire_at) {
                    return;
                }
            }
        }
    }

    pub fn keys(&self) -> Vec<Bytes> {
        let mut out = Vec::with_capacity(self.length());
        for shard in &self.shards {
            let guard = shard.read().unwrap_or_else(|e| e.into_inner());
            out.extend(guard.keys().cloned());
        }
        out
    }

    pub fn random_keys(&self, n: usize) -> Vec<Bytes> {
        self.sample(n, false)
    }

    pub fn random_distinct_keys(&self, n: usize) -> Vec<Bytes> {
        self.sample(n, true)
    }

    fn sample(&self, n: usize, distinct: bool) -> Vec<Bytes> {
        if n == 0 || self.length() == 0 {
            return Vec::new();
        }
        let mut result = Vec::with_capacity(n);
        let mut seen = std::collections::HashSet::new();
        let mut rng = rand::thread_rng();
        let mut empty_rounds = 0;
        while result.len() < n {
            let shard_idx = rng.gen_range(0..NUM_SHARDS);
            let guard = self.shards[shard_idx]
                .read()
                .unwrap_or_else(|e| e.into_inner());
            if guard.is_empty() {
                drop(guard);
                empty_rounds += 1;
                if empty_rounds > NUM_SHARDS * 4 {
                    break;
                }
                continue;
            }
            empty_rounds = 0;
            for key in guard.keys() {
                if result.len() >= n {
                    break;
                }
                if distinct {
                    if seen.insert(key.clone()) {
                        result.push(key.clone());
                    }
                } else {
                    result.push(key.clone());
                }
            }
        }
        result
    }

    /// Drops every shard's contents and resets the counter to 0.
    /// Concurrent writers racing this call may transiently over- or
    /// under-count until every shard has been replaced.
    pub fn clear(&self) {
        for shard in &self.shards {
            let mut guard = shard.write().unwrap_or_else(|e| e.into_inner());
            guard.clear();
        }
        self.count.store(0, Ordering::SeqCst);
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(s: &str) -> Entity {
        Entity::of_bytes(Bytes::copy_from_slice(s.as_bytes()))
    }

    #[test]
    fn set_reports_new_vs_replace() {
        let dict = ShardedDict::new();
        assert_eq!(dict.set(Bytes::from_static(b"k"), entity("v1")), 1);
        assert_eq!(dict.set(Bytes::from_static(b"k"), entity("v2")), 0);
        assert_eq!(dict.length(), 1);
        assert_eq!(dict.get(b"k"), Some(entity("v2")));
    }

    #[test]
    fn set_if_absent_and_set_if_exists() {
        let dict = ShardedDict::new();
        assert_eq!(dict.set_if_absent(Bytes::from_static(b"k"), entity("v1")), 1);
        assert_eq!(dict.set_if_absent(Bytes::from_static(b"k"), entity("v2")), 0);
        assert_eq!(dict.get(b"k"), Some(entity("v1")));

        assert_eq!(dict.set_if_exists(Bytes::from_static(b"missing"), entity("x")), 0);
        assert_eq!(dict.set_if_exists(Bytes::from_static(b"k"), entity("v3")), 1);
        assert_eq!(dict.get(b"k"), Some(entity("v3")));
    }

    #[test]
    fn delete_and_get_and_delete() {
        let dict = ShardedDict::new();
        dict.set(Bytes::from_static(b"k"), entity("v"));
        assert_eq!(dict.delete(b"missing"), 0);
        assert_eq!(dict.get_and_delete(b"k"), Some(entity("v")));
        assert_eq!(dict.length(), 0);
        assert_eq!(dict.get(b"k"), None);
    }

    #[test]
    fn for_each_visits_every_entry() {
        let dict = ShardedDict::new();
        for i in 0..50 {
            dict.set(Bytes::from(format!("k{i}")), entity("v"));
        }
        let mut seen = 0;
        dict.for_each(|_, _, _| {
            seen += 1;
            true
        });
        assert_eq!(seen, 50);
    }

    #[test]
    fn for_each_can_abort_early() {
        let dict = ShardedDict::new();
        for i in 0..50 {
            dict.set(Bytes::from(format!("k{i}")), entity("v"));
        }
        let mut seen = 0;
        dict.for_each(|_, _, _| {
            seen += 1;
            seen < 5
        });
        assert_eq!(seen, 5);
    }

    #[test]
    fn clear_resets_everything() {
        let dict = ShardedDict::new();
        dict.set(Bytes::from_static(b"k"), entity("v"));
        dict.clear();
        assert_eq!(dict.length(), 0);
        assert!(dict.keys().is_empty());
    }

    #[test]
    fn random_distinct_keys_deduplicates() {
        let dict = ShardedDict::new();
        for i in 0..20 {
            dict.set(Bytes::from(format!("k{i}")), entity("v"));
        }
        let sampled = dict.random_distinct_keys(10);
        assert_eq!(sampled.len(), 10);
        let unique: std::collections::HashSet<_> = sampled.iter().collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn concurrent_set_if_absent_exactly_one_winner() {
        use std::sync::Arc;
        use std::thread;

        let dict = Arc::new(ShardedDict::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let dict = Arc::clone(&dict);
            handles.push(thread::spawn(move || {
                dict.set_if_absent(Bytes::from_static(b"contested"), entity("v"))
            }));
        }
        let wins: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(wins, 1);
    }
}
