//! Consistent-hash ring for key-to-peer assignment (§4.I).
//!
//! Grounded on `lib/consistent_hash/consistent_hash.go`'s `NodeMap`:
//! CRC32 each node name onto a ring, then resolve a key to the first
//! node at or after its own CRC32 hash, wrapping around to the lowest
//! node if the key hashes past the last one. `Vec<i32>` + binary search
//! becomes `BTreeMap<u32, String>` + `range(hash..).next()`.

use std::collections::BTreeMap;

use crc32fast::Hasher;

#[derive(Debug, Default)]
pub struct HashRing {
    ring: BTreeMap<u32, String>,
}

impl HashRing {
    pub fn new() -> HashRing {
        HashRing::default()
    }

    pub fn add_node(&mut self, node: impl Into<String>) {
        let node = node.into();
        if node.is_empty() {
            return;
        }
        self.ring.insert(crc32(node.as_bytes()), node);
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Returns the node owning `key`, or `None` if the ring has no
    /// nodes.
    pub fn get_node(&self, key: &[u8]) -> Option<&str> {
        if self.ring.is_empty() {
            return None;
        }
        let hash = crc32(key);
        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, node)| node.as_str())
    }
}

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_has_no_owner() {
        let ring = HashRing::new();
        assert_eq!(ring.get_node(b"k"), None);
    }

    #[test]
    fn single_node_owns_every_key() {
        let mut ring = HashRing::new();
        ring.add_node("node-a");
        assert_eq!(ring.get_node(b"anything"), Some("node-a"));
        assert_eq!(ring.get_node(b"else"), Some("node-a"));
    }

    #[test]
    fn same_key_always_maps_to_the_same_node() {
        let mut ring = HashRing::new();
        for node in ["a:1", "b:2", "c:3", "d:4"] {
            ring.add_node(node);
        }
        let first = ring.get_node(b"user:42").map(str::to_string);
        for _ in 0..20 {
            assert_eq!(ring.get_node(b"user:42").map(str::to_string), first);
        }
    }

    #[test]
    fn ignores_empty_node_names() {
        let mut ring = HashRing::new();
        ring.add_node("");
        assert!(ring.is_empty());
    }
}
