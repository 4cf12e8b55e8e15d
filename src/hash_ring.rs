//! Ketama-style consistent hash ring mapping a symbol to exactly one
//! worker, stable under pool membership changes (C5).

use crate::error::RingError;
use moka::sync::Cache;
use std::collections::HashMap;

const VIRTUAL_NODES: u32 = 80;
const POINTS_PER_NODE: u32 = 4;

/// A single point on the ring: a 32-bit hash and the worker it maps to.
#[derive(Debug, Clone, Copy)]
struct RingPoint {
    hash: u32,
    worker_id: u32,
}

/// Consistent hash ring over a pool of worker ids.
pub struct ConsistentHashRing {
    points: Vec<RingPoint>,
    members: HashMap<u32, u32>, // worker_id -> point count, for load_distribution bookkeeping
    assignment_cache: Cache<String, u32>,
}

impl Default for ConsistentHashRing {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsistentHashRing {
    pub fn new() -> Self {
        ConsistentHashRing {
            points: Vec::new(),
            members: HashMap::new(),
            assignment_cache: Cache::builder().max_capacity(1_000_000).build(),
        }
    }

    /// Adds a worker, inserting `VIRTUAL_NODES * POINTS_PER_NODE` ring
    /// points for it, and invalidates the assignment cache.
    pub fn add_worker(&mut self, worker_id: u32) {
        if self.members.contains_key(&worker_id) {
            return;
        }

        for v in 0..VIRTUAL_NODES {
            for k in 0..POINTS_PER_NODE {
                let key = format!("{worker_id}-{v}-{k}");
                self.points.push(RingPoint {
                    hash: murmur3_finalize_str(&key),
                    worker_id,
                });
            }
        }
        self.points.sort_by_key(|p| p.hash);
        self.members
            .insert(worker_id, VIRTUAL_NODES * POINTS_PER_NODE);
        self.assignment_cache.invalidate_all();
    }

    /// Removes a worker and every ring point it owns, invalidating the
    /// assignment cache.
    pub fn remove_worker(&mut self, worker_id: u32) {
        if self.members.remove(&worker_id).is_none() {
            return;
        }
        self.points.retain(|p| p.worker_id != worker_id);
        self.assignment_cache.invalidate_all();
    }

    /// Returns the worker owning `symbol`: the first ring point whose hash
    /// is `>= hash(symbol)`, wrapping to the first point at the end.
    pub fn worker_for(&self, symbol: &str) -> Result<u32, RingError> {
        if self.points.is_empty() {
            return Err(RingError::Empty);
        }

        if let Some(cached) = self.assignment_cache.get(symbol) {
            return Ok(cached);
        }

        let target = murmur3_finalize_str(symbol);
        let idx = self
            .points
            .partition_point(|p| p.hash < target)
            .min(self.points.len() - 1);
        let worker_id = self.points[idx].worker_id;

        self.assignment_cache.insert(symbol.to_string(), worker_id);
        Ok(worker_id)
    }

    /// Count of symbols, from `symbols`, assigned to each worker.
    pub fn load_distribution(&self, symbols: &[String]) -> HashMap<u32, usize> {
        let mut counts = HashMap::new();
        for symbol in symbols {
            if let Ok(worker_id) = self.worker_for(symbol) {
                *counts.entry(worker_id).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// MurmurHash3-style 32-bit mixing finalizer over a byte sequence, used
/// both for ring points (`"<workerId>-<v>-<k>"`) and symbol lookups.
fn murmur3_finalize_str(data: &str) -> u32 {
    murmur3_finalize(data.as_bytes())
}

fn murmur3_finalize(data: &[u8]) -> u32 {
    // Fold the byte sequence into a 32-bit seed with a simple FNV-style
    // mix, then run it through MurmurHash3's own finalizer (fmix32) so
    // short, similar-looking keys still scatter across the ring.
    let mut h: u32 = 2166136261;
    for &byte in data {
        h ^= byte as u32;
        h = h.wrapping_mul(16777619);
    }

    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn empty_ring_errors() {
        let ring = ConsistentHashRing::new();
        assert_eq!(ring.worker_for("BTCUSDT"), Err(RingError::Empty));
    }

    #[test]
    fn routing_is_deterministic_for_fixed_membership() {
        let mut ring = ConsistentHashRing::new();
        ring.add_worker(1);
        ring.add_worker(2);
        ring.add_worker(3);

        let symbols = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "DOGEUSDT", "XRPUSDT"];
        let first_pass: Vec<u32> = symbols.iter().map(|s| ring.worker_for(s).unwrap()).collect();
        let second_pass: Vec<u32> = symbols.iter().map(|s| ring.worker_for(s).unwrap()).collect();
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn routing_is_invariant_to_add_order_of_the_same_member_set() {
        let mut ring_a = ConsistentHashRing::new();
        ring_a.add_worker(1);
        ring_a.add_worker(2);
        ring_a.add_worker(3);

        let mut ring_b = ConsistentHashRing::new();
        ring_b.add_worker(3);
        ring_b.add_worker(1);
        ring_b.add_worker(2);

        let symbols: Vec<String> = (0..200).map(|i| format!("SYM{i}USDT")).collect();
        for s in &symbols {
            assert_eq!(ring_a.worker_for(s), ring_b.worker_for(s));
        }
    }

    #[test]
    fn adding_one_worker_rebalances_a_bounded_fraction() {
        let mut ring = ConsistentHashRing::new();
        for id in 0..8 {
            ring.add_worker(id);
        }

        let symbols: Vec<String> = (0..5000).map(|i| format!("SYM{i}USDT")).collect();
        let before: HashMap<String, u32> = symbols
            .iter()
            .map(|s| (s.clone(), ring.worker_for(s).unwrap()))
            .collect();

        ring.add_worker(8);

        let moved = symbols
            .iter()
            .filter(|s| ring.worker_for(s).unwrap() != before[*s])
            .count();
        let fraction = moved as f64 / symbols.len() as f64;

        // Expected fraction ~= 1/(N+1) = 1/9 ~= 0.111; allow generous slack.
        assert!(fraction < 0.30, "moved fraction too high: {fraction}");
    }

    #[test]
    fn load_distribution_covers_every_assigned_symbol() {
        let mut ring = ConsistentHashRing::new();
        ring.add_worker(1);
        ring.add_worker(2);

        let symbols: Vec<String> = (0..100).map(|i| format!("SYM{i}USDT")).collect();
        let dist = ring.load_distribution(&symbols);
        let total: usize = dist.values().sum();
        assert_eq!(total, symbols.len());

        let workers: HashSet<u32> = dist.keys().copied().collect();
        assert!(workers.iter().all(|w| *w == 1 || *w == 2));
    }

    #[test]
    fn remove_worker_reassigns_its_symbols() {
        let mut ring = ConsistentHashRing::new();
        ring.add_worker(1);
        ring.add_worker(2);
        ring.add_worker(3);

        let symbol = "BTCUSDT";
        let owner = ring.worker_for(symbol).unwrap();
        ring.remove_worker(owner);

        let new_owner = ring.worker_for(symbol).unwrap();
        assert_ne!(new_owner, owner);
    }
}
