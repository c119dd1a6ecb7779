//! Device-side set-associative cache with an MSHR in front of DRAM.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use cxl_packets::ReqId;
use lru::LruCache;

#[derive(Clone, Copy, Debug)]
pub struct CacheParams {
    /// Power of two (validated at init).
    pub sets: usize,
    pub assoc: usize,
    pub latency: u64,
    pub mshr_assoc: usize,
    pub mshr_capacity: usize,
}

/// Miss-status handling registers: fully associative, keyed by page-frame
/// number. Each entry merges every request to the same frame until the fill
/// returns.
pub struct Mshr {
    assoc: usize,
    capacity: usize,
    entries: HashMap<u64, Vec<ReqId>>,
}

impl Mshr {
    pub fn new(assoc: usize, capacity: usize) -> Self {
        Self {
            assoc,
            capacity,
            entries: HashMap::new(),
        }
    }

    pub fn is_first_miss(&self, pfn: u64) -> bool {
        !self.entries.contains_key(&pfn)
    }

    pub fn has_free_entry(&self) -> bool {
        self.entries.len() < self.assoc
    }

    /// Register a miss. A new entry needs a free way; a merge needs room in
    /// the existing entry. `false` is back-pressure, the request retries.
    pub fn insert(&mut self, req: ReqId, pfn: u64) -> bool {
        match self.entries.get_mut(&pfn) {
            Some(entry) => {
                if entry.len() < self.capacity {
                    entry.push(req);
                    true
                } else {
                    false
                }
            }
            None => {
                if self.entries.len() < self.assoc {
                    self.entries.insert(pfn, vec![req]);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Release the entry for `pfn`, returning its merged requests.
    pub fn clear(&mut self, pfn: u64) -> Vec<ReqId> {
        self.entries
            .remove(&pfn)
            .expect("MSHR clear for an unknown page frame")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// LRU-per-set cache. Tags only; the simulator never carries data.
pub struct NdpCache {
    sets: Vec<LruCache<u64, ()>>,
    set_bits: u32,
    set_mask: u64,
    offset_bits: u32,
    latency: u64,
    pub mshr: Mshr,
}

impl NdpCache {
    pub fn new(params: &CacheParams, offset_bits: u32) -> Self {
        assert!(
            params.sets.is_power_of_two(),
            "cache set count must be a power of two"
        );
        let assoc = NonZeroUsize::new(params.assoc).expect("cache associativity must be nonzero");
        Self {
            sets: (0..params.sets).map(|_| LruCache::new(assoc)).collect(),
            set_bits: params.sets.trailing_zeros(),
            set_mask: params.sets as u64 - 1,
            offset_bits,
            latency: params.latency,
            mshr: Mshr::new(params.mshr_assoc, params.mshr_capacity),
        }
    }

    pub fn latency(&self) -> u64 {
        self.latency
    }

    pub fn pfn(&self, addr: u64) -> u64 {
        addr >> self.offset_bits
    }

    fn set_of(&self, addr: u64) -> usize {
        ((addr >> self.offset_bits) & self.set_mask) as usize
    }

    fn tag_of(&self, addr: u64) -> u64 {
        addr >> (self.offset_bits + self.set_bits)
    }

    pub fn lookup(&mut self, addr: u64, update_lru: bool) -> bool {
        let set = self.set_of(addr);
        let tag = self.tag_of(addr);
        if update_lru {
            self.sets[set].get(&tag).is_some()
        } else {
            self.sets[set].peek(&tag).is_some()
        }
    }

    /// Fill after a miss; evicts the set's LRU line when it is full.
    pub fn insert(&mut self, addr: u64) {
        let set = self.set_of(addr);
        let tag = self.tag_of(addr);
        self.sets[set].put(tag, ());
    }
}
