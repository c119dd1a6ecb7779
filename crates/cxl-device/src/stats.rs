//! Device-side counters.

#[derive(Default, Debug, Clone)]
pub struct DeviceStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub dram_reads: u64,
    pub dram_writes: u64,
    pub dram_callbacks: u64,
}

impl DeviceStats {
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
