//! Cache statistics

use std::fmt;

/// Running hit/miss/eviction counts, kept under the cache lock
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
    /// Resident entries (hot + cold)
    pub size: usize,
    pub capacity: usize,
    pub hot: usize,
    pub cold: usize,
    /// History entries without a value
    pub non_resident: usize,
}

impl CacheStats {
    pub(crate) fn new(
        counters: Counters,
        capacity: usize,
        hot: usize,
        cold: usize,
        non_resident: usize,
    ) -> Self {
        let total = counters.hits + counters.misses;
        let hit_rate = if total > 0 {
            counters.hits as f64 / total as f64
        } else {
            0.0
        };
        Self {
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            hit_rate,
            size: hot + cold,
            capacity,
            hot,
            cold,
            non_resident,
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} resident ({} hot, {} cold, {} history), {} hits, {} misses, {:.1}% hit rate, {} evictions",
            self.size,
            self.capacity,
            self.hot,
            self.cold,
            self.non_resident,
            self.hits,
            self.misses,
            self.hit_rate * 100.0,
            self.evictions
        )
    }
}
