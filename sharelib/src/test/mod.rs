mod cache_tests;

use crate::config::{CacheConfig, KILO};

/// A 4KiB, 2 way round robin cache with 64 byte lines, so 32 sets
pub(crate) fn two_way_config() -> CacheConfig {
    CacheConfig::round_robin("L1D", 4 * KILO, 64, 2)
}

/// Formats one trace record
pub(crate) fn record(core: usize, address: u64, mode: char, size: u16) -> String {
    format!("{core:016x} {address:016x} {mode} {size:03}\n")
}
