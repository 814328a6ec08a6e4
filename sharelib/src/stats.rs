use serde::{Deserialize, Serialize};
use crate::cache_sets::AccessResult;
use crate::config::CacheKind;

const HEADER_WIDTH: usize = 19;
const NUMBER_WIDTH: usize = 12;

/// What the harness asks of a cache. Invalidations come from peer caches observing a store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    Load,
    Store,
    Invalidate,
}

impl AccessKind {
    pub const ALL: [AccessKind; 3] = [AccessKind::Load, AccessKind::Store, AccessKind::Invalidate];

    fn counter_index(self) -> usize {
        match self {
            AccessKind::Load => 0,
            AccessKind::Store => 1,
            AccessKind::Invalidate => 2,
        }
    }

    fn label(self) -> &'static str {
        match self {
            AccessKind::Load => "Load",
            AccessKind::Store => "Store",
            AccessKind::Invalidate => "Invalidate",
        }
    }
}

/// One counter per (access kind, result)
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsCounters {
    counts: [[u64; 3]; 3],
}

impl StatsCounters {
    pub fn record(&mut self, kind: AccessKind, result: AccessResult) {
        self.counts[kind.counter_index()][result.counter_index()] += 1;
    }

    pub fn get(&self, kind: AccessKind, result: AccessResult) -> u64 {
        self.counts[kind.counter_index()][result.counter_index()]
    }

    fn sum(&self, result: AccessResult) -> u64 {
        AccessKind::ALL.iter().map(|kind| self.get(*kind, result)).sum()
    }
}

/// A snapshot of one cache's counters. Can be serialised as part of the simulation output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub name: String,
    pub counters: StatsCounters,
}

impl CacheStats {
    pub fn new(name: impl Into<String>, counters: StatsCounters) -> Self {
        Self {
            name: name.into(),
            counters,
        }
    }

    pub fn hits(&self, kind: AccessKind) -> u64 {
        self.counters.get(kind, AccessResult::Hit)
    }

    pub fn misses(&self, kind: AccessKind) -> u64 {
        self.counters.get(kind, AccessResult::Miss)
    }

    pub fn tombstones(&self, kind: AccessKind) -> u64 {
        self.counters.get(kind, AccessResult::Tombstone)
    }

    pub fn accesses(&self, kind: AccessKind) -> u64 {
        self.hits(kind) + self.misses(kind) + self.tombstones(kind)
    }

    pub fn total_hits(&self) -> u64 {
        self.counters.sum(AccessResult::Hit)
    }

    pub fn total_misses(&self) -> u64 {
        self.counters.sum(AccessResult::Miss)
    }

    pub fn total_tombstones(&self) -> u64 {
        self.counters.sum(AccessResult::Tombstone)
    }

    pub fn total_accesses(&self) -> u64 {
        self.total_hits() + self.total_misses() + self.total_tombstones()
    }

    /// Renders a human readable report, every line starting with `prefix`
    ///
    /// Instruction caches only get the totals, as they never see stores or invalidations
    pub fn stats_long(&self, prefix: &str, cache_kind: CacheKind) -> String {
        let mut out = format!("{prefix}{}:\n", self.name);
        if cache_kind != CacheKind::Instruction {
            for kind in AccessKind::ALL {
                let label = kind.label();
                let accesses = self.accesses(kind);
                write_row(&mut out, prefix, &format!("{label}-Hits:"), self.hits(kind), accesses);
                write_row(&mut out, prefix, &format!("{label}-Misses:"), self.misses(kind), accesses);
                write_row(&mut out, prefix, &format!("{label}-Tombstones:"), self.tombstones(kind), accesses);
                write_row(&mut out, prefix, &format!("{label}-Accesses:"), accesses, accesses);
                out.push_str(prefix);
                out.push('\n');
            }
        }
        let accesses = self.total_accesses();
        write_row(&mut out, prefix, "Total-Hits:", self.total_hits(), accesses);
        write_row(&mut out, prefix, "Total-Misses:", self.total_misses(), accesses);
        write_row(&mut out, prefix, "Total-Tombstones:", self.total_tombstones(), accesses);
        write_row(&mut out, prefix, "Total-Accesses:", accesses, accesses);
        out.push('\n');
        out
    }
}

fn write_row(out: &mut String, prefix: &str, label: &str, value: u64, total: u64) {
    // An unused counter reads as 0% rather than NaN
    let percentage = if total == 0 { 0.0 } else { 100.0 * value as f64 / total as f64 };
    out.push_str(&format!(
        "{prefix}{label:<header$}{value:>number$}  {percentage:>6.2}%\n",
        header = HEADER_WIDTH,
        number = NUMBER_WIDTH
    ));
}
