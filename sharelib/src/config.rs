use std::io::Read;
use serde::{Deserialize, Serialize};

pub const KILO: u64 = 1024;
pub const MEGA: u64 = KILO * KILO;
pub const GIGA: u64 = KILO * MEGA;

/// Upper bound on round robin associativity when the configuration doesn't give one
pub const DEFAULT_MAX_ASSOCIATIVITY: u32 = 4;

/// Upper bound on the number of sets in one cache when the configuration doesn't give one
pub const DEFAULT_MAX_SETS: u64 = 16 * KILO;

/// A whole simulation: one cache per core, all built from the same configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    pub cores: usize,
    pub cache: CacheConfig,
    /// Variables used to symbolise the interference report
    #[serde(default)]
    pub symbols: Vec<SymbolConfig>,
}

impl SimulationConfig {
    /// Parses a JSON configuration
    pub fn from_reader(reader: impl Read) -> Result<Self, String> {
        serde_json::from_reader(reader).map_err(|e| format!("Couldn't parse the config file: {e}"))
    }
}

/// A configuration for a single cache
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub name: String,
    pub size: u64,
    pub line_size: u64,
    #[serde(default = "default_associativity")]
    pub associativity: u32,
    pub kind: SetKindConfig,
    #[serde(default)]
    pub store_allocation: StoreAllocation,
    #[serde(default)]
    pub cache_type: CacheKind,
    #[serde(default = "default_max_associativity")]
    pub max_associativity: u32,
    #[serde(default = "default_max_sets")]
    pub max_sets: u64,
}

impl CacheConfig {
    /// A direct mapped data cache with default limits
    pub fn direct_mapped(name: impl Into<String>, size: u64, line_size: u64) -> Self {
        Self::with_kind(name, size, line_size, 1, SetKindConfig::DirectMapped)
    }

    /// A round robin data cache with default limits
    pub fn round_robin(name: impl Into<String>, size: u64, line_size: u64, associativity: u32) -> Self {
        Self::with_kind(name, size, line_size, associativity, SetKindConfig::RoundRobin)
    }

    fn with_kind(name: impl Into<String>, size: u64, line_size: u64, associativity: u32, kind: SetKindConfig) -> Self {
        Self {
            name: name.into(),
            size,
            line_size,
            associativity,
            kind,
            store_allocation: StoreAllocation::default(),
            cache_type: CacheKind::default(),
            max_associativity: DEFAULT_MAX_ASSOCIATIVITY,
            max_sets: DEFAULT_MAX_SETS,
        }
    }
}

fn default_associativity() -> u32 {
    1
}

fn default_max_associativity() -> u32 {
    DEFAULT_MAX_ASSOCIATIVITY
}

fn default_max_sets() -> u64 {
    DEFAULT_MAX_SETS
}

/// The set policy - direct mapped or round robin
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
pub enum SetKindConfig {
    #[serde(alias = "direct")]
    DirectMapped,
    #[serde(alias = "rr", alias = "round_robin")]
    RoundRobin,
}

/// Whether a store which misses installs the line. Loads always allocate. Defaults to allocate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Default)]
pub enum StoreAllocation {
    #[default]
    #[serde(alias = "allocate")]
    Allocate,
    #[serde(alias = "no_allocate")]
    NoAllocate,
}

/// Instruction or data cache. Only changes how statistics are reported. Defaults to data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CacheKind {
    #[serde(alias = "icache")]
    Instruction,
    #[default]
    #[serde(alias = "dcache")]
    Data,
}

/// A named variable occupying `size` bytes from `address`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SymbolConfig {
    pub name: String,
    pub address: u64,
    pub size: u64,
}
