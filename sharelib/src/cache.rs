use std::sync::Arc;
use parking_lot::Mutex;
use crate::base::CacheBase;
use crate::cache_sets::{merge_interference, AccessResult, CacheSet, DirectMapped, GenericSet, InterferenceCounts, RoundRobin};
use crate::config::{CacheConfig, CacheKind, SetKindConfig, StoreAllocation};
use crate::stats::{AccessKind, CacheStats, StatsCounters};

/// Index of a cache within the arena it was registered in
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheId(pub usize);

/// Everything guarded by a cache's private lock
#[derive(Debug)]
struct CacheState {
    sets: Vec<GenericSet>,
    counters: StatsCounters,
    peers: Vec<CacheId>,
}

/// One core's cache
///
/// Lookups, allocation and statistics happen under a private lock. Stores additionally take a
/// write lock shared by every cache on the same bus, always before the private lock, which
/// orders all stores against each other while loads proceed independently.
///
/// Peers are other caches in the same arena which must drop their copy of a line whenever this
/// cache stores to it. They are held as indices, so a cache never owns its peers.
#[derive(Debug)]
pub struct Cache {
    base: CacheBase,
    cache_type: CacheKind,
    store_allocation: StoreAllocation,
    state: Mutex<CacheState>,
    write_lock: Arc<Mutex<()>>,
}

impl Cache {
    /// Creates a cache from a configuration, failing if the geometry isn't usable
    ///
    /// # Arguments
    ///
    /// * `name`: Overrides the configured name, so several cores can share a configuration
    /// * `config`: Sizes and policies for this cache
    /// * `write_lock`: The lock shared by all caches whose stores are serialised together
    ///
    /// returns: Result<Cache, String>
    pub fn new(name: impl Into<String>, config: &CacheConfig, write_lock: Arc<Mutex<()>>) -> Result<Self, String> {
        let base = CacheBase::new(name, config.size, config.line_size, config.associativity)?;
        if base.num_sets() > config.max_sets {
            return Err(format!(
                "{}: {} sets exceeds the maximum of {}",
                base.name(),
                base.num_sets(),
                config.max_sets
            ));
        }
        let sets = (0..base.num_sets())
            .map(|_| Self::new_set(config))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("{}: {e}", base.name()))?;
        log::debug!(
            "created {}: {} sets of {} {:?} lines, {} bytes each",
            base.name(),
            base.num_sets(),
            base.associativity(),
            config.kind,
            base.line_size()
        );
        Ok(Self {
            base,
            cache_type: config.cache_type,
            store_allocation: config.store_allocation,
            state: Mutex::new(CacheState {
                sets,
                counters: StatsCounters::default(),
                peers: Vec::new(),
            }),
            write_lock,
        })
    }

    fn new_set(config: &CacheConfig) -> Result<GenericSet, String> {
        Ok(match config.kind {
            SetKindConfig::DirectMapped => DirectMapped::new(config.associativity)?.into(),
            SetKindConfig::RoundRobin => RoundRobin::new(config.associativity, config.max_associativity)?.into(),
        })
    }

    pub fn base(&self) -> &CacheBase {
        &self.base
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn cache_type(&self) -> CacheKind {
        self.cache_type
    }

    // On a miss or tombstone, loads always allocate and stores depend on the policy
    fn allocates(&self, kind: AccessKind) -> bool {
        match kind {
            AccessKind::Load => true,
            AccessKind::Store => self.store_allocation == StoreAllocation::Allocate,
            AccessKind::Invalidate => false,
        }
    }

    /// Accesses `size` bytes from `address`, returning true if every line touched hit
    ///
    /// The access is counted once, under the combined result of all its lines. Stores invalidate
    /// the same range in every peer before returning.
    ///
    /// # Arguments
    ///
    /// * `arena`: The caches peer ids refer to
    /// * `address`: First byte accessed
    /// * `size`: Number of bytes accessed. An empty access still touches the line at `address`
    /// * `kind`: Load or store
    ///
    /// returns: bool
    pub fn access(&self, arena: &[Cache], address: u64, size: u64, kind: AccessKind) -> bool {
        let _write_guard = (kind == AccessKind::Store).then(|| self.write_lock.lock());
        let mut state = self.state.lock();
        let end = address.saturating_add(size);
        let mut all_hit = AccessResult::Hit;
        let mut line_address = address;
        loop {
            let (tag, set_index) = self.base.split_address(line_address);
            let set = &mut state.sets[set_index];
            let result = set.find(tag, line_address);
            all_hit = all_hit.combine(result);
            if result != AccessResult::Hit && self.allocates(kind) {
                set.replace(tag);
            }
            match self.base.next_line(line_address) {
                Some(next) if next < end => line_address = next,
                _ => break,
            }
        }
        if kind == AccessKind::Store {
            for peer in &state.peers {
                arena[peer.0].invalidate(address, size);
            }
        }
        state.counters.record(kind, all_hit);
        all_hit == AccessResult::Hit
    }

    /// Accesses a single line. The caller guarantees `address` doesn't straddle a line boundary
    pub fn access_single_line(&self, arena: &[Cache], address: u64, kind: AccessKind) -> bool {
        let _write_guard = (kind == AccessKind::Store).then(|| self.write_lock.lock());
        let mut state = self.state.lock();
        let (tag, set_index) = self.base.split_address(address);
        let set = &mut state.sets[set_index];
        let result = set.find(tag, address);
        if result != AccessResult::Hit && self.allocates(kind) {
            set.replace(tag);
        }
        state.counters.record(kind, result);
        if kind == AccessKind::Store {
            for peer in &state.peers {
                arena[peer.0].invalidate_single_line(address);
            }
        }
        result == AccessResult::Hit
    }

    /// Drops every resident line in `size` bytes from `address`, leaving tombstones behind
    ///
    /// This is what peers call on each other when they store. It never allocates.
    pub fn invalidate(&self, address: u64, size: u64) {
        let mut state = self.state.lock();
        let end = address.saturating_add(size);
        let mut all_hit = AccessResult::Hit;
        let mut line_address = address;
        loop {
            let (tag, set_index) = self.base.split_address(line_address);
            let set = &mut state.sets[set_index];
            let result = set.find(tag, line_address);
            all_hit = all_hit.combine(result);
            if result == AccessResult::Hit {
                set.invalidate(tag, line_address);
                log::trace!("{} invalidated line {:#x} for {:#x}", self.base.name(), tag.value(), line_address);
            }
            match self.base.next_line(line_address) {
                Some(next) if next < end => line_address = next,
                _ => break,
            }
        }
        state.counters.record(AccessKind::Invalidate, all_hit);
    }

    /// Drops the line holding `address` if it is resident
    pub fn invalidate_single_line(&self, address: u64) {
        let mut state = self.state.lock();
        let (tag, set_index) = self.base.split_address(address);
        let set = &mut state.sets[set_index];
        let result = set.find(tag, address);
        if result == AccessResult::Hit {
            set.invalidate(tag, address);
            log::trace!("{} invalidated line {:#x} for {:#x}", self.base.name(), tag.value(), address);
        }
        state.counters.record(AccessKind::Invalidate, result);
    }

    /// Adds one cache to notify on stores. Registering a cache as its own peer deadlocks on store
    pub fn register_peer(&self, peer: CacheId) {
        self.state.lock().peers.push(peer);
    }

    /// Adds several caches to notify on stores
    pub fn register_peers(&self, peers: &[CacheId]) {
        self.state.lock().peers.extend_from_slice(peers);
    }

    pub fn peers(&self) -> Vec<CacheId> {
        self.state.lock().peers.clone()
    }

    /// Sums the interference ledgers of every set
    pub fn interference_counts(&self) -> InterferenceCounts {
        let state = self.state.lock();
        let mut counts = InterferenceCounts::new();
        for set in &state.sets {
            if let Some(interference) = set.interference_counts() {
                merge_interference(interference, &mut counts);
            }
        }
        counts
    }

    /// A snapshot of the hit, miss and tombstone counters
    pub fn stats(&self) -> CacheStats {
        CacheStats::new(self.base.name(), self.state.lock().counters)
    }

    /// Gets the associativity each set currently runs with
    pub fn set_associativities(&self) -> Vec<u32> {
        self.state.lock().sets.iter().map(CacheSet::associativity).collect()
    }
}

/// The caches of every simulated core, plus the write lock they share
///
/// This is the arena peer ids index into. Accesses go through here so that store invalidations
/// can reach the peers.
#[derive(Debug, Default)]
pub struct Cluster {
    caches: Vec<Cache>,
    write_lock: Arc<Mutex<()>>,
}

impl Cluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates one cache per core from the same configuration, each a peer of all the others
    ///
    /// Caches are named after the configuration with the core number appended
    pub fn with_cores(config: &CacheConfig, cores: usize) -> Result<Self, String> {
        let mut cluster = Self::new();
        for core in 0..cores {
            cluster.add_cache(format!("{}-{core}", config.name), config)?;
        }
        cluster.connect_all();
        Ok(cluster)
    }

    /// Adds a cache sharing this cluster's write lock. It starts with no peers
    pub fn add_cache(&mut self, name: impl Into<String>, config: &CacheConfig) -> Result<CacheId, String> {
        let cache = Cache::new(name, config, Arc::clone(&self.write_lock))?;
        self.caches.push(cache);
        Ok(CacheId(self.caches.len() - 1))
    }

    /// Makes every cache a peer of every other cache
    pub fn connect_all(&self) {
        let ids = (0..self.caches.len()).map(CacheId).collect::<Vec<_>>();
        for id in &ids {
            let peers = ids.iter().copied().filter(|peer| peer != id).collect::<Vec<_>>();
            self.register_peers(*id, &peers);
        }
    }

    pub fn register_peer(&self, cache: CacheId, peer: CacheId) {
        self.register_peers(cache, &[peer]);
    }

    pub fn register_peers(&self, cache: CacheId, peers: &[CacheId]) {
        debug_assert!(!peers.contains(&cache), "a cache can't be its own peer");
        debug_assert!(peers.iter().all(|peer| peer.0 < self.caches.len()), "peer outside the cluster");
        log::debug!("{} now notifies {} more peer(s)", self.caches[cache.0].name(), peers.len());
        self.caches[cache.0].register_peers(peers);
    }

    pub fn access(&self, cache: CacheId, address: u64, size: u64, kind: AccessKind) -> bool {
        self.caches[cache.0].access(&self.caches, address, size, kind)
    }

    pub fn access_single_line(&self, cache: CacheId, address: u64, kind: AccessKind) -> bool {
        self.caches[cache.0].access_single_line(&self.caches, address, kind)
    }

    pub fn cache(&self, cache: CacheId) -> &Cache {
        &self.caches[cache.0]
    }

    pub fn caches(&self) -> &[Cache] {
        &self.caches
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Interference seen by any cache, summed per address pair
    pub fn interference_counts(&self) -> InterferenceCounts {
        let mut counts = InterferenceCounts::new();
        for cache in &self.caches {
            merge_interference(&cache.interference_counts(), &mut counts);
        }
        counts
    }
}
