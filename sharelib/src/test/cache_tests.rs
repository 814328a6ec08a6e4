use std::sync::Arc;
use std::thread;
use parking_lot::Mutex;
use crate::base::CacheBase;
use crate::cache::{Cache, CacheId, Cluster};
use crate::cache_sets::Interference;
use crate::config::{CacheConfig, StoreAllocation, KILO};
use crate::stats::AccessKind;
use super::two_way_config;

const CORE_0: CacheId = CacheId(0);
const CORE_1: CacheId = CacheId(1);
const CORE_2: CacheId = CacheId(2);

fn standalone(config: &CacheConfig) -> Cache {
    Cache::new(config.name.clone(), config, Arc::new(Mutex::new(()))).unwrap()
}

#[test]
fn geometry_must_be_powers_of_two() {
    assert!(CacheBase::new("odd line", 4 * KILO, 48, 2).is_err());
    assert!(CacheBase::new("odd sets", 3 * 128, 64, 2).is_err());
    assert!(CacheBase::new("too small", 64, 64, 2).is_err());
    assert!(CacheBase::new("no ways", 4 * KILO, 64, 0).is_err());
    assert!(CacheBase::new("overflow", 4 * KILO, 1 << 62, 8).is_err());
    let base = CacheBase::new("ok", 4 * KILO, 64, 2).unwrap();
    assert_eq!(base.num_sets(), 32);
    assert_eq!(base.line_size(), 64);
    assert_eq!(base.cache_size(), 4 * KILO);
}

#[test]
fn split_address_gives_tag_set_and_offset() {
    let base = CacheBase::new("L1", 4 * 2 * 64, 64, 2).unwrap();
    let (tag, set) = base.split_address(0x1040);
    assert_eq!(tag.value(), 0x41);
    assert_eq!(set, 1);
    let (tag, set, offset) = base.split_address_with_offset(0x10c7);
    assert_eq!(tag.value(), 0x43);
    assert_eq!(set, 3);
    assert_eq!(offset, 7);
}

#[test]
fn construction_rejects_unsupported_configurations() {
    let lock = Arc::new(Mutex::new(()));

    let mut too_wide = two_way_config();
    too_wide.associativity = 8;
    too_wide.size = 8 * KILO;
    assert!(Cache::new("wide", &too_wide, Arc::clone(&lock)).is_err());

    let mut direct_two_way = two_way_config();
    direct_two_way.kind = crate::config::SetKindConfig::DirectMapped;
    assert!(Cache::new("direct", &direct_two_way, Arc::clone(&lock)).is_err());

    let mut too_many_sets = two_way_config();
    too_many_sets.max_sets = 16;
    assert!(Cache::new("sets", &too_many_sets, Arc::clone(&lock)).is_err());

    assert!(Cache::new("direct", &CacheConfig::direct_mapped("L1", 4 * KILO, 64), lock).is_ok());
}

#[test]
fn sets_run_with_the_configured_associativity() {
    let cache = standalone(&two_way_config());
    let associativities = cache.set_associativities();
    assert_eq!(associativities.len(), 32);
    assert!(associativities.iter().all(|a| *a == 2));
}

#[test]
fn first_access_misses_then_hits() {
    let cache = standalone(&two_way_config());
    // The line at address 0 must not look resident in a fresh cache
    assert!(!cache.access(&[], 0, 8, AccessKind::Load));
    assert!(cache.access(&[], 0, 8, AccessKind::Load));
    assert!(!cache.access_single_line(&[], 0x1000, AccessKind::Load));
    assert!(cache.access_single_line(&[], 0x1010, AccessKind::Load));
    let stats = cache.stats();
    assert_eq!(stats.misses(AccessKind::Load), 2);
    assert_eq!(stats.hits(AccessKind::Load), 2);
    assert_eq!(stats.accesses(AccessKind::Load), 4);
}

#[test]
fn multi_line_access_is_counted_once() {
    let cache = standalone(&two_way_config());
    assert!(!cache.access(&[], 0x103c, 8, AccessKind::Load));
    assert!(cache.access(&[], 0x103c, 8, AccessKind::Load));
    assert!(cache.access(&[], 0x1040, 4, AccessKind::Load));
    let stats = cache.stats();
    assert_eq!(stats.accesses(AccessKind::Load), 3);
    assert_eq!(stats.misses(AccessKind::Load), 1);
}

#[test]
fn capacity_eviction_is_round_robin() {
    // A single set of two lines
    let cache = standalone(&CacheConfig::round_robin("tiny", 128, 64, 2));
    assert!(!cache.access(&[], 0x000, 4, AccessKind::Load));
    assert!(!cache.access(&[], 0x040, 4, AccessKind::Load));
    assert!(cache.access(&[], 0x000, 4, AccessKind::Load));
    assert!(!cache.access(&[], 0x080, 4, AccessKind::Load));
    assert!(!cache.access(&[], 0x000, 4, AccessKind::Load));
}

#[test]
fn different_tag_in_the_same_set_is_an_ordinary_miss() {
    let cache = standalone(&CacheConfig::round_robin("tiny", 128, 64, 2));
    assert!(!cache.access(&[], 0x1000, 4, AccessKind::Load));
    assert!(cache.access(&[], 0x1000, 4, AccessKind::Load));
    cache.invalidate(0x1000, 4);
    assert!(!cache.access(&[], 0x1040, 4, AccessKind::Load));
    assert_eq!(cache.stats().tombstones(AccessKind::Load), 0);
    assert!(cache.interference_counts().is_empty());

    // Interference needs the same line reached through a different address
    let cache = standalone(&CacheConfig::round_robin("tiny", 128, 64, 2));
    cache.access(&[], 0x1000, 4, AccessKind::Load);
    cache.invalidate(0x1000, 4);
    assert!(!cache.access(&[], 0x1008, 4, AccessKind::Load));
    assert_eq!(cache.stats().tombstones(AccessKind::Load), 1);
    assert_eq!(cache.interference_counts().get(&Interference::new(0x1000, 0x1008)), Some(&1));
}

#[test]
fn store_from_a_peer_leaves_a_tombstone() {
    let cluster = Cluster::with_cores(&two_way_config(), 2).unwrap();
    assert!(!cluster.access(CORE_0, 0x1000, 8, AccessKind::Load));
    assert!(!cluster.access_single_line(CORE_1, 0x1008, AccessKind::Store));
    assert!(!cluster.access(CORE_0, 0x1010, 8, AccessKind::Load));

    let stats = cluster.cache(CORE_0).stats();
    assert_eq!(stats.tombstones(AccessKind::Load), 1);
    assert_eq!(stats.hits(AccessKind::Invalidate), 1);
    let counts = cluster.interference_counts();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts.get(&Interference::new(0x1008, 0x1010)), Some(&1));

    // The tombstone was replaced by the reload
    assert!(cluster.access(CORE_0, 0x1010, 8, AccessKind::Load));
    assert_eq!(cluster.interference_counts().values().sum::<u64>(), 1);
}

#[test]
fn the_invalidating_address_itself_is_not_interference() {
    let cluster = Cluster::with_cores(&two_way_config(), 2).unwrap();
    cluster.access(CORE_0, 0x1000, 8, AccessKind::Load);
    cluster.access(CORE_1, 0x1000, 8, AccessKind::Store);
    assert!(!cluster.access(CORE_0, 0x1000, 8, AccessKind::Load));
    let stats = cluster.cache(CORE_0).stats();
    assert_eq!(stats.misses(AccessKind::Load), 2);
    assert_eq!(stats.tombstones(AccessKind::Load), 0);
    assert!(cluster.interference_counts().is_empty());
}

#[test]
fn tombstone_on_one_line_and_hit_on_another_combine_to_tombstone() {
    let cluster = Cluster::with_cores(&two_way_config(), 2).unwrap();
    cluster.access(CORE_0, 0x1000, 4, AccessKind::Load);
    cluster.access(CORE_0, 0x1040, 4, AccessKind::Load);
    cluster.access(CORE_1, 0x1008, 8, AccessKind::Store);
    assert!(!cluster.access(CORE_0, 0x1038, 16, AccessKind::Load));
    let stats = cluster.cache(CORE_0).stats();
    assert_eq!(stats.tombstones(AccessKind::Load), 1);
    assert_eq!(stats.misses(AccessKind::Load), 2);
    assert_eq!(stats.hits(AccessKind::Load), 0);
    assert_eq!(
        cluster.interference_counts().get(&Interference::new(0x1008, 0x1038)),
        Some(&1)
    );
}

#[test]
fn line_crossing_store_tombstones_both_lines_in_the_peer() {
    let cluster = Cluster::with_cores(&two_way_config(), 2).unwrap();
    cluster.access(CORE_0, 0x1038, 4, AccessKind::Load);
    cluster.access(CORE_0, 0x1040, 4, AccessKind::Load);
    cluster.access(CORE_1, 0x1038, 16, AccessKind::Store);

    // One invalidation for the whole range, which hit on both lines
    let stats = cluster.cache(CORE_0).stats();
    assert_eq!(stats.accesses(AccessKind::Invalidate), 1);
    assert_eq!(stats.hits(AccessKind::Invalidate), 1);

    // The first line was invalidated from the store's own address, not from past its end
    assert!(!cluster.access_single_line(CORE_0, 0x1000, AccessKind::Load));
    assert!(!cluster.access_single_line(CORE_0, 0x1050, AccessKind::Load));
    assert_eq!(cluster.cache(CORE_0).stats().tombstones(AccessKind::Load), 2);
    let counts = cluster.interference_counts();
    assert_eq!(counts.len(), 2);
    assert_eq!(counts.get(&Interference::new(0x1000, 0x1038)), Some(&1));
    assert_eq!(counts.get(&Interference::new(0x1040, 0x1050)), Some(&1));
}

#[test]
fn stores_invalidate_every_peer_once() {
    let cluster = Cluster::with_cores(&two_way_config(), 3).unwrap();
    cluster.access(CORE_0, 0x2000, 8, AccessKind::Store);
    cluster.access_single_line(CORE_0, 0x3000, AccessKind::Store);
    for peer in [CORE_1, CORE_2] {
        let stats = cluster.cache(peer).stats();
        assert_eq!(stats.accesses(AccessKind::Invalidate), 2);
        assert_eq!(stats.misses(AccessKind::Invalidate), 2);
    }
    assert_eq!(cluster.cache(CORE_0).stats().accesses(AccessKind::Invalidate), 0);
    // Loads never notify peers
    cluster.access(CORE_1, 0x2000, 8, AccessKind::Load);
    assert_eq!(cluster.cache(CORE_0).stats().accesses(AccessKind::Invalidate), 0);
}

#[test]
fn peers_are_only_the_registered_caches() {
    let config = two_way_config();
    let mut cluster = Cluster::new();
    let a = cluster.add_cache("a", &config).unwrap();
    let b = cluster.add_cache("b", &config).unwrap();
    let c = cluster.add_cache("c", &config).unwrap();
    cluster.register_peer(a, b);
    cluster.access(a, 0x1000, 8, AccessKind::Store);
    assert_eq!(cluster.cache(b).stats().accesses(AccessKind::Invalidate), 1);
    assert_eq!(cluster.cache(c).stats().accesses(AccessKind::Invalidate), 0);
    assert_eq!(cluster.cache(a).peers(), vec![b]);
    assert!(cluster.cache(b).peers().is_empty());
}

#[test]
fn no_allocate_stores_leave_the_set_alone() {
    let mut config = two_way_config();
    config.store_allocation = StoreAllocation::NoAllocate;
    let cache = standalone(&config);
    assert!(!cache.access(&[], 0x1000, 8, AccessKind::Store));
    assert!(!cache.access(&[], 0x1000, 8, AccessKind::Store));
    assert!(!cache.access(&[], 0x1000, 8, AccessKind::Load));
    assert!(cache.access(&[], 0x1000, 8, AccessKind::Store));
    assert_eq!(cache.stats().misses(AccessKind::Store), 2);
}

#[test]
fn allocating_stores_install_the_line() {
    let cache = standalone(&two_way_config());
    assert!(!cache.access(&[], 0x1000, 8, AccessKind::Store));
    assert!(cache.access(&[], 0x1000, 8, AccessKind::Load));
}

#[test]
fn invalidation_never_allocates() {
    let cache = standalone(&two_way_config());
    cache.invalidate(0x1000, 8);
    cache.invalidate_single_line(0x1000);
    assert!(!cache.access(&[], 0x1000, 8, AccessKind::Load));
    let stats = cache.stats();
    assert_eq!(stats.misses(AccessKind::Invalidate), 2);
    assert_eq!(stats.total_accesses(), 3);
}

#[test]
fn direct_mapped_caches_ignore_invalidation() {
    let cluster = Cluster::with_cores(&CacheConfig::direct_mapped("DM", 4 * KILO, 64), 2).unwrap();
    cluster.access(CORE_0, 0x1000, 8, AccessKind::Load);
    cluster.access(CORE_1, 0x1008, 8, AccessKind::Store);
    assert!(cluster.access(CORE_0, 0x1010, 8, AccessKind::Load));
    assert!(cluster.interference_counts().is_empty());
}

#[test]
fn cluster_names_caches_by_core() {
    let cluster = Cluster::with_cores(&two_way_config(), 3).unwrap();
    let names = cluster.caches().iter().map(|cache| cache.name().to_string()).collect::<Vec<_>>();
    assert_eq!(names, vec!["L1D-0", "L1D-1", "L1D-2"]);
    assert_eq!(cluster.cache(CORE_1).peers(), vec![CORE_0, CORE_2]);
}

#[test]
fn concurrent_cores_keep_exact_counts() {
    const CORES: usize = 4;
    const ROUNDS: u64 = 500;
    let cluster = Cluster::with_cores(&two_way_config(), CORES).unwrap();
    thread::scope(|scope| {
        for core in 0..CORES {
            let cluster = &cluster;
            scope.spawn(move || {
                let id = CacheId(core);
                for round in 0..ROUNDS {
                    // Every core works on its own 8 bytes of the same few lines
                    let address = 0x4000 + (round % 4) * 64 + core as u64 * 8;
                    cluster.access(id, address, 8, AccessKind::Load);
                    if round % 2 == 0 {
                        cluster.access_single_line(id, address, AccessKind::Store);
                    }
                }
            });
        }
    });
    let stores_per_core = ROUNDS / 2;
    let mut invalidations = 0;
    for cache in cluster.caches() {
        let stats = cache.stats();
        assert_eq!(stats.accesses(AccessKind::Load), ROUNDS);
        assert_eq!(stats.accesses(AccessKind::Store), stores_per_core);
        assert_eq!(
            stats.total_accesses(),
            stats.total_hits() + stats.total_misses() + stats.total_tombstones()
        );
        invalidations += stats.accesses(AccessKind::Invalidate);
    }
    assert_eq!(invalidations, CORES as u64 * stores_per_core * (CORES as u64 - 1));
    // Different cores touching the same lines must have been seen interfering
    assert!(!cluster.interference_counts().is_empty());
}
