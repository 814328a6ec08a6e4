use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::tag::CacheTag;

/// The outcome of looking a line up in a set
///
/// Lines are combined with [`AccessResult::combine`], so an access spanning several lines only
/// counts as a hit if every line hit
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessResult {
    Miss,
    Tombstone,
    Hit,
}

impl AccessResult {
    /// All results, in counter order
    pub const ALL: [AccessResult; 3] = [AccessResult::Miss, AccessResult::Tombstone, AccessResult::Hit];

    /// Combines the results of two lines touched by the same access
    ///
    /// A miss absorbs everything, otherwise a tombstone absorbs a hit, otherwise both hit
    pub fn combine(self, other: AccessResult) -> AccessResult {
        match (self, other) {
            (AccessResult::Miss, _) | (_, AccessResult::Miss) => AccessResult::Miss,
            (AccessResult::Tombstone, _) | (_, AccessResult::Tombstone) => AccessResult::Tombstone,
            (AccessResult::Hit, AccessResult::Hit) => AccessResult::Hit,
        }
    }

    /// Position of the result in the statistics counters
    pub(crate) fn counter_index(self) -> usize {
        match self {
            AccessResult::Miss => 0,
            AccessResult::Tombstone => 1,
            AccessResult::Hit => 2,
        }
    }
}

/// An unordered pair of byte addresses which contended for the same line, stored low then high
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interference {
    pub low: u64,
    pub high: u64,
}

impl Interference {
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    /// Distance between the two addresses in bytes
    pub fn distance(&self) -> u64 {
        self.high - self.low
    }
}

/// Occurrence counts for each interfering address pair
pub type InterferenceCounts = BTreeMap<Interference, u64>;

/// Adds every count in `source` to `destination`
pub fn merge_interference(source: &InterferenceCounts, destination: &mut InterferenceCounts) {
    for (pair, count) in source {
        *destination.entry(*pair).or_insert(0) += count;
    }
}

/// The contract shared by all set policies
///
/// A set holds up to `associativity` tags. Implementations decide which slot a new tag goes into,
/// and whether invalidated tags are kept around as tombstones.
pub trait CacheSet {
    /// Changes the number of usable slots. Fails if the policy can't support it
    fn set_associativity(&mut self, associativity: u32) -> Result<(), String>;

    fn associativity(&self) -> u32;

    /// Looks up a tag on behalf of an access to `address`
    ///
    /// Returns a hit for a live copy, a tombstone when a dead copy was killed by another address,
    /// and a miss otherwise (including a dead copy killed by this very address)
    fn find(&mut self, tag: CacheTag, address: u64) -> AccessResult;

    /// Installs a tag in the slot chosen by the policy
    fn replace(&mut self, tag: CacheTag);

    /// Turns every live copy of the tag into a tombstone recording `address`
    fn invalidate(&mut self, tag: CacheTag, address: u64);

    /// Interference recorded by this set, if the policy tracks it
    fn interference_counts(&self) -> Option<&InterferenceCounts> {
        None
    }
}

/// A single slot set, used for direct mapped caches
///
/// There is nowhere to keep a tombstone, so invalidation is ignored
#[derive(Debug, Default)]
pub struct DirectMapped {
    slot: Option<CacheTag>,
}

impl DirectMapped {
    pub fn new(associativity: u32) -> Result<Self, String> {
        let mut set = Self::default();
        set.set_associativity(associativity)?;
        Ok(set)
    }
}

impl CacheSet for DirectMapped {
    fn set_associativity(&mut self, associativity: u32) -> Result<(), String> {
        if associativity != 1 {
            return Err(format!("A direct mapped set must have an associativity of 1, not {associativity}"));
        }
        Ok(())
    }

    fn associativity(&self) -> u32 {
        1
    }

    fn find(&mut self, tag: CacheTag, _address: u64) -> AccessResult {
        match self.slot {
            Some(resident) if resident == tag => AccessResult::Hit,
            _ => AccessResult::Miss,
        }
    }

    fn replace(&mut self, tag: CacheTag) {
        self.slot = Some(tag);
    }

    fn invalidate(&mut self, _tag: CacheTag, _address: u64) {}
}

/// A fixed capacity set with round robin replacement
///
/// The replacement cursor steps backwards through the slots, wrapping from 0 to the last index.
/// Invalidated tags are swapped to a second, trailing cursor so the next replacements reuse
/// them before any live slot.
///
/// Whenever a lookup finds a tombstone left by a different address, the pair is counted in the
/// set's interference ledger.
#[derive(Debug)]
pub struct RoundRobin {
    tags: Vec<Option<CacheTag>>,
    last_index: usize,
    next_replace_index: usize,
    next_tombstone_index: usize,
    interference: InterferenceCounts,
}

/// Slots are allocated up front for the maximum associativity, so it is capped
pub const ASSOCIATIVITY_LIMIT: u32 = 256;

impl RoundRobin {
    /// Creates a set with `associativity` slots, which may later grow up to `max_associativity`
    pub fn new(associativity: u32, max_associativity: u32) -> Result<Self, String> {
        if max_associativity > ASSOCIATIVITY_LIMIT {
            return Err(format!(
                "A round robin set supports at most {ASSOCIATIVITY_LIMIT} ways, not {max_associativity}"
            ));
        }
        let mut set = Self {
            tags: vec![None; max_associativity as usize],
            last_index: 0,
            next_replace_index: 0,
            next_tombstone_index: 0,
            interference: InterferenceCounts::new(),
        };
        set.set_associativity(associativity)?;
        Ok(set)
    }

    /// Gets the slot the next replacement will use
    pub fn next_replace_index(&self) -> usize {
        self.next_replace_index
    }

    /// Reads a slot, for inspecting the replacement order
    pub fn slot(&self, index: usize) -> Option<&CacheTag> {
        self.tags.get(index).and_then(Option::as_ref)
    }

    // Conditions are cheaper than modulo here
    fn previous_index(&self, index: usize) -> usize {
        if index == 0 {
            self.last_index
        } else {
            index - 1
        }
    }
}

impl CacheSet for RoundRobin {
    fn set_associativity(&mut self, associativity: u32) -> Result<(), String> {
        let max_associativity = self.tags.len();
        if associativity == 0 || associativity as usize > max_associativity {
            return Err(format!(
                "A round robin set supports an associativity between 1 and {max_associativity}, not {associativity}"
            ));
        }
        self.last_index = associativity as usize - 1;
        self.next_replace_index = self.last_index;
        self.next_tombstone_index = self.last_index;
        Ok(())
    }

    fn associativity(&self) -> u32 {
        self.last_index as u32 + 1
    }

    fn find(&mut self, tag: CacheTag, address: u64) -> AccessResult {
        let mut result = AccessResult::Miss;
        for index in (0..=self.last_index).rev() {
            let resident = match &self.tags[index] {
                Some(resident) if *resident == tag => resident,
                _ => continue,
            };
            match resident.tombstone_address() {
                None => return AccessResult::Hit,
                // The access which caused the invalidation coming back to its own line
                Some(tombstone) if tombstone == address => result = AccessResult::Miss,
                Some(tombstone) => {
                    // A live copy may still be further along, keep looking
                    result = AccessResult::Tombstone;
                    let pair = Interference::new(tombstone, address);
                    log::trace!("interference between {:#x} and {:#x}, {} bytes apart", pair.low, pair.high, pair.distance());
                    *self.interference.entry(pair).or_insert(0) += 1;
                }
            }
        }
        result
    }

    fn replace(&mut self, tag: CacheTag) {
        let index = self.next_replace_index;
        self.tags[index] = Some(tag);
        let previous = self.previous_index(index);
        if self.next_tombstone_index == self.next_replace_index {
            self.next_tombstone_index = previous;
        }
        self.next_replace_index = previous;
    }

    fn invalidate(&mut self, tag: CacheTag, address: u64) {
        for index in (0..=self.last_index).rev() {
            let slot = match &mut self.tags[index] {
                Some(resident) if *resident == tag && !resident.is_dead() => resident,
                _ => continue,
            };
            slot.kill(address);
            // Move it to the tombstone zone so it gets reused first
            let tombstone_index = self.next_tombstone_index;
            self.tags.swap(index, tombstone_index);
            self.next_tombstone_index = self.previous_index(tombstone_index);
        }
    }

    fn interference_counts(&self) -> Option<&InterferenceCounts> {
        Some(&self.interference)
    }
}

/// Enum for both set policies provided by the library
///
/// Every access goes through a set, so we branch on the concrete policy instead of paying for a
/// trait object on each lookup
#[derive(Debug)]
pub enum GenericSet {
    DirectMapped(DirectMapped),
    RoundRobin(RoundRobin),
}

impl From<DirectMapped> for GenericSet {
    fn from(value: DirectMapped) -> Self {
        Self::DirectMapped(value)
    }
}

impl From<RoundRobin> for GenericSet {
    fn from(value: RoundRobin) -> Self {
        Self::RoundRobin(value)
    }
}

impl CacheSet for GenericSet {
    fn set_associativity(&mut self, associativity: u32) -> Result<(), String> {
        match self {
            GenericSet::DirectMapped(s) => s.set_associativity(associativity),
            GenericSet::RoundRobin(s) => s.set_associativity(associativity),
        }
    }

    fn associativity(&self) -> u32 {
        match self {
            GenericSet::DirectMapped(s) => s.associativity(),
            GenericSet::RoundRobin(s) => s.associativity(),
        }
    }

    fn find(&mut self, tag: CacheTag, address: u64) -> AccessResult {
        match self {
            GenericSet::DirectMapped(s) => s.find(tag, address),
            GenericSet::RoundRobin(s) => s.find(tag, address),
        }
    }

    fn replace(&mut self, tag: CacheTag) {
        match self {
            GenericSet::DirectMapped(s) => s.replace(tag),
            GenericSet::RoundRobin(s) => s.replace(tag),
        }
    }

    fn invalidate(&mut self, tag: CacheTag, address: u64) {
        match self {
            GenericSet::DirectMapped(s) => s.invalidate(tag, address),
            GenericSet::RoundRobin(s) => s.invalidate(tag, address),
        }
    }

    fn interference_counts(&self) -> Option<&InterferenceCounts> {
        match self {
            GenericSet::DirectMapped(s) => s.interference_counts(),
            GenericSet::RoundRobin(s) => s.interference_counts(),
        }
    }
}
