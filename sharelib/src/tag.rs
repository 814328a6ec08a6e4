/// The identity of one cache line, plus the address that last invalidated it
///
/// Equality only looks at the tag value, so a tombstoned tag still matches lookups for the same
/// line. A tag with no tombstone is live, a tag with one is dead.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheTag {
    tag: u64,
    tombstone: Option<u64>,
}

impl CacheTag {
    pub fn new(tag: u64) -> Self {
        Self { tag, tombstone: None }
    }

    /// The address-derived tag value
    pub fn value(&self) -> u64 {
        self.tag
    }

    /// Marks the tag dead, remembering the byte address responsible
    pub fn kill(&mut self, address: u64) {
        self.tombstone = Some(address);
    }

    pub fn is_dead(&self) -> bool {
        self.tombstone.is_some()
    }

    /// True only for a dead tag whose tombstone was left by exactly this address
    pub fn matches(&self, address: u64) -> bool {
        self.tombstone == Some(address)
    }

    pub fn tombstone_address(&self) -> Option<u64> {
        self.tombstone
    }
}

impl PartialEq for CacheTag {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
    }
}

impl Eq for CacheTag {}

impl From<u64> for CacheTag {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}
