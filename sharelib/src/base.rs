use crate::tag::CacheTag;

/// Policy independent cache geometry: sizes, and how an address splits into tag and set
#[derive(Debug, Clone)]
pub struct CacheBase {
    name: String,
    cache_size: u64,
    line_size: u64,
    associativity: u32,
    line_shift: u32,
    set_index_mask: u64,
}

impl CacheBase {
    /// Computes the geometry of a cache
    ///
    /// The line size and the resulting number of sets must both be powers of two, as the set index
    /// is taken straight from the address bits
    ///
    /// # Arguments
    ///
    /// * `name`: Used when reporting statistics
    /// * `cache_size`: Total size in bytes
    /// * `line_size`: Size of a single line in bytes
    /// * `associativity`: Lines per set
    ///
    /// returns: Result<CacheBase, String>
    pub fn new(name: impl Into<String>, cache_size: u64, line_size: u64, associativity: u32) -> Result<Self, String> {
        let name = name.into();
        if !line_size.is_power_of_two() {
            return Err(format!("{name}: the line size must be a power of two, not {line_size}"));
        }
        if associativity == 0 {
            return Err(format!("{name}: the associativity must be at least 1"));
        }
        let set_bytes = line_size.checked_mul(associativity as u64).ok_or_else(|| {
            format!("{name}: {associativity} lines of {line_size} bytes overflow the address space")
        })?;
        let num_sets = cache_size / set_bytes;
        if cache_size % set_bytes != 0 || !num_sets.is_power_of_two() {
            return Err(format!(
                "{name}: a {cache_size} byte cache with {line_size} byte lines and associativity {associativity} doesn't give a power of two number of sets"
            ));
        }
        Ok(Self {
            line_shift: line_size.trailing_zeros(),
            set_index_mask: num_sets - 1,
            name,
            cache_size,
            line_size,
            associativity,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_size(&self) -> u64 {
        self.cache_size
    }

    pub fn line_size(&self) -> u64 {
        self.line_size
    }

    pub fn associativity(&self) -> u32 {
        self.associativity
    }

    pub fn num_sets(&self) -> u64 {
        self.set_index_mask + 1
    }

    /// Converts an address into its line tag and the index of the set holding it
    pub fn split_address(&self, address: u64) -> (CacheTag, usize) {
        let tag = address >> self.line_shift;
        (CacheTag::new(tag), (tag & self.set_index_mask) as usize)
    }

    /// As [`CacheBase::split_address`], also returning the byte offset within the line
    pub fn split_address_with_offset(&self, address: u64) -> (CacheTag, usize, u64) {
        let (tag, set_index) = self.split_address(address);
        (tag, set_index, address & (self.line_size - 1))
    }

    /// Start of the line after the one holding `address`, if it is addressable
    pub(crate) fn next_line(&self, address: u64) -> Option<u64> {
        (address & !(self.line_size - 1)).checked_add(self.line_size)
    }
}
