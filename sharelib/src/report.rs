use std::fmt;
use std::io::Write;
use std::str::FromStr;
use lazy_static::lazy_static;
use regex::Regex;
use crate::cache_sets::InterferenceCounts;
use crate::config::SymbolConfig;

lazy_static! {
    static ref CONFLICT_PATTERN: Regex = Regex::new(
        r"^(?P<first>\S+)\s+(?P<first_offset>\d+)\s+(?P<first_size>\d+)\s+(?P<second>\S+)\s+(?P<second_offset>\d+)\s+(?P<second_size>\d+)\s+(?P<count>\d+)$"
    )
    .expect("the conflict pattern is a valid regex");
}

/// Known variables, sorted by address so lookups can binary search
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<SymbolConfig>,
}

impl SymbolTable {
    pub fn new(symbols: &[SymbolConfig]) -> Self {
        let mut symbols = symbols.to_vec();
        symbols.sort_by_key(|symbol| symbol.address);
        Self { symbols }
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Finds the variable covering `address`, and the offset of the address within it
    pub fn resolve(&self, address: u64) -> Option<(&SymbolConfig, u64)> {
        let after = self.symbols.partition_point(|symbol| symbol.address <= address);
        let symbol = self.symbols[..after].last()?;
        let offset = address - symbol.address;
        (offset < symbol.size).then_some((symbol, offset))
    }
}

/// One side of a conflict: which variable was touched, where, and how wide the access was
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSite {
    pub variable: String,
    pub offset: u64,
    pub size: u64,
}

/// A pair of conflicting accesses and how often they interfered
///
/// Written as one whitespace separated line:
/// `variable offset size variable offset size count`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub first: AccessSite,
    pub second: AccessSite,
    pub count: u64,
}

impl fmt::Display for ConflictRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.first.variable,
            self.first.offset,
            self.first.size,
            self.second.variable,
            self.second.offset,
            self.second.size,
            self.count
        )
    }
}

impl FromStr for ConflictRecord {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let captures = CONFLICT_PATTERN
            .captures(line.trim())
            .ok_or_else(|| format!("Couldn't parse the conflict record '{line}'"))?;
        let number = |name: &str| -> Result<u64, String> {
            captures[name]
                .parse::<u64>()
                .map_err(|e| format!("Couldn't parse {name} in '{line}': {e}"))
        };
        Ok(Self {
            first: AccessSite {
                variable: captures["first"].to_string(),
                offset: number("first_offset")?,
                size: number("first_size")?,
            },
            second: AccessSite {
                variable: captures["second"].to_string(),
                offset: number("second_offset")?,
                size: number("second_size")?,
            },
            count: number("count")?,
        })
    }
}

/// Resolves raw interfering address pairs to variables
///
/// Each address is first mapped to the access that touched it, and the variable is resolved from
/// that access's start. Pairs where either address has no known access, or where an access
/// starts outside every known variable, are dropped. Records come out most frequent first, ties
/// broken by address.
///
/// # Arguments
///
/// * `counts`: Interference gathered by the caches
/// * `symbols`: The variables to resolve against
/// * `access_at`: The start and size of the access covering an address
///
/// returns: Vec<ConflictRecord>
pub fn symbolize(
    counts: &InterferenceCounts,
    symbols: &SymbolTable,
    access_at: impl Fn(u64) -> Option<(u64, u64)>,
) -> Vec<ConflictRecord> {
    let site = |address: u64| {
        let (start, size) = access_at(address)?;
        symbols.resolve(start).map(|(symbol, offset)| AccessSite {
            variable: symbol.name.clone(),
            offset,
            size,
        })
    };
    let mut records = counts
        .iter()
        .filter_map(|(pair, count)| {
            Some(ConflictRecord {
                first: site(pair.low)?,
                second: site(pair.high)?,
                count: *count,
            })
        })
        .collect::<Vec<_>>();
    // The map is ordered by address, a stable sort keeps that order among equal counts
    records.sort_by(|a, b| b.count.cmp(&a.count));
    records
}

/// Writes one record per line
pub fn write_report(records: &[ConflictRecord], mut writer: impl Write) -> std::io::Result<()> {
    for record in records {
        writeln!(writer, "{record}")?;
    }
    writer.flush()
}

/// Reads a report back, ignoring blank lines
pub fn parse_report(text: &str) -> Result<Vec<ConflictRecord>, String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(ConflictRecord::from_str)
        .collect()
}
