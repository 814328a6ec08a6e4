use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};
use crate::cache::{CacheId, Cluster};
use crate::config::SimulationConfig;
use crate::hex::{HEX_DIGITS, INVALID_DIGIT};
use crate::report::{symbolize, ConflictRecord, SymbolTable};
use crate::stats::{AccessKind, CacheStats};

/// Every record is a fixed width line: `<core> <address> <R|W> <size>\n`
pub const RECORD_SIZE: usize = 40;
const FIELD_SIZE: usize = 16;
const CORE_OFFSET: usize = 0;
const CORE_UPPER: usize = CORE_OFFSET + FIELD_SIZE;
const ADDRESS_OFFSET: usize = CORE_UPPER + 1;
const ADDRESS_UPPER: usize = ADDRESS_OFFSET + FIELD_SIZE;
const RW_MODE: usize = ADDRESS_UPPER + 1;
const SIZE: usize = RW_MODE + 2;
const SIZE_UPPER: usize = RECORD_SIZE - 1;
// Sizes are three decimal digits
const MAX_ACCESS_SIZE: u64 = 999;

/// How the per-core streams of a trace are replayed
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReplayMode {
    /// One access at a time, in trace order. Results are deterministic
    #[default]
    Sequential,
    /// One thread per core, each replaying its own accesses in order. Cross-core interleaving
    /// is left to the scheduler
    Parallel,
}

/// A single decoded trace line
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub core: usize,
    pub address: u64,
    pub kind: AccessKind,
    pub size: u16,
}

/// The simulator stands in for an instrumentation harness: it feeds each core's accesses to
/// that core's cache, and collects the results
///
/// It supports calling simulate multiple times; caches keep their contents between calls
pub struct Simulator {
    cluster: Cluster,
    symbols: SymbolTable,
    // Widest access seen at each start address
    access_sizes: BTreeMap<u64, u16>,
    simulation_time: Duration,
    records: u64,
}

/// The result of a simulation. Can be serialised as the JSON output
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct SimulationResult {
    pub records: u64,
    pub caches: Vec<CacheStats>,
    pub interference: Vec<InterferenceRecord>,
}

/// One interfering address pair, as reported in the JSON output
#[derive(Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct InterferenceRecord {
    pub low: u64,
    pub high: u64,
    pub distance: u64,
    pub count: u64,
}

impl Simulator {
    /// Creates a simulator with one cache per configured core, all peers of each other
    pub fn new(config: &SimulationConfig) -> Result<Self, String> {
        if config.cores == 0 {
            return Err("The simulation needs at least one core".to_string());
        }
        Ok(Self {
            cluster: Cluster::with_cores(&config.cache, config.cores)?,
            symbols: SymbolTable::new(&config.symbols),
            access_sizes: BTreeMap::new(),
            simulation_time: Duration::new(0, 0),
            records: 0,
        })
    }

    /// Simulates a trace held in a byte array
    ///
    /// The byte array must be made of whole 40 byte records. Malformed records stop the
    /// simulation with an error naming the record; accesses before it have already been applied.
    ///
    /// Reads from the byte array are sequential, which suits a memory mapped file advised as such
    ///
    /// # Arguments
    ///
    /// * `bytes`: The input byte array
    /// * `mode`: Whether cores are replayed one after another or on their own threads
    ///
    /// returns: Result<SimulationResult, String>
    pub fn simulate(&mut self, bytes: &[u8], mode: ReplayMode) -> Result<SimulationResult, String> {
        if bytes.len() % RECORD_SIZE != 0 {
            return Err(format!(
                "The trace is {} bytes long, which isn't a whole number of {RECORD_SIZE} byte records",
                bytes.len()
            ));
        }
        let start = Instant::now();
        let cores = self.cluster.len();
        match mode {
            ReplayMode::Sequential => {
                for (index, chunk) in bytes.chunks_exact(RECORD_SIZE).enumerate() {
                    let record = parse_numbered_record(chunk, index, cores)?;
                    replay(&self.cluster, &record);
                    self.remember_access(&record);
                    self.records += 1;
                }
            }
            ReplayMode::Parallel => {
                let mut streams = vec![Vec::new(); cores];
                for (index, chunk) in bytes.chunks_exact(RECORD_SIZE).enumerate() {
                    let record = parse_numbered_record(chunk, index, cores)?;
                    self.remember_access(&record);
                    streams[record.core].push(record);
                }
                let cluster = &self.cluster;
                thread::scope(|scope| {
                    for stream in &streams {
                        scope.spawn(move || stream.iter().for_each(|record| replay(cluster, record)));
                    }
                });
                self.records += streams.iter().map(|stream| stream.len() as u64).sum::<u64>();
            }
        }
        self.simulation_time += start.elapsed();
        log::info!("replayed {} records on {cores} cores in {:?}", self.records, self.simulation_time);
        Ok(self.result())
    }

    /// The counters and interference gathered so far
    pub fn result(&self) -> SimulationResult {
        SimulationResult {
            records: self.records,
            caches: self.cluster.caches().iter().map(|cache| cache.stats()).collect(),
            interference: self
                .cluster
                .interference_counts()
                .into_iter()
                .map(|(pair, count)| InterferenceRecord {
                    low: pair.low,
                    high: pair.high,
                    distance: pair.distance(),
                    count,
                })
                .collect(),
        }
    }

    /// Interference resolved against the configured variables, most frequent first
    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        let counts = self.cluster.interference_counts();
        symbolize(&counts, &self.symbols, |address| self.covering_access(address))
    }

    fn remember_access(&mut self, record: &TraceRecord) {
        let size = self.access_sizes.entry(record.address).or_default();
        *size = (*size).max(record.size);
    }

    /// Start and size of the replayed access which covers `address`
    ///
    /// Lines after the first of a multi-line access are tracked by their line address, which
    /// no record starts at. The closest access starting at or before the address which reaches it
    /// is used. Empty accesses count as one byte.
    fn covering_access(&self, address: u64) -> Option<(u64, u64)> {
        self.access_sizes
            .range(address.saturating_sub(MAX_ACCESS_SIZE)..=address)
            .rev()
            .map(|(start, size)| (*start, (*size).max(1) as u64))
            .find(|(start, size)| address - start < *size)
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Gets the wall-clock execution time for processing
    pub fn get_execution_time(&self) -> &Duration {
        &self.simulation_time
    }
}

/// Sends one record to its core's cache, taking the single line path when the access fits
fn replay(cluster: &Cluster, record: &TraceRecord) {
    let id = CacheId(record.core);
    let line_size = cluster.cache(id).base().line_size();
    let room_in_line = line_size - (record.address & (line_size - 1));
    if record.size as u64 <= room_in_line {
        cluster.access_single_line(id, record.address, record.kind);
    } else {
        cluster.access(id, record.address, record.size as u64, record.kind);
    }
}

fn parse_numbered_record(chunk: &[u8], index: usize, cores: usize) -> Result<TraceRecord, String> {
    let buffer: &[u8; RECORD_SIZE] = chunk
        .try_into()
        .map_err(|_| format!("Record {} isn't {RECORD_SIZE} bytes long", index + 1))?;
    let record = parse_record(buffer).map_err(|e| format!("Record {}: {e}", index + 1))?;
    if record.core >= cores {
        return Err(format!(
            "Record {} is for core {}, but only {cores} cores are simulated",
            index + 1,
            record.core
        ));
    }
    Ok(record)
}

/// Decodes one fixed width trace record
///
/// # Examples
///
/// ```
/// use sharelib::simulator::parse_record;
/// use sharelib::stats::AccessKind;
/// let record = parse_record(b"0000000000000001 0000000000001040 W 008\n").unwrap();
/// assert_eq!(record.core, 1);
/// assert_eq!(record.address, 0x1040);
/// assert_eq!(record.kind, AccessKind::Store);
/// assert_eq!(record.size, 8);
/// ```
pub fn parse_record(buffer: &[u8; RECORD_SIZE]) -> Result<TraceRecord, String> {
    for separator in [CORE_UPPER, ADDRESS_UPPER, RW_MODE + 1] {
        if buffer[separator] != b' ' {
            return Err(format!("expected a space at column {separator}"));
        }
    }
    if buffer[SIZE_UPPER] != b'\n' {
        return Err("expected the record to end with a newline".to_string());
    }
    let core = parse_hex(&field(buffer, CORE_OFFSET)).ok_or("the core isn't a 16 digit hex number")?;
    let address = parse_hex(&field(buffer, ADDRESS_OFFSET)).ok_or("the address isn't a 16 digit hex number")?;
    let kind = match buffer[RW_MODE] {
        b'R' | b'r' => AccessKind::Load,
        b'W' | b'w' => AccessKind::Store,
        other => return Err(format!("unknown access mode '{}'", other as char)),
    };
    let mut size_field = [0u8; SIZE_UPPER - SIZE];
    size_field.copy_from_slice(&buffer[SIZE..SIZE_UPPER]);
    let size = parse_size(&size_field).ok_or("the size isn't a 3 digit decimal number")?;
    let core = usize::try_from(core).map_err(|_| format!("core {core} is out of range"))?;
    Ok(TraceRecord { core, address, kind, size })
}

fn field(buffer: &[u8; RECORD_SIZE], offset: usize) -> [u8; FIELD_SIZE] {
    let mut out = [0u8; FIELD_SIZE];
    out.copy_from_slice(&buffer[offset..offset + FIELD_SIZE]);
    out
}

/// Parses a 64-bit value from 16 hexadecimal digits, upper or lower case
///
/// Parsing with the standard library becomes the bottleneck for small caches, so each byte goes
/// through a 256 entry table generated by the build script. Bytes which aren't hex digits map to
/// a sentinel, which fails the parse.
///
/// # Examples
///
/// ```
/// use sharelib::simulator::parse_hex;
/// assert_eq!(parse_hex(b"000000000000000A"), Some(10));
/// assert_eq!(parse_hex(b"00000000deadBEEF"), Some(0xdeadbeef));
/// assert_eq!(parse_hex(b"0000000000000x0A"), None);
/// ```
pub fn parse_hex(buf: &[u8; 16]) -> Option<u64> {
    let mut res: u64 = 0;
    for byte in buf {
        let digit = HEX_DIGITS[*byte as usize];
        if digit == INVALID_DIGIT {
            return None;
        }
        res = res << 4 | digit as u64;
    }
    debug_assert_eq!(
        std::str::from_utf8(buf).ok().and_then(|s| u64::from_str_radix(s, 16).ok()),
        Some(res)
    );
    Some(res)
}

/// Parses a 3 digit decimal size
///
/// # Examples
///
/// ```
/// use sharelib::simulator::parse_size;
/// assert_eq!(parse_size(b"010"), Some(10));
/// assert_eq!(parse_size(b"1 0"), None);
/// ```
pub fn parse_size(buf: &[u8; 3]) -> Option<u16> {
    let mut res: u16 = 0;
    for byte in buf {
        if !byte.is_ascii_digit() {
            return None;
        }
        res = res * 10 + (byte - b'0') as u16;
    }
    Some(res)
}
