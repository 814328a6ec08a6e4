use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::time::Instant;
use clap::Parser;
use sharelib::config::SimulationConfig;
use sharelib::io::load_trace;
use sharelib::report::write_report;
use sharelib::simulator::{ReplayMode, Simulator};

#[cfg(debug_assertions)]
const DEBUG_DEFAULT: bool = true;

#[cfg(not(debug_assertions))]
const DEBUG_DEFAULT: bool = false;

#[derive(Parser, Debug)]
#[command(about = String::from("Multi-core cache simulator for finding false sharing"))]
struct Args {
    config: String,
    trace: String,

    /// Replay cores one after another, or each on its own thread
    #[arg(short, long, value_enum, default_value_t = ReplayMode::Sequential)]
    mode: ReplayMode,

    /// Write the symbolised interference report to this file
    #[arg(short, long)]
    report: Option<String>,

    /// Print the long statistics report for every cache
    #[arg(short, long)]
    stats: bool,

    #[arg(short, long)]
    performance: bool,

    #[arg(short, long, default_value_t = DEBUG_DEFAULT)]
    debug: bool,
}

fn main() -> Result<(), String> {
    env_logger::init();
    let start = Instant::now();
    let args = Args::parse();
    let config_file = File::open(&args.config).map_err(|e| format!("Couldn't open the config file at path {}: {e}", args.config))?;
    let config = SimulationConfig::from_reader(BufReader::new(config_file))?;
    let mut simulator = Simulator::new(&config)?;
    let trace_file = File::open(&args.trace).map_err(|e| format!("Couldn't open the trace file at path {}: {e}", args.trace))?;
    let trace = load_trace(trace_file)?;
    let result = simulator.simulate(&trace, args.mode)?;
    println!("{}", serde_json::to_string_pretty(&result).map_err(|e| format!("Couldn't serialise the output {e}"))?);
    if args.stats {
        for (index, stats) in result.caches.iter().enumerate() {
            print!("{}", stats.stats_long(&format!("[core {index}] "), config.cache.cache_type));
        }
    }
    if let Some(path) = &args.report {
        let conflicts = simulator.conflicts();
        let report_file = File::create(path).map_err(|e| format!("Couldn't create the report file at path {path}: {e}"))?;
        write_report(&conflicts, BufWriter::new(report_file)).map_err(|e| format!("Couldn't write the report: {e}"))?;
        log::info!("wrote {} conflicts to {path}", conflicts.len());
    }
    if args.performance {
        let end = Instant::now();
        let simulation_time = simulator.get_execution_time();
        let total_time = end - start;
        println!("Simulation time: {}s", simulation_time.as_nanos() as f64 / 1e9);
        println!("Total execution time (includes initial parsing, configuration, and output): {}s", total_time.as_nanos() as f64 / 1e9)
    }
    if args.debug {
        #[cfg(debug_assertions)]
        println!("Running the debug binary, debug mode is enabled by default. If benchmarking, do not use this binary, re-compile with the --release argument when using cargo run");
        println!("Parsed input configuration: {config:?}");
        let interfering_pairs = result.interference.len();
        let interference_events = result.interference.iter().map(|pair| pair.count).sum::<u64>();
        println!("Interfering address pairs: {interfering_pairs}, interference events: {interference_events}");
        if let Some(closest) = result.interference.iter().min_by_key(|pair| pair.distance) {
            println!("Closest interfering pair: {:#x} and {:#x}, {} bytes apart", closest.low, closest.high, closest.distance);
        }
    }
    Ok(())
}
