//! # ShareLib
//!
//! Sharelib is a library for detecting false sharing by simulating one cache per core
//!
//! Each cache keeps tombstones for lines invalidated by another core's store. When a later access
//! finds a tombstone left by a different address on the same line, the pair of addresses is
//! recorded as interference, which is the signal for two variables sharing a line.
//!
//! A simulator replays multi-core traces against the caches, and the report module turns the
//! raw address pairs into per-variable conflicts

/// Geometry shared by every cache: sizes, and splitting addresses into tags and sets
pub mod base;

/// Contains the composed cache, and the cluster which owns every core's cache
pub mod cache;

/// Contains the set policies, with a trait for implementing custom ones
pub mod cache_sets;

/// Contains definitions for the JSON input format
pub mod config;

/// Loading trace files
pub mod io;

/// Turning interfering address pairs into per-variable conflict reports
pub mod report;

/// Contains the simulator used to replay a multi-core trace
pub mod simulator;

/// Hit, miss and tombstone counters, and the text report built from them
pub mod stats;

/// Cache line tags, which can be killed into tombstones
pub mod tag;

// Generated from the build.rs, private
mod hex {
    include!(concat!(env!("OUT_DIR"), "/hex.rs"));
}
#[cfg(test)]
mod test;
