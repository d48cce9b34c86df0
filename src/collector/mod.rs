//! Collector Module
//!
//! Scrape-driven poll cycles producing per-array snapshots.

pub mod poller;

pub use poller::{ArraySnapshot, PollOutcome, Poller};
