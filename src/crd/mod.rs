//! Custom Resource Definitions
//!
//! - FlashSystemCluster: an external array and its exporter conditions

pub mod flash_system_cluster;

pub use flash_system_cluster::*;
