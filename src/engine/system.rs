//! System Derivation
//!
//! Array-wide capacity, health and performance counters.

use super::pool::PoolMetrics;
use crate::model::{StatRecord, SystemRecord};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const MIB: f64 = 1_048_576.0;
const MILLIS: f64 = 0.001;

/// Performance counters read from `lssystemstats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PerfCounter {
    ReadBytes,
    WriteBytes,
    ReadIops,
    WriteIops,
    Latency,
    ReadLatency,
    WriteLatency,
}

impl PerfCounter {
    pub const ALL: [PerfCounter; 7] = [
        PerfCounter::ReadBytes,
        PerfCounter::WriteBytes,
        PerfCounter::ReadIops,
        PerfCounter::WriteIops,
        PerfCounter::Latency,
        PerfCounter::ReadLatency,
        PerfCounter::WriteLatency,
    ];

    /// Counter fed by the named stat, if any
    pub fn from_stat(name: &str) -> Option<Self> {
        match name {
            "vdisk_r_mb" => Some(PerfCounter::ReadBytes),
            "vdisk_w_mb" => Some(PerfCounter::WriteBytes),
            "vdisk_r_io" => Some(PerfCounter::ReadIops),
            "vdisk_w_io" => Some(PerfCounter::WriteIops),
            "vdisk_ms" => Some(PerfCounter::Latency),
            "vdisk_r_ms" => Some(PerfCounter::ReadLatency),
            "vdisk_w_ms" => Some(PerfCounter::WriteLatency),
            _ => None,
        }
    }

    /// Multiplier from the array's unit (MB/s, IO/s, ms) to bytes/s, IO/s, s
    pub fn factor(&self) -> f64 {
        match self {
            PerfCounter::ReadBytes | PerfCounter::WriteBytes => MIB,
            PerfCounter::ReadIops | PerfCounter::WriteIops => 1.0,
            PerfCounter::Latency | PerfCounter::ReadLatency | PerfCounter::WriteLatency => MILLIS,
        }
    }
}

/// Array-wide values for one poll
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMetrics {
    pub vendor: String,
    pub model: String,
    pub version: String,
    pub all_internal: bool,
    /// 0 when the cluster is ready, 1 otherwise
    pub health: f64,
    pub total_reclaimable: Option<f64>,
    pub physical_total: Option<f64>,
    pub physical_used: Option<f64>,
    pub physical_free: Option<f64>,
    pub performance: BTreeMap<PerfCounter, f64>,
}

/// Convert raw stats; unknown names are ignored, missing values skipped
pub fn performance_counters(stats: &[StatRecord]) -> BTreeMap<PerfCounter, f64> {
    let mut counters = BTreeMap::new();
    for stat in stats {
        let Some(counter) = PerfCounter::from_stat(&stat.name) else {
            continue;
        };
        match stat.current {
            Some(value) => {
                counters.insert(counter, value * counter.factor());
            }
            None => warn!(stat = %stat.name, "Stat has no usable value, skipping"),
        }
    }
    counters
}

/// Derive system metrics from the array record and this poll's pools
///
/// `cluster_ready` is `None` when the node listing could not be fetched.
pub fn derive_system(
    system: &SystemRecord,
    stats: &[StatRecord],
    cluster_ready: Option<bool>,
    pools: &[PoolMetrics],
) -> SystemMetrics {
    let total_reclaimable = pools
        .iter()
        .map(|p| p.reclaimable_physical)
        .sum::<Option<f64>>();

    let physical_used = match (system.physical_capacity, system.physical_free, total_reclaimable) {
        (Some(total), Some(free), Some(reclaimable)) => Some(total - free - reclaimable),
        _ => None,
    };
    let physical_free = match (system.physical_capacity, physical_used) {
        (Some(total), Some(used)) => Some(total - used),
        _ => None,
    };

    let metrics = SystemMetrics {
        vendor: system.vendor.clone(),
        model: system.model.clone(),
        version: system.version.clone(),
        all_internal: pools.iter().all(|p| p.internal),
        health: if cluster_ready == Some(true) { 0.0 } else { 1.0 },
        total_reclaimable,
        physical_total: system.physical_capacity,
        physical_used,
        physical_free,
        performance: performance_counters(stats),
    };

    debug!(
        total = ?metrics.physical_total,
        used = ?metrics.physical_used,
        free = ?metrics.physical_free,
        health = metrics.health,
        "Derived system metrics"
    );
    metrics
}
