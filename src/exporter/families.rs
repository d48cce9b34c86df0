//! Metric Families
//!
//! Turns one poll's snapshots into Prometheus gauges. A fresh registry is
//! built per scrape, so arrays and pools that disappear stop being exported
//! without any bookkeeping.

use crate::collector::{ArraySnapshot, PollOutcome};
use crate::engine::{PerfCounter, PoolMetrics, VolumeMetrics};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::warn;

// =============================================================================
// Names & Labels
// =============================================================================

pub const EXPORTER_UP: &str = "flashsystem_exporter_up";

pub const SUBSYSTEM_METADATA: &str = "flashsystem_subsystem_metadata";
pub const SUBSYSTEM_HEALTH: &str = "flashsystem_subsystem_health";
pub const SUBSYSTEM_RESPONSE: &str = "flashsystem_subsystem_response";
pub const SUBSYSTEM_PHYSICAL_TOTAL: &str = "flashsystem_subsystem_physical_total_capacity_bytes";
pub const SUBSYSTEM_PHYSICAL_FREE: &str = "flashsystem_subsystem_physical_free_capacity_bytes";
pub const SUBSYSTEM_PHYSICAL_USED: &str = "flashsystem_subsystem_physical_used_capacity_bytes";

pub const POOL_METADATA: &str = "flashsystem_pool_metadata";
pub const POOL_HEALTH: &str = "flashsystem_pool_health";
pub const POOL_WARNING_THRESHOLD: &str = "flashsystem_pool_capacity_warning_threshold";
pub const POOL_CAPACITY_USABLE: &str = "flashsystem_pool_capacity_usable_bytes";
pub const POOL_CAPACITY_USED: &str = "flashsystem_pool_capacity_used_bytes";
pub const POOL_PHYSICAL_CAPACITY: &str = "flashsystem_pool_physical_capacity_bytes";
pub const POOL_LOGICAL_USABLE: &str = "flashsystem_pool_logical_capacity_usable_bytes";
pub const POOL_LOGICAL_USED: &str = "flashsystem_pool_logical_capacity_used_bytes";
pub const POOL_LOGICAL_CAPACITY: &str = "flashsystem_pool_logical_capacity_bytes";
pub const POOL_SAVINGS: &str = "flashsystem_pool_savings_bytes";
pub const POOL_SAVINGS_THIN: &str = "flashsystem_pool_savings_thin_bytes";
pub const POOL_SAVINGS_DEDUP: &str = "flashsystem_pool_savings_dedup_bytes";
pub const POOL_SAVINGS_COMPRESSION: &str = "flashsystem_pool_savings_compression_bytes";

pub const VOLUME_METADATA: &str = "flashsystem_volume_metadata";
pub const VOLUME_CAPACITY_USED: &str = "flashsystem_volume_capacity_used_bytes";

const LABELS_EXPORTER: &[&str] = &[];
const LABELS_SUBSYSTEM: &[&str] = &["subsystem_name"];
const LABELS_SUBSYSTEM_META: &[&str] = &["subsystem_name", "vendor", "model", "version", "is_internal_storage"];
const LABELS_POOL: &[&str] = &["subsystem_name", "pool_name"];
const LABELS_POOL_META: &[&str] = &["subsystem_name", "pool_id", "pool_name", "storageclass", "is_internal_storage"];
const LABELS_VOLUME: &[&str] = &["subsystem_name", "pool_name", "vol_name"];
const LABELS_VOLUME_META: &[&str] = &[
    "subsystem_name",
    "pool_name",
    "vol_name",
    "compression",
    "deduplication",
    "type",
    "encryption",
];

/// Exported name and help text of a performance counter
pub fn perf_family(counter: PerfCounter) -> (&'static str, &'static str) {
    match counter {
        PerfCounter::ReadIops => ("flashsystem_subsystem_rd_iops", "overall performance - read IOPS"),
        PerfCounter::WriteIops => ("flashsystem_subsystem_wr_iops", "overall performance - write IOPS"),
        PerfCounter::ReadBytes => (
            "flashsystem_subsystem_rd_bytes",
            "overall performance - read throughput bytes/s",
        ),
        PerfCounter::WriteBytes => (
            "flashsystem_subsystem_wr_bytes",
            "overall performance - write throughput bytes/s",
        ),
        PerfCounter::Latency => (
            "flashsystem_subsystem_latency_seconds",
            "overall performance - average latency seconds",
        ),
        PerfCounter::ReadLatency => (
            "flashsystem_subsystem_rd_latency_seconds",
            "overall performance - read latency seconds",
        ),
        PerfCounter::WriteLatency => (
            "flashsystem_subsystem_wr_latency_seconds",
            "overall performance - write latency seconds",
        ),
    }
}

fn families() -> Vec<(&'static str, &'static str, &'static [&'static str])> {
    let mut families = vec![
        (EXPORTER_UP, "Whether the last poll cycle loaded its configuration", LABELS_EXPORTER),
        (SUBSYSTEM_METADATA, "System information", LABELS_SUBSYSTEM_META),
        (SUBSYSTEM_HEALTH, "System health", LABELS_SUBSYSTEM),
        (SUBSYSTEM_RESPONSE, "System response", LABELS_SUBSYSTEM_META),
        (SUBSYSTEM_PHYSICAL_TOTAL, "System physical total capacity (byte)", LABELS_SUBSYSTEM),
        (SUBSYSTEM_PHYSICAL_FREE, "System physical free capacity (byte)", LABELS_SUBSYSTEM),
        (SUBSYSTEM_PHYSICAL_USED, "System physical used capacity (byte)", LABELS_SUBSYSTEM),
        (POOL_METADATA, "Pool metadata", LABELS_POOL_META),
        (POOL_HEALTH, "Pool health status", LABELS_POOL),
        (POOL_WARNING_THRESHOLD, "Pool capacity warning threshold", LABELS_POOL),
        (POOL_CAPACITY_USABLE, "Pool usable capacity (Byte)", LABELS_POOL),
        (POOL_CAPACITY_USED, "Pool used capacity (byte)", LABELS_POOL),
        (POOL_PHYSICAL_CAPACITY, "Pool physical capacity (byte)", LABELS_POOL),
        (POOL_LOGICAL_USABLE, "Pool logical usable capacity (byte)", LABELS_POOL),
        (POOL_LOGICAL_USED, "Pool logical used capacity (byte)", LABELS_POOL),
        (POOL_LOGICAL_CAPACITY, "Pool logical capacity (byte)", LABELS_POOL),
        (POOL_SAVINGS, "dedupe, thin provisioning, and compression savings", LABELS_POOL),
        (POOL_SAVINGS_THIN, "thin provisioning savings", LABELS_POOL),
        (POOL_SAVINGS_DEDUP, "dedupe savings", LABELS_POOL),
        (POOL_SAVINGS_COMPRESSION, "compression savings", LABELS_POOL),
        (VOLUME_METADATA, "Volume metadata", LABELS_VOLUME_META),
        (VOLUME_CAPACITY_USED, "Volume capacity used (byte)", LABELS_VOLUME),
    ];
    for counter in PerfCounter::ALL {
        let (name, help) = perf_family(counter);
        families.push((name, help, LABELS_SUBSYSTEM));
    }
    families
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics registry: {}", e))
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

// =============================================================================
// Metric Families
// =============================================================================

/// Gauge families of one scrape
pub struct MetricFamilies {
    registry: Registry,
    gauges: IndexMap<&'static str, GaugeVec>,
}

impl MetricFamilies {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let mut gauges = IndexMap::new();
        for (name, help, labels) in families() {
            let gauge = GaugeVec::new(Opts::new(name, help), labels).map_err(metrics_error)?;
            registry
                .register(Box::new(gauge.clone()))
                .map_err(metrics_error)?;
            gauges.insert(name, gauge);
        }
        Ok(Self { registry, gauges })
    }

    fn set(&self, name: &str, labels: &[&str], value: f64) {
        let Some(gauge) = self.gauges.get(name) else {
            warn!(metric = name, "Unknown metric family");
            return;
        };
        match gauge.get_metric_with_label_values(labels) {
            Ok(g) => g.set(value),
            Err(e) => warn!(metric = name, "Failed to set gauge: {}", e),
        }
    }

    fn set_some(&self, name: &str, labels: &[&str], value: Option<f64>) {
        if let Some(value) = value {
            self.set(name, labels, value);
        }
    }

    /// Record a whole poll cycle
    pub fn record(&self, outcome: &PollOutcome) {
        self.set(EXPORTER_UP, &[], if outcome.complete { 1.0 } else { 0.0 });
        for snapshot in &outcome.snapshots {
            self.record_snapshot(snapshot);
        }
    }

    /// Record one array
    pub fn record_snapshot(&self, snapshot: &ArraySnapshot) {
        let array = snapshot.array.as_str();
        let (vendor, model, version) = snapshot.system_labels();
        let meta = [array, vendor, model, version, flag(snapshot.all_internal())];

        self.set(SUBSYSTEM_RESPONSE, &meta, if snapshot.responsive { 1.0 } else { 0.0 });

        let Some(system) = &snapshot.metrics else {
            return;
        };

        self.set(SUBSYSTEM_METADATA, &meta, 0.0);
        self.set(SUBSYSTEM_HEALTH, &[array], system.health);
        self.set_some(SUBSYSTEM_PHYSICAL_TOTAL, &[array], system.physical_total);
        self.set_some(SUBSYSTEM_PHYSICAL_USED, &[array], system.physical_used);
        self.set_some(SUBSYSTEM_PHYSICAL_FREE, &[array], system.physical_free);
        for (counter, value) in &system.performance {
            self.set(perf_family(*counter).0, &[array], *value);
        }

        for pool in &snapshot.pools {
            self.record_pool(array, pool);
        }
        for volume in &snapshot.volumes {
            self.record_volume(array, volume);
        }
    }

    fn record_pool(&self, array: &str, pool: &PoolMetrics) {
        let labels = [array, pool.pool_name.as_str()];
        self.set(
            POOL_METADATA,
            &[
                array,
                pool.pool_id.as_str(),
                pool.pool_name.as_str(),
                pool.storage_classes.as_str(),
                flag(pool.internal),
            ],
            0.0,
        );
        self.set(POOL_HEALTH, &labels, pool.health);
        self.set_some(POOL_WARNING_THRESHOLD, &labels, pool.warning_threshold);
        self.set_some(POOL_CAPACITY_USABLE, &labels, pool.capacity_usable);
        self.set_some(POOL_CAPACITY_USED, &labels, pool.capacity_used);
        self.set_some(POOL_PHYSICAL_CAPACITY, &labels, pool.physical_total);
        self.set_some(POOL_LOGICAL_USABLE, &labels, pool.logical_usable);
        self.set_some(POOL_LOGICAL_USED, &labels, pool.logical_used);
        self.set_some(POOL_LOGICAL_CAPACITY, &labels, pool.logical_total);
        self.set_some(POOL_SAVINGS, &labels, pool.efficiency_savings);
        self.set_some(POOL_SAVINGS_THIN, &labels, pool.savings.thin);
        self.set_some(POOL_SAVINGS_DEDUP, &labels, pool.savings.dedup);
        self.set_some(POOL_SAVINGS_COMPRESSION, &labels, pool.savings.compression);
    }

    fn record_volume(&self, array: &str, volume: &VolumeMetrics) {
        let name = volume.name.as_str();
        let pool = volume.pool_name.as_str();
        self.set(
            VOLUME_METADATA,
            &[
                array,
                pool,
                name,
                on_off(volume.compressed),
                on_off(volume.deduplicated),
                if volume.thin { "thin" } else { "thick" },
                on_off(volume.encrypted),
            ],
            0.0,
        );
        self.set_some(VOLUME_CAPACITY_USED, &[array, pool, name], volume.capacity_used);
    }

    /// Prometheus text exposition
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics encoding: {}", e)))
    }
}

/// Build and encode the families for one poll cycle
pub fn render(outcome: &PollOutcome) -> Result<String> {
    let families = MetricFamilies::new()?;
    families.record(outcome);
    families.encode()
}
