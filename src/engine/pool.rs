//! Pool Derivation
//!
//! Physical and logical capacity, reclaimable estimates and savings for each
//! bound pool.

use crate::domain::ports::PoolBinding;
use crate::model::{DiskRecord, PoolRecord, PoolStatus};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Reported for physical gauges of child pools
pub const INVALID_SENTINEL: f64 = -1.0;

/// Warning threshold reported when the array has the warning turned off
const WARNING_DISABLED: f64 = 100.0;

// =============================================================================
// Topology
// =============================================================================

/// Properties of a pool's member disks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolTopology {
    /// Every member disk is internally attached
    pub internal: bool,
    /// Every member disk is in `array` mode
    pub array_mode: bool,
    /// Every member disk reports effective used capacity
    pub compression_capable: bool,
}

impl PoolTopology {
    /// A pool without member disks has none of the properties
    pub fn of(disks: &[&DiskRecord]) -> Self {
        if disks.is_empty() {
            return Self::default();
        }
        Self {
            internal: disks.iter().all(|d| d.is_internal()),
            array_mode: disks.iter().all(|d| d.is_array_mode()),
            compression_capable: disks.iter().all(|d| d.supports_compression_accounting()),
        }
    }
}

/// Disks belonging to the named pool
pub fn member_disks<'a>(pool: &str, disks: &'a [DiskRecord]) -> Vec<&'a DiskRecord> {
    disks.iter().filter(|d| d.pool_name == pool).collect()
}

/// Name of the pool whose disks back `pool`
///
/// Child pools own no disks; they sit on their parent's. A child whose
/// parent is not listed falls back to its own name.
pub fn disk_owner<'a>(pool: &'a PoolRecord, pools: &'a [PoolRecord]) -> &'a str {
    if pool.is_root() {
        return &pool.name;
    }
    match pools.iter().find(|p| p.id == pool.parent_id) {
        Some(parent) => &parent.name,
        None => {
            warn!(pool = %pool.name, parent_id = %pool.parent_id, "Parent pool not listed, using own disks");
            &pool.name
        }
    }
}

/// Pools whose disks must be fetched to derive every bound pool
pub fn disk_pools<'a>(pools: &'a [PoolRecord], binding: &PoolBinding) -> BTreeSet<&'a str> {
    pools
        .iter()
        .filter(|pool| binding.contains_pool(&pool.name))
        .map(|pool| disk_owner(pool, pools))
        .collect()
}

// =============================================================================
// Reclaimable Capacity
// =============================================================================

/// Physical capacity that would be returned once reclaimable data is freed
///
/// For internal compressing array disks in a data reduction pool the array's
/// figure is logical, so it is scaled by each disk's physical-to-effective
/// usage ratio, weighted by disk capacity.
pub fn reclaimable_physical(pool: &PoolRecord, disks: &[&DiskRecord]) -> Option<f64> {
    let topology = PoolTopology::of(disks);
    if !topology.internal {
        return Some(0.0);
    }
    if !(topology.array_mode && topology.compression_capable && pool.data_reduction) {
        return pool.reclaimable;
    }

    let reclaimable = pool.reclaimable?;
    let mut sum_capacity = 0.0;
    let mut sum_ratio = 0.0;
    for disk in disks {
        let (Some(capacity), Some(free), Some(effective)) =
            (disk.physical_capacity, disk.physical_free, disk.effective_used)
        else {
            warn!(pool = %pool.name, disk = %disk.id, "Disk capacity unavailable, skipping reclaimable estimate");
            return None;
        };
        let physical_used = (capacity - free).max(0.0);
        sum_capacity += capacity;
        if effective > 0.0 {
            sum_ratio += capacity * physical_used / effective;
        }
    }

    if sum_capacity == 0.0 || sum_ratio == 0.0 {
        return Some(0.0);
    }
    Some(reclaimable * sum_ratio / sum_capacity)
}

// =============================================================================
// Pool Metrics
// =============================================================================

/// Per-pool savings split by technique
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SavingsBreakdown {
    pub thin: Option<f64>,
    pub dedup: Option<f64>,
    pub compression: Option<f64>,
}

/// Everything derived for one pool in one poll
#[derive(Debug, Clone, PartialEq)]
pub struct PoolMetrics {
    pub pool_id: String,
    pub pool_name: String,
    /// Sorted, comma-joined storage classes bound to the pool
    pub storage_classes: String,
    pub internal: bool,
    pub root: bool,
    pub health: f64,
    pub warning_threshold: Option<f64>,
    pub reclaimable_physical: Option<f64>,
    pub capacity_usable: Option<f64>,
    pub capacity_used: Option<f64>,
    pub physical_total: Option<f64>,
    pub logical_usable: Option<f64>,
    pub logical_used: Option<f64>,
    pub logical_total: Option<f64>,
    pub efficiency_savings: Option<f64>,
    pub savings: SavingsBreakdown,
}

/// 0 online, 2 offline, 1 anything else
pub fn pool_health(status: &PoolStatus) -> f64 {
    match status {
        PoolStatus::Online => 0.0,
        PoolStatus::Offline => 2.0,
        _ => 1.0,
    }
}

fn warning_threshold(raw: Option<f64>) -> Option<f64> {
    raw.map(|w| if w == 0.0 { WARNING_DISABLED } else { w })
}

fn sub(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? - b?)
}

fn add(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? + b?)
}

/// Real capacity: consumed physical space for data reduction pools
fn real_capacity(pool: &PoolRecord) -> Option<f64> {
    if pool.data_reduction {
        sub(pool.physical_capacity, pool.physical_free)
    } else {
        pool.real_capacity
    }
}

fn savings_breakdown(pool: &PoolRecord, real: Option<f64>) -> SavingsBreakdown {
    let drp_savings = sub(
        add(sub(pool.used_before_reduction, pool.used_after_reduction), pool.reclaimable),
        pool.dedup_savings,
    )
    .map(|v| v.max(0.0));
    let compress_diff =
        sub(pool.compression_uncompressed, pool.compression_compressed).map(|v| v.max(0.0));
    let drp_compression = if pool.data_reduction { drp_savings } else { Some(0.0) };

    let thin = sub(sub(sub(pool.virtual_capacity, real), drp_compression), compress_diff)
        .map(|v| v.max(0.0));

    let compression = match (pool.compression_active, pool.data_reduction) {
        (false, _) => Some(0.0),
        (true, true) => drp_savings,
        (true, false) => compress_diff,
    };

    SavingsBreakdown {
        thin,
        dedup: pool.dedup_savings,
        compression,
    }
}

/// Derive metrics for one bound pool backed by `members`
pub fn derive_pool(pool: &PoolRecord, members: &[&DiskRecord], binding: &PoolBinding) -> PoolMetrics {
    let topology = PoolTopology::of(members);
    let reclaimable_physical = reclaimable_physical(pool, members);
    let root = pool.is_root();

    let (capacity_usable, capacity_used, physical_total) = if root {
        (
            add(pool.physical_free, pool.reclaimable),
            sub(sub(pool.physical_capacity, pool.physical_free), reclaimable_physical),
            pool.physical_capacity,
        )
    } else {
        (
            Some(INVALID_SENTINEL),
            Some(INVALID_SENTINEL),
            Some(INVALID_SENTINEL),
        )
    };

    let logical_usable = add(pool.logical_free, pool.reclaimable);
    let real = real_capacity(pool);

    let metrics = PoolMetrics {
        pool_id: pool.id.clone(),
        pool_name: pool.name.clone(),
        storage_classes: binding.storage_class_label(&pool.name),
        internal: topology.internal,
        root,
        health: pool_health(&pool.status),
        warning_threshold: warning_threshold(pool.warning_threshold),
        reclaimable_physical,
        capacity_usable,
        capacity_used,
        physical_total,
        logical_usable,
        logical_used: sub(pool.logical_capacity, logical_usable),
        logical_total: pool.logical_capacity,
        efficiency_savings: sub(pool.virtual_capacity, real).map(|v| v.max(0.0)),
        savings: savings_breakdown(pool, real),
    };

    debug!(
        pool = %metrics.pool_name,
        status = %pool.status,
        usable = ?metrics.capacity_usable,
        used = ?metrics.capacity_used,
        savings = ?metrics.efficiency_savings,
        "Derived pool metrics"
    );
    metrics
}

/// Derive every bound pool present on the array, in array order
///
/// Bound pools missing from the array are logged; unbound pools are skipped.
pub fn derive_pools(
    array: &str,
    pools: &[PoolRecord],
    disks: &[DiskRecord],
    binding: &PoolBinding,
) -> Vec<PoolMetrics> {
    for name in binding.pool_names() {
        if !pools.iter().any(|p| p.name == name) {
            warn!(array, pool = name, storageclass = %binding.storage_class_label(name), "Bound pool not found on array");
        }
    }

    pools
        .iter()
        .filter(|pool| {
            let bound = binding.contains_pool(&pool.name);
            if !bound {
                debug!(array, pool = %pool.name, "Pool not bound to a storage class, skipping");
            }
            bound
        })
        .map(|pool| {
            let members = member_disks(disk_owner(pool, pools), disks);
            derive_pool(pool, &members, binding)
        })
        .collect()
}
