//! Capacity & Efficiency Derivation Engine
//!
//! Pure computation over one poll's typed records. Nothing here performs I/O.

pub mod pool;
pub mod system;
pub mod volume;

pub use pool::{
    derive_pool, derive_pools, disk_owner, disk_pools, reclaimable_physical, PoolMetrics,
    PoolTopology, SavingsBreakdown, INVALID_SENTINEL,
};
pub use system::{derive_system, performance_counters, PerfCounter, SystemMetrics};
pub use volume::{derive_volume, VolumeMetrics};
