//! Volume Derivation

use crate::model::{PoolRecord, VolumeRecord};
use tracing::warn;

/// Per-volume capacity and feature flags
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeMetrics {
    pub name: String,
    pub pool_name: String,
    pub thin: bool,
    pub compressed: bool,
    pub deduplicated: bool,
    pub encrypted: bool,
    pub capacity_used: Option<f64>,
}

/// Thick volumes use their full capacity; thin ones in a data reduction pool
/// report pre-reduction usage, other thin ones uncompressed usage.
pub fn derive_volume(volume: &VolumeRecord, pools: &[PoolRecord]) -> VolumeMetrics {
    let capacity_used = if volume.thin {
        match pools.iter().find(|p| p.id == volume.pool_id) {
            Some(pool) if pool.data_reduction => volume.used_before_reduction,
            Some(_) => volume.uncompressed_used,
            None => {
                warn!(volume = %volume.name, pool_id = %volume.pool_id, "Volume pool not listed, skipping capacity");
                None
            }
        }
    } else {
        volume.capacity
    };

    VolumeMetrics {
        name: volume.name.clone(),
        pool_name: volume.pool_name.clone(),
        thin: volume.thin,
        compressed: volume.compressed,
        deduplicated: volume.deduplicated,
        encrypted: volume.encrypted,
        capacity_used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PoolStatus;

    fn volume(thin: bool) -> VolumeRecord {
        VolumeRecord {
            id: "7".into(),
            name: "pvc-7".into(),
            pool_name: "Pool0".into(),
            pool_id: "0".into(),
            thin,
            compressed: false,
            deduplicated: false,
            encrypted: true,
            capacity: Some(1_000.0),
            used_before_reduction: Some(300.0),
            uncompressed_used: Some(200.0),
        }
    }

    fn pool(data_reduction: bool) -> PoolRecord {
        PoolRecord {
            id: "0".into(),
            name: "Pool0".into(),
            parent_id: "0".into(),
            status: PoolStatus::Online,
            physical_capacity: None,
            physical_free: None,
            reclaimable: None,
            virtual_capacity: None,
            real_capacity: None,
            logical_capacity: None,
            logical_free: None,
            data_reduction,
            compression_active: false,
            warning_threshold: None,
            used_before_reduction: None,
            used_after_reduction: None,
            dedup_savings: None,
            compression_uncompressed: None,
            compression_compressed: None,
        }
    }

    #[test]
    fn test_thick_volume_uses_capacity() {
        assert_eq!(derive_volume(&volume(false), &[pool(true)]).capacity_used, Some(1_000.0));
    }

    #[test]
    fn test_thin_volume_capacity_by_pool_type() {
        assert_eq!(derive_volume(&volume(true), &[pool(true)]).capacity_used, Some(300.0));
        assert_eq!(derive_volume(&volume(true), &[pool(false)]).capacity_used, Some(200.0));
        assert_eq!(derive_volume(&volume(true), &[]).capacity_used, None);
    }
}
