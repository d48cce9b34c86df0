//! Poll Cycle
//!
//! One cycle reconciles the registry against the freshly loaded configuration,
//! then fetches every ready array concurrently. Calls to a single array run
//! strictly in sequence. Cycles never overlap.

use crate::array::{cluster_ready, ArraySession};
use crate::domain::ports::{
    ArrayId, ConditionType, DesiredConfigSource, PoolBinding, Readiness, ReadinessReason,
    StatusSink,
};
use crate::engine::{derive_pools, derive_system, disk_pools, derive_volume, PoolMetrics, SystemMetrics, VolumeMetrics};
use crate::error::Result;
use crate::model::{PoolRecord, SystemRecord};
use crate::registry::{ArrayEntry, ArrayRegistry, ReconcileReport};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// =============================================================================
// Snapshots
// =============================================================================

/// Everything collected from one array in one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySnapshot {
    pub array: ArrayId,
    /// System info and stats were both fetched
    pub responsive: bool,
    /// `lssystem` as fetched, for metadata labels
    pub system: Option<SystemRecord>,
    /// Absent when any listing needed for derivation failed
    pub metrics: Option<SystemMetrics>,
    pub pools: Vec<PoolMetrics>,
    pub volumes: Vec<VolumeMetrics>,
}

impl ArraySnapshot {
    fn unresponsive(array: ArrayId, system: Option<SystemRecord>) -> Self {
        Self {
            array,
            responsive: false,
            system,
            metrics: None,
            pools: Vec::new(),
            volumes: Vec::new(),
        }
    }

    /// Vendor, model and version labels; empty when `lssystem` failed
    pub fn system_labels(&self) -> (&str, &str, &str) {
        match &self.system {
            Some(s) => (s.vendor.as_str(), s.model.as_str(), s.version.as_str()),
            None => ("", "", ""),
        }
    }

    /// Every derived pool is backed by internal disks
    pub fn all_internal(&self) -> bool {
        self.metrics.as_ref().map(|m| m.all_internal).unwrap_or(false)
    }
}

/// Result of one poll cycle
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub started_at: DateTime<Utc>,
    /// Desired configuration was loaded and reconciled
    pub complete: bool,
    pub report: Option<ReconcileReport>,
    pub snapshots: Vec<ArraySnapshot>,
}

// =============================================================================
// Poller
// =============================================================================

/// Drives scrape-triggered poll cycles
pub struct Poller {
    config: Arc<dyn DesiredConfigSource>,
    registry: Arc<ArrayRegistry>,
    sink: Arc<dyn StatusSink>,
    collect_volumes: bool,
    cycle: Mutex<()>,
}

impl Poller {
    pub fn new(
        config: Arc<dyn DesiredConfigSource>,
        registry: Arc<ArrayRegistry>,
        sink: Arc<dyn StatusSink>,
        collect_volumes: bool,
    ) -> Self {
        Self {
            config,
            registry,
            sink,
            collect_volumes,
            cycle: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<ArrayRegistry> {
        &self.registry
    }

    /// Run one full cycle
    ///
    /// A configuration that cannot be loaded leaves the working set as it was;
    /// the cycle then polls the existing ready arrays and reports incomplete.
    pub async fn poll(&self) -> PollOutcome {
        let _cycle = self.cycle.lock().await;
        let started_at = Utc::now();

        let report = match self.config.load().await {
            Ok(desired) => Some(self.registry.reconcile(&desired).await),
            Err(e) => {
                warn!("Failed to load desired configuration, keeping working set: {}", e);
                None
            }
        };

        let entries = self.registry.ready_entries();
        let snapshots = join_all(entries.iter().map(|entry| self.poll_array(entry))).await;

        info!(
            arrays = snapshots.len(),
            responsive = snapshots.iter().filter(|s| s.responsive).count(),
            elapsed_ms = (Utc::now() - started_at).num_milliseconds(),
            "Poll cycle finished"
        );

        PollOutcome {
            started_at,
            complete: report.is_some(),
            report,
            snapshots,
        }
    }

    async fn poll_array(&self, entry: &ArrayEntry) -> ArraySnapshot {
        let mut session = entry.session().lock().await;
        let array = entry.id.clone();

        let system = session.system().await;
        let stats = session.system_stats().await;
        let (system, stats) = match (system, stats) {
            (Ok(system), Ok(stats)) => (system, stats),
            (system, stats) => {
                if let Err(e) = &system {
                    warn!(array = %array, action = ?e.action(), "Failed to fetch system info: {}", e);
                }
                if let Err(e) = &stats {
                    warn!(array = %array, action = ?e.action(), "Failed to fetch system stats: {}", e);
                }
                return ArraySnapshot::unresponsive(array, system.ok());
            }
        };

        let cluster = self.cluster_state(&mut session).await;

        let mut snapshot = ArraySnapshot {
            array: array.clone(),
            responsive: true,
            system: Some(system),
            metrics: None,
            pools: Vec::new(),
            volumes: Vec::new(),
        };

        let (pools, derived) = match self.derive(&mut session, &entry.binding).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(array = %array, action = ?e.action(), "Skipping array metrics this cycle: {}", e);
                return snapshot;
            }
        };

        if let Some(system) = &snapshot.system {
            snapshot.metrics = Some(derive_system(system, &stats, cluster, &derived));
        }
        snapshot.pools = derived;

        if self.collect_volumes {
            snapshot.volumes = collect_volumes(&mut session, &entry.binding, &pools).await;
        }

        debug!(array = %array, pools = snapshot.pools.len(), volumes = snapshot.volumes.len(), "Array polled");
        snapshot
    }

    /// Node listing, reported as the storage cluster condition
    ///
    /// `None` when the listing could not be fetched.
    async fn cluster_state(&self, session: &mut ArraySession) -> Option<bool> {
        let (ready, readiness) = match session.nodes().await {
            Ok(nodes) => {
                let ready = cluster_ready(&nodes);
                let readiness = if ready {
                    Readiness::Ready
                } else {
                    Readiness::NotReady(ReadinessReason::ClusterNotOnline)
                };
                (Some(ready), readiness)
            }
            Err(e) => {
                warn!(array = %session.array(), "Failed to fetch nodes: {}", e);
                (None, Readiness::NotReady(ReadinessReason::RestFailure))
            }
        };

        if let Err(e) = self
            .sink
            .update_condition(session.array(), ConditionType::StorageClusterReady, readiness)
            .await
        {
            warn!(array = %session.array(), "Failed to report cluster state: {}", e);
        }
        ready
    }

    /// Pool and disk listings, derived against the binding
    async fn derive(
        &self,
        session: &mut ArraySession,
        binding: &PoolBinding,
    ) -> Result<(Vec<PoolRecord>, Vec<PoolMetrics>)> {
        let pools = session.pools().await?;
        let disks = session.disks(&disk_pools(&pools, binding)).await?;
        let derived = derive_pools(session.array().as_str(), &pools, &disks, binding);
        Ok((pools, derived))
    }
}

async fn collect_volumes(
    session: &mut ArraySession,
    binding: &PoolBinding,
    pools: &[PoolRecord],
) -> Vec<VolumeMetrics> {
    let listed = match session.volumes(&binding.pool_names()).await {
        Ok(listed) => listed,
        Err(e) => {
            warn!(array = %session.array(), "Failed to list volumes: {}", e);
            return Vec::new();
        }
    };

    let mut volumes = Vec::with_capacity(listed.len());
    for entry in &listed {
        match session.volume(&entry.id).await {
            Ok(volume) => volumes.push(derive_volume(&volume, pools)),
            Err(e) => warn!(array = %session.array(), volume = %entry.id, action = ?e.action(), "Skipping volume: {}", e),
        }
    }
    volumes
}
