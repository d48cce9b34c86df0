//! Array Registry
//!
//! Keeps the working set of monitored arrays in line with the desired
//! configuration. Each array keeps one session for as long as it stays
//! configured; readiness is evaluated when it joins and re-evaluated on later
//! reconciles until it passes.

use super::events::RegistryEvent;
use crate::array::ArraySession;
use crate::domain::ports::{
    ArrayId, ConditionType, DesiredArray, DesiredConfig, PoolBinding, Readiness, ReadinessReason,
    SecretResolver, StatusSink, TransportFactory,
};
use crate::error::{Error, Result};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

// =============================================================================
// Entries
// =============================================================================

/// One monitored array as of the last reconcile
#[derive(Debug)]
pub struct ArrayEntry {
    pub id: ArrayId,
    pub binding: PoolBinding,
    pub readiness: Readiness,
    session: Arc<Mutex<ArraySession>>,
}

impl ArrayEntry {
    pub fn new(id: ArrayId, binding: PoolBinding, readiness: Readiness, session: ArraySession) -> Self {
        Self {
            id,
            binding,
            readiness,
            session: Arc::new(Mutex::new(session)),
        }
    }

    /// Same session, new binding and readiness
    fn carry_over(&self, binding: PoolBinding, readiness: Readiness) -> Self {
        Self {
            id: self.id.clone(),
            binding,
            readiness,
            session: self.session.clone(),
        }
    }

    pub fn session(&self) -> &Arc<Mutex<ArraySession>> {
        &self.session
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }
}

/// Membership outcome of one reconcile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<ArrayId>,
    pub retained: Vec<ArrayId>,
    pub dropped: Vec<ArrayId>,
    pub excluded: Vec<ArrayId>,
    pub not_ready: Vec<ArrayId>,
}

enum Outcome {
    Added(ArrayEntry),
    Retained(ArrayEntry),
    Excluded(ArrayId, Error),
}

// =============================================================================
// Array Registry
// =============================================================================

/// Identity to session map, replaced wholesale on each reconcile
pub struct ArrayRegistry {
    entries: RwLock<BTreeMap<ArrayId, Arc<ArrayEntry>>>,
    secrets: Arc<dyn SecretResolver>,
    transports: Arc<dyn TransportFactory>,
    sink: Arc<dyn StatusSink>,
    alert_threshold: chrono::Duration,
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl ArrayRegistry {
    pub fn new(
        secrets: Arc<dyn SecretResolver>,
        transports: Arc<dyn TransportFactory>,
        sink: Arc<dyn StatusSink>,
        alert_threshold: chrono::Duration,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(256);
        Self {
            entries: RwLock::new(BTreeMap::new()),
            secrets,
            transports,
            sink,
            alert_threshold,
            event_sender,
        }
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    pub fn get(&self, id: &ArrayId) -> Option<Arc<ArrayEntry>> {
        self.entries.read().get(id).cloned()
    }

    pub fn contains(&self, id: &ArrayId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// All entries in identity order
    pub fn entries(&self) -> Vec<Arc<ArrayEntry>> {
        self.entries.read().values().cloned().collect()
    }

    /// Entries whose readiness sequence passed
    pub fn ready_entries(&self) -> Vec<Arc<ArrayEntry>> {
        self.entries
            .read()
            .values()
            .filter(|e| e.is_ready())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Bring membership in line with `desired`
    ///
    /// Must not run concurrently with itself; the poll cycle serializes calls.
    pub async fn reconcile(&self, desired: &DesiredConfig) -> ReconcileReport {
        let previous = self.entries.read().clone();

        let outcomes = join_all(
            desired
                .values()
                .map(|array| self.reconcile_one(array, previous.get(&array.id).cloned())),
        )
        .await;

        let mut report = ReconcileReport::default();
        let mut next = BTreeMap::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Added(entry) => {
                    self.emit(RegistryEvent::ArrayAdded {
                        array: entry.id.to_string(),
                        ready: entry.is_ready(),
                    });
                    report.added.push(entry.id.clone());
                    self.track_readiness(&entry, &mut report);
                    next.insert(entry.id.clone(), Arc::new(entry));
                }
                Outcome::Retained(entry) => {
                    self.emit(RegistryEvent::ArrayRetained {
                        array: entry.id.to_string(),
                    });
                    report.retained.push(entry.id.clone());
                    self.track_readiness(&entry, &mut report);
                    next.insert(entry.id.clone(), Arc::new(entry));
                }
                Outcome::Excluded(id, error) => {
                    self.emit(RegistryEvent::ArrayExcluded {
                        array: id.to_string(),
                        reason: error.to_string(),
                    });
                    report.excluded.push(id);
                }
            }
        }

        for id in previous.keys().filter(|id| !desired.contains_key(*id)) {
            info!(array = %id, "Array removed from configuration, releasing session");
            self.emit(RegistryEvent::ArrayDropped {
                array: id.to_string(),
            });
            report.dropped.push(id.clone());
        }

        *self.entries.write() = next;

        debug!(
            added = report.added.len(),
            retained = report.retained.len(),
            dropped = report.dropped.len(),
            excluded = report.excluded.len(),
            "Registry reconciled"
        );
        report
    }

    async fn reconcile_one(&self, desired: &DesiredArray, existing: Option<Arc<ArrayEntry>>) -> Outcome {
        match existing {
            Some(entry) if entry.is_ready() => {
                Outcome::Retained(entry.carry_over(desired.binding.clone(), Readiness::Ready))
            }
            Some(entry) => {
                debug!(array = %desired.id, "Re-checking readiness");
                let readiness = entry.session.lock().await.check_readiness().await;
                self.report(&desired.id, readiness).await;
                Outcome::Retained(entry.carry_over(desired.binding.clone(), readiness))
            }
            None => match self.open_session(desired) {
                Ok(mut session) => {
                    info!(array = %desired.id, "New array, running readiness checks");
                    let readiness = session.check_readiness().await;
                    self.report(&desired.id, readiness).await;
                    Outcome::Added(ArrayEntry::new(
                        desired.id.clone(),
                        desired.binding.clone(),
                        readiness,
                        session,
                    ))
                }
                Err(e) => {
                    warn!(array = %desired.id, secret = %desired.secret, "Excluding array: {}", e);
                    self.report(
                        &desired.id,
                        Readiness::NotReady(ReadinessReason::ConfigurationInvalid),
                    )
                    .await;
                    Outcome::Excluded(desired.id.clone(), e)
                }
            },
        }
    }

    fn open_session(&self, desired: &DesiredArray) -> Result<ArraySession> {
        let credentials = self.secrets.resolve(&desired.secret)?;
        if credentials.host.trim().is_empty() {
            return Err(Error::SecretInvalid {
                secret: desired.secret.clone(),
                reason: "empty management address".into(),
            });
        }
        let transport = self.transports.create(&desired.id, &credentials)?;
        Ok(ArraySession::new(
            desired.id.clone(),
            transport,
            credentials,
            self.sink.clone(),
            self.alert_threshold,
        ))
    }

    async fn report(&self, id: &ArrayId, readiness: Readiness) {
        if let Err(e) = self
            .sink
            .update_condition(id, ConditionType::ExporterReady, readiness)
            .await
        {
            warn!(array = %id, "Failed to report readiness: {}", e);
        }
    }

    fn track_readiness(&self, entry: &ArrayEntry, report: &mut ReconcileReport) {
        if let Readiness::NotReady(reason) = entry.readiness {
            self.emit(RegistryEvent::ArrayNotReady {
                array: entry.id.to_string(),
                reason,
            });
            report.not_ready.push(entry.id.clone());
        }
    }

    fn emit(&self, event: RegistryEvent) {
        // No receivers is fine
        let _ = self.event_sender.send(event);
    }
}
