//! Kubernetes Status Sink
//!
//! Writes exporter conditions to the FlashSystemCluster resource named after
//! each array and publishes authentication alerts as Kubernetes events.

use super::ConditionCache;
use crate::crd::{ClusterCondition, FlashSystemCluster, FlashSystemClusterStatus};
use crate::domain::ports::{ArrayId, AuthAlert, ConditionType, Readiness, StatusSink};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::{Patch, PatchParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client};
use serde_json::json;
use tracing::{debug, info};

pub const AUTH_FAILING_REASON: &str = "AuthenticationFailing";
pub const AUTH_RECOVERED_REASON: &str = "AuthenticationRecovered";

/// Status after applying one condition to the current resource status
pub fn apply_condition(
    current: Option<FlashSystemClusterStatus>,
    condition: ConditionType,
    readiness: Readiness,
    now: DateTime<Utc>,
) -> FlashSystemClusterStatus {
    let mut status = current.unwrap_or_default();
    status.set_condition(ClusterCondition::from_readiness(condition, readiness, now));
    status
}

/// Event describing an authentication alert
pub fn alert_event(alert: AuthAlert) -> Event {
    match alert {
        AuthAlert::Failing { since } => Event {
            type_: EventType::Warning,
            reason: AUTH_FAILING_REASON.into(),
            note: Some(format!(
                "Authentication to the flash system has been failing since {}",
                since.to_rfc3339()
            )),
            action: "Authenticate".into(),
            secondary: None,
        },
        AuthAlert::Recovered => Event {
            type_: EventType::Normal,
            reason: AUTH_RECOVERED_REASON.into(),
            note: Some("Authentication to the flash system recovered".into()),
            action: "Authenticate".into(),
            secondary: None,
        },
    }
}

/// Condition and event writer backed by the Kubernetes API
pub struct KubeStatusSink {
    client: Client,
    namespace: String,
    reporter: Reporter,
    cache: ConditionCache,
}

impl KubeStatusSink {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            reporter: Reporter {
                controller: crate::NAME.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
            cache: ConditionCache::default(),
        }
    }

    fn api(&self) -> Api<FlashSystemCluster> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn reference(&self, array: &ArrayId) -> ObjectReference {
        ObjectReference {
            api_version: Some("odf.ibm.com/v1alpha1".into()),
            kind: Some("FlashSystemCluster".into()),
            name: Some(array.to_string()),
            namespace: Some(self.namespace.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl StatusSink for KubeStatusSink {
    async fn update_condition(
        &self,
        array: &ArrayId,
        condition: ConditionType,
        readiness: Readiness,
    ) -> Result<()> {
        if !self.cache.changed(array, condition, readiness) {
            return Ok(());
        }

        let api = self.api();
        let cluster = api
            .get_opt(array.as_str())
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "FlashSystemCluster".into(),
                name: array.to_string(),
            })?;

        let status = apply_condition(cluster.status, condition, readiness, Utc::now());
        api.patch_status(
            array.as_str(),
            &PatchParams::default(),
            &Patch::Merge(json!({ "status": status })),
        )
        .await?;

        debug!(array = %array, condition = %condition, "Updated FlashSystemCluster condition");
        self.cache.record(array, condition, readiness);
        Ok(())
    }

    async fn notify(&self, array: &ArrayId, alert: AuthAlert) -> Result<()> {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), self.reference(array));
        let event = alert_event(alert);
        info!(array = %array, reason = %event.reason, "Publishing alert event");
        recorder.publish(event).await?;
        Ok(())
    }
}
