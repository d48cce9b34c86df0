//! FlashSystemCluster CRD
//!
//! One resource per monitored array, named after the array identity. The
//! exporter only writes its status conditions.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::domain::ports::{ConditionType, Readiness};

// =============================================================================
// FlashSystemCluster CRD
// =============================================================================

/// FlashSystemCluster describes an external FlashSystem array and how to reach it.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "odf.ibm.com",
    version = "v1alpha1",
    kind = "FlashSystemCluster",
    plural = "flashsystemclusters",
    shortname = "fsc",
    status = "FlashSystemClusterStatus",
    printcolumn = r#"{"name": "Exporter", "type": "string", "jsonPath": ".status.conditions[?(@.type==\"ExporterReady\")].status"}"#,
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".status.conditions[?(@.type==\"StorageClusterReady\")].status"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct FlashSystemClusterSpec {
    /// Display name of the array
    #[serde(default)]
    pub name: String,

    /// Secret with management address and credentials
    pub secret: SecretRef,

    /// Skip TLS verification of the management API
    #[serde(default = "default_true")]
    pub insecure_skip_verify: bool,
}

/// Reference to a secret
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

// =============================================================================
// Status
// =============================================================================

/// Status written by the exporter
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlashSystemClusterStatus {
    #[serde(default)]
    pub conditions: Vec<ClusterCondition>,
}

/// Condition on a FlashSystemCluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    /// ExporterReady or StorageClusterReady
    pub r#type: String,
    /// True or False
    pub status: String,
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ClusterCondition {
    pub fn from_readiness(condition: ConditionType, readiness: Readiness, now: DateTime<Utc>) -> Self {
        let (status, reason, message) = match readiness {
            Readiness::Ready => ("True", None, None),
            Readiness::NotReady(reason) => (
                "False",
                Some(reason.as_str().to_string()),
                Some(reason.message().to_string()),
            ),
        };
        Self {
            r#type: condition.to_string(),
            status: status.to_string(),
            last_transition_time: Some(now),
            reason,
            message,
        }
    }
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Implementations
// =============================================================================

impl FlashSystemClusterStatus {
    /// Replace the condition of the same type
    ///
    /// The transition time only moves when the status flips.
    pub fn set_condition(&mut self, mut condition: ClusterCondition) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
    }

    pub fn condition(&self, condition: ConditionType) -> Option<&ClusterCondition> {
        let name = condition.to_string();
        self.conditions.iter().find(|c| c.r#type == name)
    }
}
