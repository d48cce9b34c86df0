//! Domain Ports - Core trait definitions for the exporter
//!
//! These traits define the boundaries between the telemetry core and its
//! external collaborators: the array HTTP API, the desired configuration, the
//! credential store and the status/condition sink.

use crate::error::{Error, ErrorAction, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// =============================================================================
// Array Identity
// =============================================================================

/// Stable name of a monitored array
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArrayId(pub String);

impl ArrayId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArrayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ArrayId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArrayId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Pool Binding
// =============================================================================

/// Storage-class name to pool name mapping for one array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolBinding(BTreeMap<String, String>);

impl PoolBinding {
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    /// Bind a storage class to a pool
    pub fn bind(&mut self, storage_class: impl Into<String>, pool: impl Into<String>) {
        self.0.insert(storage_class.into(), pool.into());
    }

    /// Distinct pool names referenced by any storage class
    pub fn pool_names(&self) -> BTreeSet<&str> {
        self.0.values().map(String::as_str).collect()
    }

    /// Whether any storage class maps to this pool
    pub fn contains_pool(&self, pool: &str) -> bool {
        self.0.values().any(|p| p == pool)
    }

    /// Storage classes bound to a pool, sorted
    pub fn storage_classes(&self, pool: &str) -> Vec<&str> {
        // BTreeMap iteration is key-ordered, so the result is already sorted
        self.0
            .iter()
            .filter(|(_, p)| p.as_str() == pool)
            .map(|(sc, _)| sc.as_str())
            .collect()
    }

    /// Storage classes bound to a pool, sorted and comma-joined
    pub fn storage_class_label(&self, pool: &str) -> String {
        self.storage_classes(pool).join(",")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<S: Into<String>, P: Into<String>> FromIterator<(S, P)> for PoolBinding {
    fn from_iter<I: IntoIterator<Item = (S, P)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(s, p)| (s.into(), p.into())).collect())
    }
}

// =============================================================================
// Desired Configuration
// =============================================================================

/// One array as the operator wants it monitored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredArray {
    pub id: ArrayId,
    /// Name of the secret holding the management address and credentials
    pub secret: String,
    pub binding: PoolBinding,
}

/// Complete desired state, read fresh every poll
pub type DesiredConfig = BTreeMap<ArrayId, DesiredArray>;

/// Connection details for one array
#[derive(Clone, PartialEq, Eq)]
pub struct ArrayCredentials {
    /// Management address (host or host:port without scheme)
    pub host: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for ArrayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayCredentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Readiness & Alerts
// =============================================================================

/// Condition types reported to the status sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConditionType {
    /// The exporter can talk to the array and serve its metrics
    ExporterReady,
    /// Every array node is online and every I/O group is redundant
    StorageClusterReady,
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionType::ExporterReady => write!(f, "ExporterReady"),
            ConditionType::StorageClusterReady => write!(f, "StorageClusterReady"),
        }
    }
}

/// Fixed reason vocabulary for readiness failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadinessReason {
    AuthFailure,
    VersionCheckFailed,
    RoleCheckFailed,
    RestFailure,
    ClusterNotOnline,
    ConfigurationInvalid,
}

impl ReadinessReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessReason::AuthFailure => "AuthFailure",
            ReadinessReason::VersionCheckFailed => "VersionCheckFailed",
            ReadinessReason::RoleCheckFailed => "RoleCheckFailed",
            ReadinessReason::RestFailure => "RestFailure",
            ReadinessReason::ClusterNotOnline => "ClusterNotOnline",
            ReadinessReason::ConfigurationInvalid => "ConfigurationInvalid",
        }
    }

    /// Human readable message attached to the condition
    pub fn message(&self) -> &'static str {
        match self {
            ReadinessReason::AuthFailure => "Authentication to flash system rest server failed",
            ReadinessReason::VersionCheckFailed => "Flash system code level too low, need >= 8.3.1",
            ReadinessReason::RoleCheckFailed => "User role is not allowed to query the flash system",
            ReadinessReason::RestFailure => "Rest server hit unexpected error",
            ReadinessReason::ClusterNotOnline => "Flash system cluster not online",
            ReadinessReason::ConfigurationInvalid => "Flash system connection secret is missing or invalid",
        }
    }

    /// Reason reported for a failed readiness step
    pub fn from_error(error: &Error) -> Self {
        match (error.action(), error) {
            (_, Error::AuthenticationFailed { .. }) => ReadinessReason::AuthFailure,
            (_, Error::UnsupportedVersion { .. }) => ReadinessReason::VersionCheckFailed,
            (ErrorAction::ReportReadiness, _) => ReadinessReason::RoleCheckFailed,
            (ErrorAction::ExcludeArray, _) => ReadinessReason::ConfigurationInvalid,
            (ErrorAction::RetryOnce | ErrorAction::SkipMetric, _) => ReadinessReason::RestFailure,
        }
    }
}

impl std::fmt::Display for ReadinessReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a readiness evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    Ready,
    NotReady(ReadinessReason),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }

    pub fn reason(&self) -> Option<ReadinessReason> {
        match self {
            Readiness::Ready => None,
            Readiness::NotReady(reason) => Some(*reason),
        }
    }
}

/// External notification emitted by a session's debounced alert state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAlert {
    /// Authentication has been failing continuously since `since`
    Failing { since: DateTime<Utc> },
    /// Authentication succeeded again after a `Failing` alert
    Recovered,
}

// =============================================================================
// Transport
// =============================================================================

/// Raw HTTP outcome of one array call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP access to one array's management API
#[async_trait]
pub trait ArrayTransport: Send + Sync {
    /// POST the credentials to the auth endpoint
    async fn authenticate(&self, credentials: &ArrayCredentials) -> Result<TransportResponse>;

    /// POST a command (e.g. `lsmdiskgrp`, `lsmdisk/3`) with the bearer token attached
    async fn post(&self, command: &str, token: &str) -> Result<TransportResponse>;

    /// Base URL, for logging
    fn endpoint(&self) -> &str;
}

/// Builds a transport for a newly seen array
pub trait TransportFactory: Send + Sync {
    fn create(&self, array: &ArrayId, credentials: &ArrayCredentials) -> Result<Arc<dyn ArrayTransport>>;
}

// =============================================================================
// Configuration Collaborators
// =============================================================================

/// Source of the desired array set
#[async_trait]
pub trait DesiredConfigSource: Send + Sync {
    /// Read the full desired configuration; called once per poll
    async fn load(&self) -> Result<DesiredConfig>;
}

/// Resolves a secret reference to connection credentials
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, secret: &str) -> Result<ArrayCredentials>;
}

// =============================================================================
// Status Sink
// =============================================================================

/// Receives readiness transitions and authentication alerts
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Record the current state of one condition for an array
    async fn update_condition(
        &self,
        array: &ArrayId,
        condition: ConditionType,
        readiness: Readiness,
    ) -> Result<()>;

    /// Deliver a debounced authentication alert
    async fn notify(&self, array: &ArrayId, alert: AuthAlert) -> Result<()>;
}
