//! Test doubles shared by the unit tests
//!
//! A scripted array transport, recording status sink, static config and
//! secret sources, a controllable clock and the golden array fixture.

use crate::array::session::Clock;
use crate::domain::ports::{
    ArrayCredentials, ArrayId, ArrayTransport, AuthAlert, ConditionType, DesiredArray,
    DesiredConfig, DesiredConfigSource, PoolBinding, Readiness, SecretResolver, StatusSink,
    TransportFactory, TransportResponse,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub fn credentials(host: &str) -> ArrayCredentials {
    ArrayCredentials {
        host: host.to_string(),
        username: "monitor".into(),
        password: "secret".into(),
    }
}

// =============================================================================
// Mock Transport
// =============================================================================

/// One scripted transport outcome
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(u16, String),
    Fail(String),
}

impl MockReply {
    pub fn status(status: u16, body: &str) -> Self {
        MockReply::Respond(status, body.to_string())
    }

    pub fn token(token: &str) -> Self {
        MockReply::Respond(200, format!(r#"{{"token": "{}"}}"#, token))
    }

    pub fn fail(reason: &str) -> Self {
        MockReply::Fail(reason.to_string())
    }

    fn into_result(self) -> Result<TransportResponse> {
        match self {
            MockReply::Respond(status, body) => Ok(TransportResponse::new(status, body)),
            MockReply::Fail(reason) => Err(Error::Internal(reason)),
        }
    }
}

/// Transport answering from per-command scripts
///
/// Queued replies are consumed first, then the command's standing reply.
/// Unknown commands answer 404.
pub struct MockTransport {
    auth_default: Mutex<MockReply>,
    defaults: Mutex<HashMap<String, MockReply>>,
    queues: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<String>>,
    auth_calls: Mutex<usize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            auth_default: Mutex::new(MockReply::token("token-1")),
            defaults: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            auth_calls: Mutex::new(0),
        }
    }

    pub fn with_auth(self, reply: MockReply) -> Self {
        self.set_auth(reply);
        self
    }

    pub fn on(self, command: &str, status: u16, body: &str) -> Self {
        self.set(command, MockReply::status(status, body));
        self
    }

    pub fn push(self, command: &str, reply: MockReply) -> Self {
        self.queues
            .lock()
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn set_auth(&self, reply: MockReply) {
        *self.auth_default.lock() = reply;
    }

    pub fn set(&self, command: &str, reply: MockReply) {
        self.defaults.lock().insert(command.to_string(), reply);
    }

    pub fn auth_calls(&self) -> usize {
        *self.auth_calls.lock()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == command).count()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArrayTransport for MockTransport {
    async fn authenticate(&self, _credentials: &ArrayCredentials) -> Result<TransportResponse> {
        *self.auth_calls.lock() += 1;
        self.auth_default.lock().clone().into_result()
    }

    async fn post(&self, command: &str, _token: &str) -> Result<TransportResponse> {
        self.calls.lock().push(command.to_string());
        let queued = self
            .queues
            .lock()
            .get_mut(command)
            .and_then(VecDeque::pop_front);
        let reply = queued
            .or_else(|| self.defaults.lock().get(command).cloned())
            .unwrap_or_else(|| MockReply::status(404, ""));
        reply.into_result()
    }

    fn endpoint(&self) -> &str {
        "mock://array"
    }
}

/// Hands out pre-registered transports keyed by host
#[derive(Default)]
pub struct MockTransportFactory {
    transports: Mutex<HashMap<String, Arc<MockTransport>>>,
    created: Mutex<Vec<ArrayId>>,
}

impl MockTransportFactory {
    pub fn with(self, host: &str, transport: Arc<MockTransport>) -> Self {
        self.transports.lock().insert(host.to_string(), transport);
        self
    }

    pub fn created(&self) -> Vec<ArrayId> {
        self.created.lock().clone()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(
        &self,
        array: &ArrayId,
        credentials: &ArrayCredentials,
    ) -> Result<Arc<dyn ArrayTransport>> {
        let transport = self
            .transports
            .lock()
            .get(&credentials.host)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("no transport for {}", credentials.host)))?;
        self.created.lock().push(array.clone());
        Ok(transport)
    }
}

// =============================================================================
// Status Sink
// =============================================================================

/// Records every condition update and alert
#[derive(Default)]
pub struct MockStatusSink {
    conditions: Mutex<Vec<(ArrayId, ConditionType, Readiness)>>,
    alerts: Mutex<Vec<(ArrayId, AuthAlert)>>,
}

impl MockStatusSink {
    pub fn conditions(&self) -> Vec<(ArrayId, ConditionType, Readiness)> {
        self.conditions.lock().clone()
    }

    pub fn alerts(&self) -> Vec<(ArrayId, AuthAlert)> {
        self.alerts.lock().clone()
    }

    /// Most recent state of one condition
    pub fn last(&self, array: &str, condition: ConditionType) -> Option<Readiness> {
        self.conditions
            .lock()
            .iter()
            .rev()
            .find(|(id, c, _)| id.as_str() == array && *c == condition)
            .map(|(_, _, readiness)| *readiness)
    }
}

#[async_trait]
impl StatusSink for MockStatusSink {
    async fn update_condition(
        &self,
        array: &ArrayId,
        condition: ConditionType,
        readiness: Readiness,
    ) -> Result<()> {
        self.conditions.lock().push((array.clone(), condition, readiness));
        Ok(())
    }

    async fn notify(&self, array: &ArrayId, alert: AuthAlert) -> Result<()> {
        self.alerts.lock().push((array.clone(), alert));
        Ok(())
    }
}

// =============================================================================
// Configuration Doubles
// =============================================================================

/// Secret name to credentials
#[derive(Default)]
pub struct StaticSecretResolver {
    secrets: HashMap<String, ArrayCredentials>,
}

impl StaticSecretResolver {
    /// Register a secret resolving to `host`
    pub fn with(mut self, secret: &str, host: &str) -> Self {
        self.secrets.insert(secret.to_string(), credentials(host));
        self
    }
}

impl SecretResolver for StaticSecretResolver {
    fn resolve(&self, secret: &str) -> Result<ArrayCredentials> {
        self.secrets.get(secret).cloned().ok_or_else(|| Error::SecretInvalid {
            secret: secret.to_string(),
            reason: "not found".into(),
        })
    }
}

/// Desired configuration that tests can swap between polls
#[derive(Default)]
pub struct StaticConfigSource {
    config: Mutex<DesiredConfig>,
}

impl StaticConfigSource {
    pub fn new(config: DesiredConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    pub fn set(&self, config: DesiredConfig) {
        *self.config.lock() = config;
    }
}

#[async_trait]
impl DesiredConfigSource for StaticConfigSource {
    async fn load(&self) -> Result<DesiredConfig> {
        Ok(self.config.lock().clone())
    }
}

/// Desired entry for `array` using secret `<array>-secret`
pub fn desired(array: &str, binding: &[(&str, &str)]) -> (ArrayId, DesiredArray) {
    let id = ArrayId::from(array);
    let entry = DesiredArray {
        id: id.clone(),
        secret: format!("{}-secret", array),
        binding: binding.iter().copied().collect::<PoolBinding>(),
    };
    (id, entry)
}

// =============================================================================
// Clock
// =============================================================================

/// Manually advanced clock
#[derive(Clone)]
pub struct TestClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Utc::now())),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }

    pub fn clock(&self) -> Clock {
        let now = self.now.clone();
        Arc::new(move || *now.lock())
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Golden Fixture
// =============================================================================

pub const GOLDEN_SYSTEM: &str =
    r#"{"code_level": "8.4.0.2 (build 152.23.2102111856000)", "product_name": "IBM SAN Volume Controller"}"#;

pub const GOLDEN_STATS: &str = r#"[
    {"stat_name": "vdisk_r_mb", "stat_current": "0", "stat_peak": "0"},
    {"stat_name": "vdisk_w_mb", "stat_current": "0", "stat_peak": "16"},
    {"stat_name": "vdisk_r_io", "stat_current": "0", "stat_peak": "1"},
    {"stat_name": "vdisk_w_io", "stat_current": "11", "stat_peak": "176"},
    {"stat_name": "vdisk_ms", "stat_current": "10", "stat_peak": "20"},
    {"stat_name": "vdisk_r_ms", "stat_current": "0", "stat_peak": "0"},
    {"stat_name": "vdisk_w_ms", "stat_current": "1", "stat_peak": "690"},
    {"stat_name": "cpu_pc", "stat_current": "3", "stat_peak": "9"}
]"#;

pub const GOLDEN_NODES: &str = r#"[
    {"name": "node1", "id": "1", "status": "online", "IO_group_name": "io_grp0"},
    {"name": "node2", "id": "2", "status": "online", "IO_group_name": "io_grp0"}
]"#;

pub const GOLDEN_POOLS: &str = r#"[
    {
        "id": "0", "name": "Pool0", "status": "online", "parent_mdisk_grp_id": "0",
        "capacity": "7882338729984", "free_capacity": "6386616369152",
        "virtual_capacity": "3554085437440", "real_capacity": "1489086635008",
        "warning": "80", "compression_active": "no", "data_reduction": "no",
        "compression_compressed_capacity": "0", "compression_uncompressed_capacity": "0",
        "used_capacity_before_reduction": "0", "used_capacity_after_reduction": "0",
        "deduplication_capacity_saving": "0", "reclaimable_capacity": "0",
        "physical_capacity": "10799695265792", "physical_free_capacity": "10798621523968"
    },
    {
        "id": "1", "name": "Pool1", "status": "offline", "parent_mdisk_grp_id": "1",
        "capacity": "644245094400", "free_capacity": "41875931136",
        "virtual_capacity": "612032839680", "real_capacity": "601526946816",
        "warning": "80", "compression_active": "no", "data_reduction": "no",
        "compression_compressed_capacity": "0", "compression_uncompressed_capacity": "0",
        "used_capacity_before_reduction": "0", "used_capacity_after_reduction": "0",
        "deduplication_capacity_saving": "0", "reclaimable_capacity": "0",
        "physical_capacity": "10799695265792", "physical_free_capacity": "10798621523968"
    },
    {
        "id": "2", "name": "Pool2", "status": "online", "parent_mdisk_grp_id": "2",
        "capacity": "644245094400", "free_capacity": "644245094400",
        "virtual_capacity": "0", "real_capacity": "0",
        "warning": "60", "compression_active": "no", "data_reduction": "no",
        "compression_compressed_capacity": "0", "compression_uncompressed_capacity": "0",
        "used_capacity_before_reduction": "0", "used_capacity_after_reduction": "0",
        "deduplication_capacity_saving": "0", "reclaimable_capacity": "0",
        "physical_capacity": "10799695265792", "physical_free_capacity": "10798621523968"
    }
]"#;

pub const GOLDEN_USER: &str = r#"[{"name": "monitor", "role": "Administrator"}]"#;

/// Storage-class binding used with the golden array
pub fn golden_binding() -> PoolBinding {
    [
        ("fs-sc-default", "Pool0"),
        ("fs-sc-1", "Pool0"),
        ("fs-sc-2", "Pool1"),
        ("fs-sc-3", "Pool1"),
        ("fs-sc-4", "Pool2"),
    ]
    .into_iter()
    .collect()
}

/// Transport scripted with the golden array listing
pub fn golden_transport() -> MockTransport {
    MockTransport::new()
        .on("lssystem", 200, GOLDEN_SYSTEM)
        .on("lssystemstats", 200, GOLDEN_STATS)
        .on("lsnode", 200, GOLDEN_NODES)
        .on("lsmdiskgrp", 200, GOLDEN_POOLS)
        .on("lsmdisk", 200, "[]")
        .on("lscurrentuser", 200, GOLDEN_USER)
        .on("lsvdisk", 200, "[]")
}

/// `lssystem` reporting physical capacity, for the data reduction array
pub const DRP_SYSTEM: &str = r#"{"name": "fs-drp", "code_level": "8.5.0.0 (build 157.11)",
    "product_name": "IBM FlashSystem 9200",
    "physical_capacity": "10000", "physical_free_capacity": "4000"}"#;

/// Data reduction root pool `Pool0` with child pool `Pool3`
pub const DRP_POOLS: &str = r#"[
    {
        "id": "0", "name": "Pool0", "status": "online", "parent_mdisk_grp_id": "0",
        "capacity": "20000", "free_capacity": "9000",
        "virtual_capacity": "12000", "real_capacity": "5000",
        "warning": "80", "compression_active": "yes", "data_reduction": "yes",
        "compression_compressed_capacity": "0", "compression_uncompressed_capacity": "0",
        "used_capacity_before_reduction": "0", "used_capacity_after_reduction": "0",
        "deduplication_capacity_saving": "0", "reclaimable_capacity": "300",
        "physical_capacity": "10000", "physical_free_capacity": "4000"
    },
    {
        "id": "3", "name": "Pool3", "status": "online", "parent_mdisk_grp_id": "0",
        "capacity": "2000", "free_capacity": "1500",
        "virtual_capacity": "500", "real_capacity": "500",
        "warning": "80", "compression_active": "no", "data_reduction": "no",
        "compression_compressed_capacity": "0", "compression_uncompressed_capacity": "0",
        "used_capacity_before_reduction": "0", "used_capacity_after_reduction": "0",
        "deduplication_capacity_saving": "0", "reclaimable_capacity": "50",
        "physical_capacity": "10000", "physical_free_capacity": "4000"
    }
]"#;

/// Two internal compressing array disks backing `Pool0`
pub const DRP_DISKS: &str = r#"[
    {"id": "0", "mdisk_grp_name": "Pool0", "controller_name": "", "mode": "array"},
    {"id": "1", "mdisk_grp_name": "Pool0", "controller_name": "", "mode": "array"}
]"#;

/// Transport scripted with the data reduction array
///
/// Pool0 reclaimable estimate is 600 (both disks use twice their effective
/// capacity), Pool3 keeps its reported 50.
pub fn drp_transport() -> MockTransport {
    MockTransport::new()
        .on("lssystem", 200, DRP_SYSTEM)
        .on("lssystemstats", 200, GOLDEN_STATS)
        .on("lsnode", 200, GOLDEN_NODES)
        .on("lsmdiskgrp", 200, DRP_POOLS)
        .on("lsmdisk", 200, DRP_DISKS)
        .on(
            "lsmdisk/0",
            200,
            r#"{"id": "0", "physical_capacity": "1000", "physical_free_capacity": "400", "effective_used_capacity": "300"}"#,
        )
        .on(
            "lsmdisk/1",
            200,
            r#"{"id": "1", "physical_capacity": "1000", "physical_free_capacity": "800", "effective_used_capacity": "100"}"#,
        )
        .on("lscurrentuser", 200, GOLDEN_USER)
        .on("lsvdisk", 200, "[]")
}
