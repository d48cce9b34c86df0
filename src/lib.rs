//! FlashSystem Exporter
//!
//! Polls the management REST API of FlashSystem block-storage arrays and
//! exports capacity, efficiency and health telemetry per array and pool.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                       Scrape (/metrics) ─► Poll Cycle                        │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │ Desired Config  │  │  Array Registry │  │     Derivation Engine       │  │
//! │  │  (file, YAML)   │─►│   (reconcile)   │─►│   (pools, system, vols)     │  │
//! │  └─────────────────┘  └────────┬────────┘  └─────────────┬───────────────┘  │
//! │                                │                         │                   │
//! │                    ┌───────────┴───────────┐  ┌──────────┴──────────────┐   │
//! │                    │  Array Sessions       │  │  Metric Families        │   │
//! │                    │  (token, retry once)  │  │  (Prometheus text)      │   │
//! │                    └───────────┬───────────┘  └─────────────────────────┘   │
//! ├────────────────────────────────┼────────────────────────────────────────────┤
//! │                    ┌───────────┴───────────┐  ┌─────────────────────────┐   │
//! │                    │  FlashSystem REST API │  │  Status Sink            │   │
//! │                    │  (:7443/rest/...)     │  │  (CR conditions/events) │   │
//! │                    └───────────────────────┘  └─────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`array`]: Array sessions, typed commands and readiness checks
//! - [`registry`]: Reconciles desired arrays against live sessions
//! - [`engine`]: Capacity and efficiency derivation
//! - [`collector`]: Scrape-driven poll cycles
//! - [`exporter`]: Prometheus exposition and health endpoints
//! - [`status`]: Condition and alert sinks
//! - [`crd`]: Custom Resource Definitions
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod array;
pub mod collector;
pub mod config;
pub mod crd;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod model;
pub mod registry;
pub mod status;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use array::{ArraySession, HttpTransport, HttpTransportFactory};
pub use collector::{ArraySnapshot, PollOutcome, Poller};
pub use config::{ExporterConfig, FileConfigSource, FileSecretResolver};
pub use crd::{FlashSystemCluster, FlashSystemClusterSpec, FlashSystemClusterStatus};
pub use domain::ports::{
    ArrayCredentials, ArrayId, ArrayTransport, AuthAlert, ConditionType, DesiredArray,
    DesiredConfig, DesiredConfigSource, PoolBinding, Readiness, ReadinessReason, SecretResolver,
    StatusSink, TransportFactory,
};
pub use engine::{PoolMetrics, SystemMetrics, VolumeMetrics};
pub use error::{Error, ErrorAction, Result};
pub use exporter::{run_health_server, run_metrics_server, HealthState};
pub use registry::{ArrayRegistry, RegistryEvent};
pub use status::{KubeStatusSink, LogStatusSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
