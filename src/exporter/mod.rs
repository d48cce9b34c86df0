//! Metrics Exporter Module
//!
//! Prometheus exposition of the derived snapshots plus the health endpoints.

pub mod families;
pub mod server;

pub use families::{render, MetricFamilies};
pub use server::{run_health_server, run_metrics_server, HealthState};
