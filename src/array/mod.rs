//! Array Session Layer
//!
//! Token lifecycle, retry and alerting for one array, the typed commands
//! built on top, and the readiness rules.

pub mod checks;
pub mod commands;
pub mod session;
pub mod transport;

pub use checks::{check_user_role, check_version, cluster_ready, version_supported, MIN_CODE_LEVEL};
pub use session::{ArraySession, AuthHealth, Clock};
pub use transport::{HttpTransport, HttpTransportFactory};
