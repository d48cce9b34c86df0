//! Status Sinks
//!
//! Implementations of [`StatusSink`](crate::domain::ports::StatusSink): one
//! that logs, one that writes FlashSystemCluster conditions and events.

pub mod kube_sink;
pub mod log_sink;

pub use kube_sink::KubeStatusSink;
pub use log_sink::LogStatusSink;

use crate::domain::ports::{ArrayId, ConditionType, Readiness};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Last reported state per array and condition
#[derive(Debug, Default)]
pub struct ConditionCache {
    last: Mutex<HashMap<(ArrayId, ConditionType), Readiness>>,
}

impl ConditionCache {
    /// Whether `readiness` differs from what was last recorded
    pub fn changed(&self, array: &ArrayId, condition: ConditionType, readiness: Readiness) -> bool {
        self.last.lock().get(&(array.clone(), condition)) != Some(&readiness)
    }

    pub fn record(&self, array: &ArrayId, condition: ConditionType, readiness: Readiness) {
        self.last.lock().insert((array.clone(), condition), readiness);
    }
}
