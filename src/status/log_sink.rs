//! Logging Status Sink
//!
//! Standalone mode has no resource to write conditions to, so transitions
//! and alerts only go to the log.

use super::ConditionCache;
use crate::domain::ports::{ArrayId, AuthAlert, ConditionType, Readiness, StatusSink};
use crate::error::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

/// Logs condition transitions and authentication alerts
#[derive(Default)]
pub struct LogStatusSink {
    cache: ConditionCache,
}

impl LogStatusSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusSink for LogStatusSink {
    async fn update_condition(
        &self,
        array: &ArrayId,
        condition: ConditionType,
        readiness: Readiness,
    ) -> Result<()> {
        if !self.cache.changed(array, condition, readiness) {
            return Ok(());
        }
        match readiness {
            Readiness::Ready => info!(array = %array, condition = %condition, "Condition is True"),
            Readiness::NotReady(reason) => warn!(
                array = %array,
                condition = %condition,
                reason = %reason,
                "Condition is False: {}",
                reason.message()
            ),
        }
        self.cache.record(array, condition, readiness);
        Ok(())
    }

    async fn notify(&self, array: &ArrayId, alert: AuthAlert) -> Result<()> {
        match alert {
            AuthAlert::Failing { since } => {
                error!(array = %array, since = %since, "Authentication to the array keeps failing")
            }
            AuthAlert::Recovered => info!(array = %array, "Authentication to the array recovered"),
        }
        Ok(())
    }
}
