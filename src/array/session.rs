//! Array Session
//!
//! Owns one array's bearer token and authentication health. Every request
//! goes through [`ArraySession::execute`], which authenticates lazily and
//! retries exactly once with a fresh token.

use crate::domain::ports::{ArrayCredentials, ArrayId, ArrayTransport, AuthAlert, StatusSink};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts per request, including the first
const MAX_ATTEMPTS: u32 = 2;

/// Time source, injectable for tests
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// =============================================================================
// Authentication Health
// =============================================================================

/// Debounced authentication alert state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthHealth {
    Ok,
    /// Failing since the given instant, no alert sent yet
    Failing { since: DateTime<Utc> },
    /// Failing and the alert has been delivered
    FailingNotified { since: DateTime<Utc> },
}

impl AuthHealth {
    /// Called before each authentication attempt; yields the alert to send, once
    pub fn before_attempt(
        &mut self,
        now: DateTime<Utc>,
        threshold: chrono::Duration,
    ) -> Option<AuthAlert> {
        match *self {
            AuthHealth::Failing { since } if now - since > threshold => {
                *self = AuthHealth::FailingNotified { since };
                Some(AuthAlert::Failing { since })
            }
            _ => None,
        }
    }

    /// Start the failure clock unless it is already running
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        if let AuthHealth::Ok = self {
            *self = AuthHealth::Failing { since: now };
        }
    }

    /// Reset to `Ok`; yields a recovery alert only if a failure alert went out
    pub fn record_success(&mut self) -> Option<AuthAlert> {
        let was_notified = matches!(self, AuthHealth::FailingNotified { .. });
        *self = AuthHealth::Ok;
        was_notified.then_some(AuthAlert::Recovered)
    }

    pub fn failing_since(&self) -> Option<DateTime<Utc>> {
        match self {
            AuthHealth::Ok => None,
            AuthHealth::Failing { since } | AuthHealth::FailingNotified { since } => Some(*since),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Authenticated channel to one array
pub struct ArraySession {
    array: ArrayId,
    transport: Arc<dyn ArrayTransport>,
    credentials: ArrayCredentials,
    token: Option<String>,
    health: AuthHealth,
    alert_threshold: chrono::Duration,
    sink: Arc<dyn StatusSink>,
    clock: Clock,
}

impl ArraySession {
    pub fn new(
        array: ArrayId,
        transport: Arc<dyn ArrayTransport>,
        credentials: ArrayCredentials,
        sink: Arc<dyn StatusSink>,
        alert_threshold: chrono::Duration,
    ) -> Self {
        Self {
            array,
            transport,
            credentials,
            token: None,
            health: AuthHealth::Ok,
            alert_threshold,
            sink,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn array(&self) -> &ArrayId {
        &self.array
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn health(&self) -> AuthHealth {
        self.health
    }

    /// Obtain a fresh token, driving the alert state either way
    pub async fn authenticate(&mut self) -> Result<()> {
        let now = (self.clock)();
        if let Some(alert) = self.health.before_attempt(now, self.alert_threshold) {
            warn!(array = %self.array, "Authentication failing for more than {}s", self.alert_threshold.num_seconds());
            self.notify(alert).await;
        }

        self.token = None;
        match self.request_token().await {
            Ok(token) => {
                debug!(array = %self.array, "Authenticated");
                self.token = Some(token);
                if let Some(alert) = self.health.record_success() {
                    info!(array = %self.array, "Authentication recovered");
                    self.notify(alert).await;
                }
                Ok(())
            }
            Err(e) => {
                self.health.record_failure((self.clock)());
                warn!(array = %self.array, "Authentication failed: {}", e);
                Err(e)
            }
        }
    }

    async fn request_token(&self) -> Result<String> {
        let failed = |reason: String| Error::AuthenticationFailed {
            array: self.array.to_string(),
            reason,
        };

        let response = self
            .transport
            .authenticate(&self.credentials)
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.is_success() {
            return Err(failed(format!("HTTP {}", response.status)));
        }

        let body: serde_json::Value =
            serde_json::from_slice(&response.body).map_err(|e| failed(format!("malformed body: {}", e)))?;

        match body.get("token") {
            Some(serde_json::Value::String(token)) => Ok(token.clone()),
            Some(_) => Err(failed("token is not a string".into())),
            None => Err(failed("token missing from response".into())),
        }
    }

    /// Run one command and decode its JSON body
    ///
    /// Any failure clears the token and the command is retried once after
    /// re-authenticating. The returned error carries the last HTTP status seen.
    pub async fn execute<T: DeserializeOwned>(&mut self, command: &str) -> Result<T> {
        let mut last_error: Option<Error> = None;
        let mut last_status: Option<u16> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                debug!(array = %self.array, command, "Retrying with a fresh token");
            }

            if self.token.is_none() {
                if let Err(e) = self.authenticate().await {
                    last_status = None;
                    last_error = Some(e);
                    continue;
                }
            }
            let token = match &self.token {
                Some(token) => token.clone(),
                None => continue,
            };

            match self.attempt::<T>(command, &token).await {
                Ok(value) => return Ok(value),
                Err((status, e)) => {
                    debug!(array = %self.array, command, attempt, "Request failed: {}", e);
                    self.token = None;
                    last_status = status;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e @ Error::AuthenticationFailed { .. }) => Err(e),
            other => Err(Error::RequestFailed {
                array: self.array.to_string(),
                command: command.to_string(),
                status: last_status,
                reason: other.map(|e| e.to_string()).unwrap_or_else(|| "no attempt made".into()),
            }),
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        command: &str,
        token: &str,
    ) -> std::result::Result<T, (Option<u16>, Error)> {
        let response = self
            .transport
            .post(command, token)
            .await
            .map_err(|e| (e.http_status(), e))?;
        let status = Some(response.status);

        if !response.is_success() {
            return Err((
                status,
                Error::MalformedResponse {
                    command: command.to_string(),
                    reason: format!("HTTP {}", response.status),
                },
            ));
        }
        if response.body.is_empty() {
            return Err((
                status,
                Error::MalformedResponse {
                    command: command.to_string(),
                    reason: "empty body".into(),
                },
            ));
        }

        serde_json::from_slice(&response.body).map_err(|e| (status, Error::from(e)))
    }

    async fn notify(&self, alert: AuthAlert) {
        if let Err(e) = self.sink.notify(&self.array, alert).await {
            warn!(array = %self.array, "Failed to deliver auth alert: {}", e);
        }
    }
}

impl std::fmt::Debug for ArraySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArraySession")
            .field("array", &self.array)
            .field("endpoint", &self.transport.endpoint())
            .field("has_token", &self.token.is_some())
            .field("health", &self.health)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{credentials, MockReply, MockStatusSink, MockTransport, TestClock};
    use assert_matches::assert_matches;
    use serde_json::Value;

    fn session(transport: Arc<MockTransport>, sink: Arc<MockStatusSink>, clock: &TestClock) -> ArraySession {
        ArraySession::new(
            ArrayId::from("fs-a"),
            transport,
            credentials("10.0.0.5"),
            sink,
            chrono::Duration::minutes(2),
        )
        .with_clock(clock.clock())
    }

    #[test]
    fn test_auth_health_transitions() {
        let t0 = Utc::now();
        let threshold = chrono::Duration::minutes(2);
        let mut health = AuthHealth::Ok;

        health.record_failure(t0);
        health.record_failure(t0 + chrono::Duration::seconds(30));
        assert_eq!(health, AuthHealth::Failing { since: t0 });

        assert_eq!(health.before_attempt(t0 + chrono::Duration::seconds(60), threshold), None);
        assert_eq!(
            health.before_attempt(t0 + chrono::Duration::seconds(121), threshold),
            Some(AuthAlert::Failing { since: t0 })
        );
        assert_eq!(health.before_attempt(t0 + chrono::Duration::minutes(10), threshold), None);

        assert_eq!(health.record_success(), Some(AuthAlert::Recovered));
        assert_eq!(health.record_success(), None);
        assert_eq!(health.failing_since(), None);
    }

    #[test]
    fn test_success_before_alert_is_silent() {
        let mut health = AuthHealth::Failing { since: Utc::now() };
        assert_eq!(health.record_success(), None);
        assert_eq!(health, AuthHealth::Ok);
    }

    #[tokio::test]
    async fn test_execute_authenticates_lazily() {
        let transport = Arc::new(MockTransport::new().on("lssystem", 200, r#"{"name": "fs"}"#));
        let sink = Arc::new(MockStatusSink::default());
        let clock = TestClock::new();
        let mut session = session(transport.clone(), sink, &clock);

        assert!(!session.has_token());
        let value: Value = session.execute("lssystem").await.unwrap();
        assert_eq!(value["name"], "fs");
        assert_eq!(transport.auth_calls(), 1);

        let _: Value = session.execute("lssystem").await.unwrap();
        assert_eq!(transport.auth_calls(), 1);
        assert_eq!(transport.count("lssystem"), 2);
    }

    #[tokio::test]
    async fn test_execute_retries_once_with_fresh_token() {
        let transport = Arc::new(
            MockTransport::new()
                .push("lsnode", MockReply::status(401, ""))
                .on("lsnode", 200, "[]"),
        );
        let sink = Arc::new(MockStatusSink::default());
        let clock = TestClock::new();
        let mut session = session(transport.clone(), sink, &clock);

        let nodes: Vec<Value> = session.execute("lsnode").await.unwrap();
        assert!(nodes.is_empty());
        assert_eq!(transport.count("lsnode"), 2);
        assert_eq!(transport.auth_calls(), 2);
    }

    #[tokio::test]
    async fn test_execute_gives_up_after_two_attempts() {
        let transport = Arc::new(MockTransport::new().on("lsmdiskgrp", 503, "busy"));
        let sink = Arc::new(MockStatusSink::default());
        let clock = TestClock::new();
        let mut session = session(transport.clone(), sink, &clock);

        let result = session.execute::<Value>("lsmdiskgrp").await;
        assert_matches!(
            result,
            Err(Error::RequestFailed { status: Some(503), ref command, .. }) if command == "lsmdiskgrp"
        );
        assert_eq!(transport.count("lsmdiskgrp"), 2);
        assert!(!session.has_token());
    }

    #[tokio::test]
    async fn test_execute_retries_on_decode_error_and_empty_body() {
        let transport = Arc::new(
            MockTransport::new()
                .push("lsmdisk", MockReply::status(200, ""))
                .on("lsmdisk", 200, "not json"),
        );
        let sink = Arc::new(MockStatusSink::default());
        let clock = TestClock::new();
        let mut session = session(transport.clone(), sink, &clock);

        let result = session.execute::<Vec<Value>>("lsmdisk").await;
        assert_matches!(result, Err(Error::RequestFailed { status: Some(200), .. }));
        assert_eq!(transport.count("lsmdisk"), 2);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_token_bodies() {
        for body in [r#"{"token": 42}"#, r#"{"other": "x"}"#, "garbage"] {
            let transport = Arc::new(MockTransport::new().with_auth(MockReply::status(200, body)));
            let sink = Arc::new(MockStatusSink::default());
            let clock = TestClock::new();
            let mut session = session(transport, sink, &clock);

            assert_matches!(session.authenticate().await, Err(Error::AuthenticationFailed { .. }));
            assert_matches!(session.health(), AuthHealth::Failing { .. });
        }
    }

    #[tokio::test]
    async fn test_auth_alert_debounced_and_recovered() {
        let transport = Arc::new(MockTransport::new().with_auth(MockReply::status(403, "")));
        let sink = Arc::new(MockStatusSink::default());
        let clock = TestClock::new();
        let mut session = session(transport.clone(), sink.clone(), &clock);
        let start = clock.now();

        assert!(session.authenticate().await.is_err());
        clock.advance(chrono::Duration::seconds(90));
        assert!(session.authenticate().await.is_err());
        assert!(sink.alerts().is_empty());

        clock.advance(chrono::Duration::seconds(60));
        assert!(session.authenticate().await.is_err());
        assert_eq!(sink.alerts(), vec![(ArrayId::from("fs-a"), AuthAlert::Failing { since: start })]);

        clock.advance(chrono::Duration::minutes(5));
        assert!(session.authenticate().await.is_err());
        assert_eq!(sink.alerts().len(), 1);

        transport.set_auth(MockReply::token("fresh"));
        session.authenticate().await.unwrap();
        assert_eq!(sink.alerts().len(), 2);
        assert_eq!(sink.alerts()[1].1, AuthAlert::Recovered);
        assert_eq!(session.health(), AuthHealth::Ok);

        session.authenticate().await.unwrap();
        assert_eq!(sink.alerts().len(), 2);
    }

    #[tokio::test]
    async fn test_execute_surfaces_auth_failure() {
        let transport = Arc::new(MockTransport::new().with_auth(MockReply::status(401, "")));
        let sink = Arc::new(MockStatusSink::default());
        let clock = TestClock::new();
        let mut session = session(transport.clone(), sink, &clock);

        assert_matches!(
            session.execute::<Value>("lssystem").await,
            Err(Error::AuthenticationFailed { .. })
        );
        assert_eq!(transport.auth_calls(), 2);
        assert_eq!(transport.count("lssystem"), 0);
    }
}
