//! Readiness Checks
//!
//! Code level, user privilege and cluster state rules, plus the ordered
//! readiness sequence run against a session.

use super::session::ArraySession;
use crate::domain::ports::{Readiness, ReadinessReason};
use crate::error::{Error, Result};
use crate::model::{NodeRecord, SystemRecord, UserRecord};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Lowest supported array code level
pub const MIN_CODE_LEVEL: &str = "8.3.1";

/// Version pieces compared; missing pieces count as zero
const VERSION_PIECES: usize = 4;

/// Roles allowed to run the listing commands
pub const ALLOWED_ROLES: &[&str] = &["Administrator", "SecurityAdmin", "RestrictedAdmin"];

/// Node states that make the cluster not ready
pub const UNHEALTHY_NODE_STATES: &[&str] = &[
    "starting", "service", "pending", "offline", "flushing", "deleting", "adding",
];

/// Names of the I/O groups checked for node redundancy
const IO_GROUP_PREFIX: &str = "io_grp";

fn version_key(version: &str) -> [u64; VERSION_PIECES] {
    let mut key = [0; VERSION_PIECES];
    for (slot, piece) in key.iter_mut().zip(version.trim().split('.')) {
        *slot = piece.trim().parse().unwrap_or(0);
    }
    key
}

/// Whether `version` is at least [`MIN_CODE_LEVEL`]
pub fn version_supported(version: &str) -> bool {
    version_key(version) >= version_key(MIN_CODE_LEVEL)
}

pub fn check_version(system: &SystemRecord) -> Result<()> {
    if version_supported(&system.version) {
        Ok(())
    } else {
        Err(Error::UnsupportedVersion {
            found: system.version.clone(),
            minimum: MIN_CODE_LEVEL.to_string(),
        })
    }
}

/// Passes if any reported role is allowed
pub fn check_user_role(users: &[UserRecord]) -> Result<()> {
    let roles: Vec<&str> = users.iter().filter_map(|u| u.role.as_deref()).collect();
    if roles.iter().any(|role| ALLOWED_ROLES.contains(role)) {
        return Ok(());
    }
    Err(Error::InsufficientRole {
        role: if roles.is_empty() {
            "none".to_string()
        } else {
            roles.join(",")
        },
    })
}

/// Every node healthy and no I/O group left with a single node
///
/// Only groups named `io_grp*` count; spare and unassigned nodes carry other
/// group names.
pub fn cluster_ready(nodes: &[NodeRecord]) -> bool {
    let mut io_groups: BTreeMap<&str, usize> = BTreeMap::new();
    for node in nodes {
        if UNHEALTHY_NODE_STATES.contains(&node.status.as_str()) {
            info!(node = %node.name, id = %node.id, status = %node.status, "Node is unhealthy");
            return false;
        }
        if node.io_group.starts_with(IO_GROUP_PREFIX) {
            *io_groups.entry(node.io_group.as_str()).or_default() += 1;
        }
    }

    match io_groups.iter().find(|(_, count)| **count == 1) {
        Some((group, _)) => {
            info!(io_group = %group, "I/O group has a single node");
            false
        }
        None => true,
    }
}

impl ArraySession {
    /// Authenticate, then check code level, then check privilege
    ///
    /// Stops at the first failing step.
    pub async fn check_readiness(&mut self) -> Readiness {
        match self.readiness_steps().await {
            Ok(()) => Readiness::Ready,
            Err(e) => {
                let reason = ReadinessReason::from_error(&e);
                warn!(array = %self.array(), reason = %reason, "Array not ready: {}", e);
                Readiness::NotReady(reason)
            }
        }
    }

    async fn readiness_steps(&mut self) -> Result<()> {
        self.authenticate().await?;
        let system = self.system().await?;
        check_version(&system)?;
        let users = self.current_user().await?;
        check_user_role(&users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ArrayId;
    use crate::testing::{credentials, golden_transport, MockReply, MockStatusSink, MockTransport};
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn node(name: &str, status: &str, group: &str) -> NodeRecord {
        NodeRecord {
            id: name.trim_start_matches("node").to_string(),
            name: name.to_string(),
            status: status.to_string(),
            io_group: group.to_string(),
        }
    }

    fn make_session(transport: Arc<MockTransport>) -> ArraySession {
        ArraySession::new(
            ArrayId::from("fs-a"),
            transport,
            credentials("10.0.0.5"),
            Arc::new(MockStatusSink::default()),
            chrono::Duration::minutes(2),
        )
    }

    #[test]
    fn test_version_rule() {
        assert!(version_supported("8.3.1"));
        assert!(version_supported("8.3.1.0"));
        assert!(version_supported("8.4.0.2"));
        assert!(version_supported("8.10"));
        assert!(!version_supported("8.3.0.9"));
        assert!(!version_supported("8.2"));
        assert!(!version_supported("7.8.1.11"));
    }

    #[test]
    fn test_role_rule() {
        let users = |roles: &[Option<&str>]| -> Vec<UserRecord> {
            roles.iter().map(|r| UserRecord { role: r.map(String::from) }).collect()
        };

        assert!(check_user_role(&users(&[Some("Administrator")])).is_ok());
        assert!(check_user_role(&users(&[None, Some("RestrictedAdmin")])).is_ok());
        assert_matches!(
            check_user_role(&users(&[Some("Monitor")])),
            Err(Error::InsufficientRole { role }) if role == "Monitor"
        );
        assert_matches!(check_user_role(&[]), Err(Error::InsufficientRole { .. }));
    }

    #[test]
    fn test_cluster_all_online_redundant() {
        let nodes = vec![node("node1", "online", "io_grp0"), node("node2", "online", "io_grp0")];
        assert!(cluster_ready(&nodes));
    }

    #[test]
    fn test_cluster_unhealthy_node() {
        let nodes = vec![node("node1", "online", "io_grp0"), node("node2", "offline", "io_grp0")];
        assert!(!cluster_ready(&nodes));

        for status in UNHEALTHY_NODE_STATES {
            assert!(!cluster_ready(&[node("node1", status, "g"), node("node2", "online", "g")]));
        }
    }

    #[test]
    fn test_cluster_single_node_io_group() {
        let nodes = vec![
            node("node1", "online", "io_grp0"),
            node("node2", "online", "io_grp0"),
            node("node3", "online", "io_grp1"),
        ];
        assert!(!cluster_ready(&nodes));
    }

    #[test]
    fn test_cluster_ignores_nodes_outside_io_groups() {
        let nodes = vec![
            node("node1", "online", "io_grp0"),
            node("node2", "online", "io_grp0"),
            node("spare1", "spare", ""),
            node("node9", "online", "recovery_io_grp"),
        ];
        assert!(cluster_ready(&nodes));
    }

    #[tokio::test]
    async fn test_readiness_golden_array() {
        let mut session = make_session(Arc::new(golden_transport()));
        assert_eq!(session.check_readiness().await, Readiness::Ready);
    }

    #[tokio::test]
    async fn test_readiness_short_circuits_on_auth() {
        let transport = Arc::new(golden_transport().with_auth(MockReply::status(401, "")));
        let mut session = make_session(transport.clone());

        assert_eq!(
            session.check_readiness().await,
            Readiness::NotReady(ReadinessReason::AuthFailure)
        );
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_readiness_version_then_role() {
        let old = Arc::new(
            golden_transport().on("lssystem", 200, r#"{"code_level": "8.2.1.0 (build 1)", "product_name": "IBM FlashSystem 5000"}"#),
        );
        let mut session = make_session(old.clone());
        assert_eq!(
            session.check_readiness().await,
            Readiness::NotReady(ReadinessReason::VersionCheckFailed)
        );
        assert_eq!(old.count("lscurrentuser"), 0);

        let monitor = Arc::new(golden_transport().on("lscurrentuser", 200, r#"[{"role": "Monitor"}]"#));
        let mut session = make_session(monitor);
        assert_eq!(
            session.check_readiness().await,
            Readiness::NotReady(ReadinessReason::RoleCheckFailed)
        );
    }

    #[tokio::test]
    async fn test_readiness_rest_failure() {
        let transport = Arc::new(golden_transport().on("lssystem", 500, ""));
        let mut session = make_session(transport);
        assert_eq!(
            session.check_readiness().await,
            Readiness::NotReady(ReadinessReason::RestFailure)
        );
    }
}
