//! Reconciliation of the session registry against the interception listing,
//! and the status snapshot built from it.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};

use super::Orchestrator;
use crate::domain::{
    ConnectionStatus, DaemonProbe, InterceptionRecord, InterceptionSession, NamespaceConnection,
    ReconcileTrigger, RecordStatus, SessionStatus, StatusSnapshot,
};
use crate::intercept::daemon_selector;
use crate::ports::{CommandRunner, Spawner};

/// Namespace the interception CLI falls back to when nothing else is known.
const DEFAULT_NAMESPACE: &str = "default";

impl<R: CommandRunner, S: Spawner> Orchestrator<R, S> {
    /// Refreshes state from the interception listing and reports it.
    ///
    /// Background passes are skipped, and answered from memory, while a user
    /// operation is running or shortly after a manual disconnect.
    pub async fn get_formatted_status(&self, trigger: ReconcileTrigger) -> StatusSnapshot {
        let _guard: MutexGuard<'_, ()> = match trigger {
            ReconcileTrigger::User => self.operation.lock().await,
            ReconcileTrigger::Background => {
                if self.within_suppression_window() {
                    debug!("Recent manual disconnect, skipping background reconciliation");
                    return self.snapshot_from_memory(None);
                }
                match self.operation.try_lock() {
                    Ok(guard) => guard,
                    Err(_) => {
                        debug!("Operation in progress, skipping background reconciliation");
                        return self.snapshot_from_memory(None);
                    }
                }
            }
        };

        self.reconcile().await
    }

    fn within_suppression_window(&self) -> bool {
        self.last_manual_disconnect
            .read()
            .is_some_and(|at| at.elapsed() < self.settings.suppression_window())
    }

    async fn reconcile(&self) -> StatusSnapshot {
        let probe = self.daemon.probe().await;

        let namespace = self
            .connection_namespace()
            .or_else(|| probe.namespace.clone())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let selector = self.selector().or_else(|| match (&probe.context, &probe.namespace) {
            (Some(context), Some(ns)) => Some(daemon_selector(context, ns)),
            _ => None,
        });

        let mut records = match self.daemon.list(&namespace, selector.as_deref()).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to list interceptions");
                return self.snapshot_from_memory(Some(e.to_string()));
            }
        };

        match self.cluster.replica_counts(&namespace).await {
            Ok(counts) => {
                for record in &mut records {
                    record.replicas = counts.get(&record.deployment).copied();
                }
            }
            Err(e) => debug!(namespace = %namespace, error = %e, "Replica counts unavailable"),
        }

        self.apply_listing(&records).await;

        let any_intercepted = records.iter().any(InterceptionRecord::is_intercepted);
        let connection = self.connection.read().clone();
        let record_connected = connection.as_ref().is_some_and(NamespaceConnection::is_connected);

        let mut daemon_status = if record_connected || any_intercepted {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        };
        // The raw probe may upgrade, never downgrade.
        if daemon_status == ConnectionStatus::Disconnected && probe.connected {
            daemon_status = ConnectionStatus::Connected;
        }

        if daemon_status == ConnectionStatus::Connected && connection.is_none() {
            self.adopt_connection(&probe);
        }

        let connection_status = match &connection {
            Some(conn) if conn.status == ConnectionStatus::Error && !any_intercepted => {
                ConnectionStatus::Error
            }
            _ => daemon_status,
        };

        self.append_error_records(&mut records);
        build_snapshot(
            records,
            connection_status,
            daemon_status,
            self.connection.read().clone(),
            None,
        )
    }

    /// Creates sessions for new interceptions and drops the ones that ended.
    async fn apply_listing(&self, records: &[InterceptionRecord]) {
        let intercepted: HashMap<&str, &InterceptionRecord> = records
            .iter()
            .filter(|r| r.is_intercepted())
            .map(|r| (r.deployment.as_str(), r))
            .collect();

        for record in intercepted.values() {
            if self.registry.contains(&record.deployment) {
                continue;
            }
            let session =
                InterceptionSession::detected(&record.namespace, &record.deployment, record.local_port);
            if self.registry.insert(session).is_ok() {
                info!(deployment = %record.deployment, "Detected external interception");
            }
        }
        let removed = self
            .registry
            .prune(|session| intercepted.contains_key(session.id.as_str()));
        for (session, process) in removed {
            info!(deployment = %session.deployment, "Interception no longer reported, removing session");
            if let Some(child) = process {
                self.supervisor.terminate(&child).await;
            }
        }
    }

    fn adopt_connection(&self, probe: &DaemonProbe) {
        let Some(namespace) = probe.namespace.clone() else {
            return;
        };
        info!(namespace = %namespace, "Adopting existing daemon connection");
        *self.connection.write() = Some(NamespaceConnection::adopted(namespace));
        if let Some(context) = probe.context.clone() {
            *self.context.write() = Some(context);
        }
    }

    /// Reports sessions in `error` status so they stay visible.
    fn append_error_records(&self, records: &mut Vec<InterceptionRecord>) {
        for session in self
            .registry
            .list()
            .into_iter()
            .filter(|s| s.status == SessionStatus::Error)
        {
            match records.iter_mut().find(|r| r.deployment == session.deployment) {
                Some(record) if !record.is_intercepted() => record.status = RecordStatus::Error,
                Some(_) => {}
                None => records.push(error_record(&session)),
            }
        }
    }

    /// A snapshot built without any external calls.
    pub fn snapshot_from_memory(&self, error: Option<String>) -> StatusSnapshot {
        let connection = self.connection.read().clone();
        let records: Vec<InterceptionRecord> = self
            .registry
            .list()
            .iter()
            .map(|session| match session.status {
                SessionStatus::Error => error_record(session),
                _ => {
                    let mut record = InterceptionRecord::new(
                        &session.deployment,
                        &session.namespace,
                        RecordStatus::Intercepted,
                    );
                    record.local_port = Some(session.local_port);
                    record
                }
            })
            .collect();

        let connected = connection.as_ref().is_some_and(NamespaceConnection::is_connected)
            || records.iter().any(InterceptionRecord::is_intercepted);
        let daemon_status = if connected {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        };
        let connection_status = connection.as_ref().map_or(daemon_status, |c| c.status);

        build_snapshot(records, connection_status, daemon_status, connection, error)
    }
}

fn error_record(session: &InterceptionSession) -> InterceptionRecord {
    let mut record =
        InterceptionRecord::new(&session.deployment, &session.namespace, RecordStatus::Error);
    record.local_port = Some(session.local_port);
    record
}

fn build_snapshot(
    interceptions: Vec<InterceptionRecord>,
    connection_status: ConnectionStatus,
    daemon_status: ConnectionStatus,
    namespace_connection: Option<NamespaceConnection>,
    error: Option<String>,
) -> StatusSnapshot {
    StatusSnapshot {
        interceptions,
        connection_status,
        daemon_status,
        timestamp: Utc::now(),
        namespace_connection,
        error,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::harness::{connected, listing, orchestrator, LIST_CMD};
    use super::*;
    use crate::ports::Signal;

    const STATUS_OUTPUT: &str = "\
User Daemon: Running
  Status            : Connected
  Kubernetes context: ctx
  Namespace         : shop
";

    #[tokio::test]
    async fn test_listing_creates_session_for_intercepted_only() {
        let (orchestrator, runner, _) = orchestrator();
        runner.ok(
            "telepresence list",
            &listing(&[("orders-staging-7f9c", true), ("cart-staging-11ab", false)]),
        );

        let snapshot = orchestrator.get_formatted_status(ReconcileTrigger::User).await;

        let sessions = orchestrator.get_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "orders-staging-7f9c");
        assert_eq!(sessions[0].original_service_name, "orders");
        assert_eq!(sessions[0].status, SessionStatus::Connected);
        assert!(!sessions[0].is_local);

        assert_eq!(snapshot.interceptions.len(), 2);
        assert_eq!(snapshot.daemon_status, ConnectionStatus::Connected);
        assert_eq!(snapshot.intercepted().count(), 1);
    }

    #[tokio::test]
    async fn test_empty_listing_empties_registry() {
        let (orchestrator, runner, _) = orchestrator();
        runner.ok(
            "telepresence list",
            &listing(&[("orders-staging-7f9c", true)]),
        );
        orchestrator.get_formatted_status(ReconcileTrigger::User).await;
        assert_eq!(orchestrator.get_sessions().len(), 1);

        runner.ok("telepresence list", "");
        let snapshot = orchestrator.get_formatted_status(ReconcileTrigger::User).await;

        assert!(orchestrator.get_sessions().is_empty());
        assert!(snapshot.interceptions.is_empty());
        assert_eq!(snapshot.connection_status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_listing_keeps_registry() {
        let (orchestrator, runner, _) = orchestrator();
        runner.ok(
            "telepresence list",
            &listing(&[("orders-staging-7f9c", true)]),
        );
        orchestrator.get_formatted_status(ReconcileTrigger::User).await;

        runner.fail("telepresence list", "daemon not running");
        let snapshot = orchestrator.get_formatted_status(ReconcileTrigger::User).await;

        assert_eq!(orchestrator.get_sessions().len(), 1);
        assert!(snapshot.error.as_deref().unwrap().contains("daemon not running"));
        assert_eq!(snapshot.intercepted().count(), 1);
    }

    #[tokio::test]
    async fn test_replicas_merged_into_records() {
        let (orchestrator, runner, _) = connected().await;
        runner.ok(LIST_CMD, &listing(&[("orders-staging-7f9c", true)]));

        let snapshot = orchestrator.get_formatted_status(ReconcileTrigger::User).await;
        let record = &snapshot.interceptions[0];
        assert_eq!(record.replicas, Some(3));
        assert_eq!(record.cluster_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(record.local_port, Some(5001));
        assert_eq!(record.target_port, Some(8080));
    }

    #[tokio::test]
    async fn test_unlisted_local_session_pruned_and_terminated() {
        let (orchestrator, runner, spawner) = connected().await;
        orchestrator.start("orders", 5001).await.unwrap();
        runner.ok(LIST_CMD, "");

        let snapshot = orchestrator.get_formatted_status(ReconcileTrigger::User).await;
        assert!(orchestrator.get_sessions().is_empty());
        assert_eq!(snapshot.intercepted().count(), 0);

        let child = spawner.child_for("orders-staging-7f9c").unwrap();
        assert_eq!(child.signals(), vec![Signal::Terminate]);
    }

    #[tokio::test]
    async fn test_error_session_reported_and_kept() {
        let (orchestrator, runner, spawner) = connected().await;
        spawner.fail_for("orders-staging-7f9c");
        orchestrator.start("orders", 5001).await.unwrap_err();
        runner.ok(LIST_CMD, &listing(&[("orders-staging-7f9c", false)]));

        let snapshot = orchestrator.get_formatted_status(ReconcileTrigger::User).await;

        assert_eq!(orchestrator.get_sessions().len(), 1);
        assert_eq!(snapshot.interceptions.len(), 1);
        assert_eq!(snapshot.interceptions[0].status, RecordStatus::Error);
        assert_eq!(snapshot.connection_status, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_probe_upgrades_but_never_downgrades() {
        let (orchestrator, runner, _) = orchestrator();
        runner.ok("telepresence status", STATUS_OUTPUT);
        runner.ok(LIST_CMD, "");

        let snapshot = orchestrator.get_formatted_status(ReconcileTrigger::User).await;
        assert_eq!(snapshot.daemon_status, ConnectionStatus::Connected);
        let adopted = orchestrator.get_connection().unwrap();
        assert_eq!(adopted.namespace, "shop");
        assert_eq!(adopted.status, ConnectionStatus::Connected);

        let (orchestrator, runner, _) = connected().await;
        runner.ok(LIST_CMD, "");
        let snapshot = orchestrator.get_formatted_status(ReconcileTrigger::User).await;
        assert_eq!(snapshot.daemon_status, ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppression_window_after_manual_disconnect() {
        let (orchestrator, runner, _) = connected().await;
        runner.ok("telepresence quit --use ctx-shop", "");
        orchestrator.disconnect().await;
        runner.clear_calls();

        runner.ok("telepresence status", STATUS_OUTPUT);
        runner.ok(LIST_CMD, &listing(&[("orders-staging-7f9c", true)]));

        tokio::time::advance(Duration::from_secs(10)).await;
        let snapshot = orchestrator
            .get_formatted_status(ReconcileTrigger::Background)
            .await;
        assert!(orchestrator.get_connection().is_none());
        assert!(orchestrator.get_sessions().is_empty());
        assert_eq!(snapshot.connection_status, ConnectionStatus::Disconnected);
        assert!(!runner.called(LIST_CMD));

        tokio::time::advance(Duration::from_secs(21)).await;
        let snapshot = orchestrator
            .get_formatted_status(ReconcileTrigger::Background)
            .await;
        assert_eq!(orchestrator.get_sessions().len(), 1);
        assert_eq!(orchestrator.get_connection().unwrap().namespace, "shop");
        assert_eq!(snapshot.connection_status, ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_trigger_ignores_suppression() {
        let (orchestrator, runner, _) = connected().await;
        orchestrator.disconnect().await;
        runner.ok("telepresence list", &listing(&[("orders-staging-7f9c", true)]));

        orchestrator.get_formatted_status(ReconcileTrigger::User).await;
        assert_eq!(orchestrator.get_sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_background_skips_while_operation_runs() {
        let (orchestrator, runner, _) = connected().await;
        let _busy = orchestrator.operation.lock().await;

        let snapshot = orchestrator
            .get_formatted_status(ReconcileTrigger::Background)
            .await;
        assert!(runner.calls().is_empty());
        assert_eq!(snapshot.connection_status, ConnectionStatus::Connected);
    }
}
