//! Namespace connection state machine.

use tokio::time::Instant;
use tracing::{info, warn};

use super::{Orchestrator, StopAllReport};
use crate::domain::{ConnectionStatus, NamespaceConnection};
use crate::error::{Error, Result};
use crate::ports::{CommandRunner, Spawner};

impl<R: CommandRunner, S: Spawner> Orchestrator<R, S> {
    /// Connects the daemon to `namespace`.
    ///
    /// Fails before touching the daemon when a tool is missing or the cluster
    /// needs an interactive login.
    pub async fn connect(&self, namespace: &str) -> Result<NamespaceConnection> {
        let _guard = self.operation.lock().await;

        self.tools.require_all()?;
        let context = self.cluster.current_context().await?;

        let auth = self.cluster.cluster_auth_info(namespace).await?;
        if auth.needs_auth {
            warn!(namespace, provider = %auth.provider, "Cluster authentication required");
            return Err(Error::AuthenticationRequired {
                provider: auth.provider,
                hint: auth.provider.remediation_hint().to_string(),
            });
        }

        *self.connection.write() = Some(NamespaceConnection::connecting(namespace));
        info!(namespace, context = %context, "Connecting");

        self.daemon.quit_all().await;

        if let Err(e) = self.daemon.connect(namespace).await {
            warn!(namespace, error = %e, "Connect failed");
            if let Some(conn) = self.connection.write().as_mut() {
                conn.mark_error(e.to_string());
            }
            return Err(e);
        }

        let connection = {
            let mut record = self.connection.write();
            let conn = record.get_or_insert_with(|| NamespaceConnection::connecting(namespace));
            conn.mark_connected();
            conn.clone()
        };
        *self.context.write() = Some(context);
        *self.last_manual_disconnect.write() = None;

        info!(namespace, "Connected");
        Ok(connection)
    }

    /// Tears down every session and the daemon, then clears the connection.
    ///
    /// Safe to call without a connection. Cleanup failures are logged and
    /// reported, never returned as errors.
    pub async fn disconnect(&self) -> StopAllReport {
        let _guard = self.operation.lock().await;

        let namespace = {
            let mut record = self.connection.write();
            record.as_mut().map(|conn| {
                conn.status = ConnectionStatus::Disconnecting;
                conn.namespace.clone()
            })
        };
        match &namespace {
            Some(ns) => info!(namespace = %ns, "Disconnecting"),
            None => info!("No active connection, running general cleanup"),
        }

        let report = self.stop_all_inner().await;
        if !report.failed.is_empty() {
            warn!(failed = report.failed.len(), "Some sessions could not be stopped");
        }

        let selector = self.selector();
        if let Err(e) = self.daemon.quit(selector.as_deref()).await {
            warn!(error = %e, "Daemon quit failed, killing daemon processes");
            self.daemon.kill_daemons().await;
        }

        *self.last_manual_disconnect.write() = Some(Instant::now());
        *self.connection.write() = None;
        *self.context.write() = None;

        info!("Disconnected");
        report
    }

    /// Drops the connection record without touching sessions or processes.
    pub fn force_reset(&self) {
        if let Some(conn) = self.connection.write().take() {
            warn!(namespace = %conn.namespace, status = %conn.status, "Connection record reset");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::super::harness::{connected, orchestrator, script_connect};
    use super::*;
    use crate::adapters::ToolPaths;
    use crate::config::Settings;
    use crate::domain::AuthProvider;
    use crate::testing::{FakeRunner, FakeSpawner};

    #[tokio::test]
    async fn test_connect_quits_before_connecting() {
        let (orchestrator, runner, _) = orchestrator();
        script_connect(&runner);

        let conn = orchestrator.connect("shop").await.unwrap();
        assert_eq!(conn.status, ConnectionStatus::Connected);
        assert_eq!(conn.namespace, "shop");

        let quit = runner.position("telepresence quit -s").unwrap();
        let connect = runner.position("telepresence connect --namespace shop").unwrap();
        assert!(quit < connect);
        assert_eq!(orchestrator.selector().as_deref(), Some("ctx-shop"));
    }

    #[tokio::test]
    async fn test_connect_failure_marks_error() {
        let (orchestrator, runner, _) = orchestrator();
        script_connect(&runner);
        runner.fail("telepresence connect --namespace shop", "daemon refused");

        let err = orchestrator.connect("shop").await.unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));

        let conn = orchestrator.get_connection().unwrap();
        assert_eq!(conn.status, ConnectionStatus::Error);
        assert!(conn.last_error.unwrap().contains("daemon refused"));
    }

    #[tokio::test]
    async fn test_connect_requires_authentication() {
        let (orchestrator, runner, _) = orchestrator();
        script_connect(&runner);
        runner.ok(
            "kubectl config view --minify -o json",
            r#"{"users": [{"name": "u", "user": {"exec": {"command": "kubelogin"}}}]}"#,
        );
        runner.fail(
            "kubectl auth can-i list deployments -n shop --request-timeout=10s",
            "error: You must be logged in to the server (Unauthorized)",
        );

        let err = orchestrator.connect("shop").await.unwrap_err();
        match err {
            Error::AuthenticationRequired { provider, hint } => {
                assert_eq!(provider, AuthProvider::Kubelogin);
                assert_eq!(hint, AuthProvider::Kubelogin.remediation_hint());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(orchestrator.get_connection().is_none());
        assert!(!runner.called("telepresence connect --namespace shop"));
    }

    #[tokio::test]
    async fn test_connect_without_tools_fails_fast() {
        let runner = Arc::new(FakeRunner::new());
        let tools = ToolPaths::with_paths(None, Some(PathBuf::from("/fake/bin/kubectl")));
        let orchestrator = Orchestrator::new(
            Settings::default(),
            runner.clone(),
            Arc::new(FakeSpawner::new()),
            tools,
        );

        let err = orchestrator.connect("shop").await.unwrap_err();
        assert!(matches!(err, Error::PrerequisiteMissing { tool } if tool == "telepresence"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_without_connection_is_idempotent() {
        let (orchestrator, runner, _) = orchestrator();

        let report = orchestrator.disconnect().await;
        assert!(report.failed.is_empty());
        let report = orchestrator.disconnect().await;
        assert!(report.stopped.is_empty());

        assert!(orchestrator.get_connection().is_none());
        assert!(runner.called("pkill -f telepresence.*daemon"));
    }

    #[tokio::test]
    async fn test_disconnect_quits_scoped_daemon() {
        let (orchestrator, runner, _) = connected().await;
        runner.ok("telepresence quit --use ctx-shop", "");

        orchestrator.disconnect().await;

        assert!(orchestrator.get_connection().is_none());
        assert!(orchestrator.last_manual_disconnect.read().is_some());
        assert!(runner.called("telepresence quit --use ctx-shop"));
        assert!(!runner.called("pkill -f telepresence.*daemon"));
    }

    #[tokio::test]
    async fn test_force_reset_keeps_sessions() {
        let (orchestrator, runner, _) = connected().await;
        runner.ok("telepresence leave orders-staging-7f9c --use ctx-shop", "");
        orchestrator.start("orders", 5001).await.unwrap();

        orchestrator.force_reset();
        assert!(orchestrator.get_connection().is_none());
        assert_eq!(orchestrator.get_sessions().len(), 1);
    }
}
