//! Interception session state machine.

use std::collections::HashSet;

use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};

use super::Orchestrator;
use crate::domain::InterceptionSession;
use crate::error::{Error, Result};
use crate::ports::{CommandRunner, Spawner};

/// A session that could not be stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopFailure {
    pub id: String,
    pub error: String,
}

/// Outcome of stopping every session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopAllReport {
    /// Sessions stopped and removed.
    pub stopped: Vec<String>,
    /// Sessions left in `error` status.
    pub failed: Vec<StopFailure>,
    /// Interceptions the registry never knew about that were left.
    pub external_left: Vec<String>,
}

impl<R: CommandRunner, S: Spawner> Orchestrator<R, S> {
    /// Starts intercepting the first deployment matching `search`.
    ///
    /// A launch failure leaves the session registered in `error` status.
    pub async fn start(&self, search: &str, local_port: u16) -> Result<InterceptionSession> {
        let _guard = self.operation.lock().await;

        let namespace = self.connected_namespace()?;
        let deployment = self.cluster.find_deployment(&namespace, search).await?;
        if self.registry.contains(&deployment) {
            return Err(Error::SessionAlreadyExists(deployment));
        }

        self.registry.insert(InterceptionSession::starting(
            &namespace,
            &deployment,
            search,
            local_port,
        ))?;
        info!(deployment = %deployment, namespace = %namespace, local_port, "Starting interception");

        match self.launch(&deployment, &namespace, local_port).await {
            Ok(child) => {
                self.registry.attach(&deployment, child);
            }
            Err(e) => {
                error!(deployment = %deployment, error = %e, "Interception failed to start");
                self.registry
                    .update(&deployment, |session| session.mark_error(e.to_string()));
                return Err(e);
            }
        }

        self.registry
            .get(&deployment)
            .ok_or(Error::SessionNotFound(deployment))
    }

    async fn launch(&self, deployment: &str, namespace: &str, local_port: u16) -> Result<S::Child> {
        let known = self.context.read().clone();
        let context = match known {
            Some(context) => context,
            None => self.cluster.current_context().await?,
        };
        self.supervisor.launch(deployment, namespace, &context, local_port)
    }

    /// Stops one interception and removes its session.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let _guard = self.operation.lock().await;
        self.stop_inner(id).await
    }

    /// Stops every session concurrently, then leaves any interception the
    /// listing still reports.
    pub async fn stop_all(&self) -> StopAllReport {
        let _guard = self.operation.lock().await;
        self.stop_all_inner().await
    }

    pub(super) async fn stop_inner(&self, id: &str) -> Result<()> {
        let (session, process) = self.registry.begin_stop(id)?;
        info!(deployment = %session.deployment, "Stopping interception");

        if let Some(child) = process.as_ref() {
            self.supervisor.terminate(child).await;
        }

        let selector = self.selector();
        match self.daemon.leave(&session.deployment, selector.as_deref()).await {
            Ok(()) => {}
            Err(e @ (Error::CommandFailed { .. } | Error::Timeout { .. })) => {
                warn!(deployment = %session.deployment, error = %e, "Leave failed, removing session anyway");
            }
            Err(e) => {
                error!(deployment = %session.deployment, error = %e, "Stop failed");
                self.registry.update(id, |s| s.mark_error(e.to_string()));
                return Err(e);
            }
        }

        self.registry.remove(id);
        info!(deployment = %session.deployment, "Interception stopped");
        Ok(())
    }

    pub(super) async fn stop_all_inner(&self) -> StopAllReport {
        let ids = self.registry.ids();
        let results = join_all(ids.iter().map(|id| async move {
            (id.clone(), self.stop_inner(id).await)
        }))
        .await;

        let mut report = StopAllReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.stopped.push(id),
                Err(e) => report.failed.push(StopFailure {
                    id,
                    error: e.to_string(),
                }),
            }
        }

        let handled: HashSet<&str> = ids.iter().map(String::as_str).collect();
        report.external_left = self.leave_external(&handled).await;
        report
    }

    /// Leaves every intercepted deployment the listing reports outside `handled`.
    async fn leave_external(&self, handled: &HashSet<&str>) -> Vec<String> {
        let namespace = self.connection_namespace().unwrap_or_default();
        let selector = self.selector();

        let records = match self.daemon.list(&namespace, selector.as_deref()).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Could not list interceptions for cleanup");
                return Vec::new();
            }
        };

        let mut left = Vec::new();
        for record in records.iter().filter(|r| r.is_intercepted()) {
            if handled.contains(record.deployment.as_str()) {
                continue;
            }
            match self.daemon.leave(&record.deployment, selector.as_deref()).await {
                Ok(()) => left.push(record.deployment.clone()),
                Err(e) => warn!(deployment = %record.deployment, error = %e, "Could not leave external interception"),
            }
        }
        left
    }
}
