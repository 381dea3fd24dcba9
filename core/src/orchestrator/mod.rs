//! Session & connection orchestration.
//!
//! [`Orchestrator`] owns the namespace connection record and the session
//! registry. User operations (connect, disconnect, start, stop) are serialized
//! by an operation guard; background status passes only run when the guard is
//! free.

mod connection;
mod reconciler;
mod registry;
mod sessions;

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::adapters::{KubectlCluster, SystemCommandRunner, TokioSpawner, ToolPaths};
use crate::config::Settings;
use crate::domain::{ConnectionStatus, DeploymentInfo, InterceptionSession, NamespaceConnection};
use crate::error::{Error, Result};
use crate::intercept::{daemon_selector, ProcessSupervisor, TelepresenceDaemon};
use crate::ports::{CommandRunner, Spawner};

pub use registry::SessionRegistry;
pub use sessions::{StopAllReport, StopFailure};

/// Coordinates the interception daemon, per-session subprocesses and the
/// in-memory view of what is intercepted.
pub struct Orchestrator<R, S: Spawner> {
    settings: Settings,
    tools: ToolPaths,
    cluster: KubectlCluster<R>,
    daemon: TelepresenceDaemon<R>,
    supervisor: ProcessSupervisor<S>,

    /// The single namespace connection, if any.
    connection: RwLock<Option<NamespaceConnection>>,
    /// Kubeconfig context captured when the connection was made.
    context: RwLock<Option<String>>,
    registry: SessionRegistry<S::Child>,
    last_manual_disconnect: RwLock<Option<Instant>>,

    /// Serializes user operations against each other and against status passes.
    operation: Mutex<()>,
}

impl Orchestrator<SystemCommandRunner, TokioSpawner> {
    /// Creates an orchestrator backed by real subprocesses.
    pub fn system(settings: Settings) -> Self {
        let tools = ToolPaths::discover(&settings);
        let runner = Arc::new(SystemCommandRunner::new(settings.command_timeout()));
        Self::new(settings, runner, TokioSpawner::new(), tools)
    }
}

impl<R: CommandRunner, S: Spawner> Orchestrator<R, S> {
    pub fn new(settings: Settings, runner: Arc<R>, spawner: S, tools: ToolPaths) -> Self {
        Self {
            cluster: KubectlCluster::new(runner.clone(), tools.clone()),
            daemon: TelepresenceDaemon::new(runner, tools.clone()),
            supervisor: ProcessSupervisor::new(spawner, tools.clone(), settings.clone()),
            settings,
            tools,
            connection: RwLock::new(None),
            context: RwLock::new(None),
            registry: SessionRegistry::new(),
            last_manual_disconnect: RwLock::new(None),
            operation: Mutex::new(()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// All sessions, ordered by id.
    pub fn get_sessions(&self) -> Vec<InterceptionSession> {
        self.registry.list()
    }

    pub fn get_session(&self, id: &str) -> Option<InterceptionSession> {
        self.registry.get(id)
    }

    pub fn get_connection(&self) -> Option<NamespaceConnection> {
        self.connection.read().clone()
    }

    // =========================================================================
    // Cluster Queries
    // =========================================================================

    pub async fn list_namespaces(&self) -> Result<Vec<String>> {
        self.cluster.list_namespaces().await
    }

    pub async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentInfo>> {
        self.cluster.list_deployments(namespace).await
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Namespace of the connection, provided it is `connected`.
    fn connected_namespace(&self) -> Result<String> {
        match self.connection.read().as_ref() {
            Some(conn) if conn.status == ConnectionStatus::Connected => Ok(conn.namespace.clone()),
            _ => Err(Error::NotConnected),
        }
    }

    fn connection_namespace(&self) -> Option<String> {
        self.connection.read().as_ref().map(|c| c.namespace.clone())
    }

    /// Selector of the daemon this connection talks to.
    fn selector(&self) -> Option<String> {
        let namespace = self.connection_namespace()?;
        let context = self.context.read().clone()?;
        Some(daemon_selector(&context, &namespace))
    }
}

#[cfg(test)]
pub(crate) mod harness {
    use std::sync::Arc;

    use super::Orchestrator;
    use crate::config::Settings;
    use crate::testing::{fake_tools, FakeRunner, FakeSpawner};

    pub type TestOrchestrator = Orchestrator<FakeRunner, Arc<FakeSpawner>>;

    pub const DEPLOYMENTS_JSON: &str = r#"{
        "items": [
            {"metadata": {"name": "cart-staging-11ab", "namespace": "shop"}, "spec": {"replicas": 1}},
            {"metadata": {"name": "orders-staging-7f9c", "namespace": "shop"}, "spec": {"replicas": 3}},
            {"metadata": {"name": "payments-staging-9d2e", "namespace": "shop"}, "spec": {"replicas": 2}}
        ]
    }"#;

    pub const LIST_CMD: &str = "telepresence list --use ctx-shop";

    pub fn orchestrator() -> (TestOrchestrator, Arc<FakeRunner>, Arc<FakeSpawner>) {
        let runner = Arc::new(FakeRunner::new());
        let spawner = Arc::new(FakeSpawner::new());
        let orchestrator =
            Orchestrator::new(Settings::default(), runner.clone(), spawner.clone(), fake_tools());
        (orchestrator, runner, spawner)
    }

    /// Scripts a clean connect to namespace `shop` in context `ctx`.
    pub fn script_connect(runner: &FakeRunner) {
        runner
            .ok("kubectl config current-context", "ctx\n")
            .ok(
                "kubectl auth can-i list deployments -n shop --request-timeout=10s",
                "yes",
            )
            .ok("telepresence connect --namespace shop", "Connected to context ctx")
            .ok(
                "kubectl get deployments -n shop -o json --request-timeout=10s",
                DEPLOYMENTS_JSON,
            );
    }

    /// An orchestrator already connected to `shop`, with the call log cleared.
    pub async fn connected() -> (TestOrchestrator, Arc<FakeRunner>, Arc<FakeSpawner>) {
        let (orchestrator, runner, spawner) = orchestrator();
        script_connect(&runner);
        orchestrator.connect("shop").await.unwrap();
        runner.clear_calls();
        (orchestrator, runner, spawner)
    }

    pub fn listing(entries: &[(&str, bool)]) -> String {
        let mut text = String::new();
        for (deployment, intercepted) in entries {
            if *intercepted {
                text.push_str(&format!(
                    "deployment {} : replaced\n    10.0.0.5 -> 127.0.0.1\n    8080 -> 5001 TCP\n",
                    deployment
                ));
            } else {
                text.push_str(&format!("deployment {} : ready to replace\n", deployment));
            }
        }
        text
    }
}
