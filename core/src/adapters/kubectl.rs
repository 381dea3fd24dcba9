//! Cluster queries through kubectl.
//!
//! Read-only: namespaces, deployments with replica counts, the current
//! context, and whether the kubeconfig user needs an interactive login.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::tools::ToolPaths;
use crate::domain::{AuthKind, AuthProvider, ClusterAuthInfo, DeploymentInfo};
use crate::error::{Error, Result};
use crate::ports::CommandRunner;

/// Stateless adapter over the cluster CLI.
pub struct KubectlCluster<R> {
    runner: Arc<R>,
    tools: ToolPaths,
}

impl<R: CommandRunner> KubectlCluster<R> {
    pub fn new(runner: Arc<R>, tools: ToolPaths) -> Self {
        Self { runner, tools }
    }

    /// Fetches all namespace names, sorted.
    pub async fn list_namespaces(&self) -> Result<Vec<String>> {
        let output = self
            .execute(&["get", "namespaces", "-o", "json", "--request-timeout=10s"])
            .await?;

        let response: NamespaceListResponse = serde_json::from_str(&output)
            .map_err(|e| Error::ParseError(format!("namespaces: {}", e)))?;

        let mut namespaces: Vec<String> = response
            .items
            .into_iter()
            .map(|item| item.metadata.name)
            .collect();
        namespaces.sort();

        Ok(namespaces)
    }

    /// Fetches deployments in a namespace, sorted by name.
    pub async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentInfo>> {
        let output = self
            .execute(&[
                "get",
                "deployments",
                "-n",
                namespace,
                "-o",
                "json",
                "--request-timeout=10s",
            ])
            .await?;

        let response: DeploymentListResponse = serde_json::from_str(&output)
            .map_err(|e| Error::ParseError(format!("deployments: {}", e)))?;

        let mut deployments = response.into_deployments(namespace);
        deployments.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(deployments)
    }

    /// Replica counts keyed by deployment name.
    pub async fn replica_counts(&self, namespace: &str) -> Result<HashMap<String, u32>> {
        Ok(self
            .list_deployments(namespace)
            .await?
            .into_iter()
            .map(|d| (d.name, d.replicas))
            .collect())
    }

    /// Resolves a search term to a deployment name.
    ///
    /// Case-insensitive substring match; the first match in name order wins.
    pub async fn find_deployment(&self, namespace: &str, search: &str) -> Result<String> {
        let deployments = self.list_deployments(namespace).await?;
        match_deployment(&deployments, search).ok_or_else(|| Error::DeploymentNotFound {
            search: search.to_string(),
            namespace: namespace.to_string(),
        })
    }

    /// Name of the active kubeconfig context.
    pub async fn current_context(&self) -> Result<String> {
        let output = self.execute(&["config", "current-context"]).await?;
        let context = output.trim();
        if context.is_empty() {
            return Err(Error::ParseError("kubectl reported an empty context".to_string()));
        }
        Ok(context.to_string())
    }

    /// Works out how the current user authenticates and whether it must log in.
    pub async fn cluster_auth_info(&self, namespace: &str) -> Result<ClusterAuthInfo> {
        let (auth_kind, provider) = match self
            .execute(&["config", "view", "--minify", "-o", "json"])
            .await
        {
            Ok(output) => classify_kubeconfig(&output),
            Err(e) => {
                warn!(error = %e, "Could not read kubeconfig, assuming generic credentials");
                (AuthKind::Unknown, AuthProvider::Generic)
            }
        };

        let probe = self
            .execute(&[
                "auth",
                "can-i",
                "list",
                "deployments",
                "-n",
                namespace,
                "--request-timeout=10s",
            ])
            .await;

        let needs_auth = match probe {
            Ok(_) => false,
            Err(e) if e.is_auth_failure() => true,
            // Exec plugins that block on an interactive prompt surface as timeouts.
            Err(Error::Timeout { .. }) if auth_kind == AuthKind::Exec => true,
            Err(e) if e.is_cluster_unreachable() => return Err(e),
            Err(e) => {
                debug!(error = %e, "Permission probe failed without an auth error");
                false
            }
        };

        Ok(ClusterAuthInfo {
            needs_auth,
            auth_kind,
            provider,
        })
    }

    async fn execute(&self, args: &[&str]) -> Result<String> {
        let kubectl = self.tools.kubectl()?;
        self.runner.run(kubectl, args).await
    }
}

/// First deployment whose name contains `search`, ignoring case.
pub fn match_deployment(deployments: &[DeploymentInfo], search: &str) -> Option<String> {
    let needle = search.to_lowercase();
    deployments
        .iter()
        .find(|d| d.name.to_lowercase().contains(&needle))
        .map(|d| d.name.clone())
}

fn classify_kubeconfig(output: &str) -> (AuthKind, AuthProvider) {
    let config: KubeconfigView = match serde_json::from_str(output) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Unreadable kubeconfig view");
            return (AuthKind::Unknown, AuthProvider::Generic);
        }
    };

    let Some(user) = config.users.into_iter().next().map(|u| u.user) else {
        return (AuthKind::Unknown, AuthProvider::Generic);
    };

    if let Some(exec) = user.exec {
        let mut provider = AuthProvider::detect(&exec.command);
        // `kubelogin` is sometimes wrapped by the Azure CLI.
        if provider == AuthProvider::Generic
            && exec.args.iter().any(|a| a.contains("kubelogin"))
        {
            provider = AuthProvider::Kubelogin;
        }
        return (AuthKind::Exec, provider);
    }

    if let Some(auth_provider) = user.auth_provider {
        return (AuthKind::AuthProvider, AuthProvider::detect(&auth_provider.name));
    }

    if user.token.is_some()
        || user.client_certificate.is_some()
        || user.client_certificate_data.is_some()
    {
        return (AuthKind::Static, AuthProvider::Generic);
    }

    (AuthKind::Unknown, AuthProvider::Generic)
}

// ============================================================================
// kubectl JSON Response Parsing
// ============================================================================

/// Response structure for `kubectl get namespaces -o json`.
#[derive(Debug, Deserialize)]
struct NamespaceListResponse {
    items: Vec<NamespaceItem>,
}

#[derive(Debug, Deserialize)]
struct NamespaceItem {
    metadata: ObjectMetadata,
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}

/// Response structure for `kubectl get deployments -o json`.
#[derive(Debug, Deserialize)]
struct DeploymentListResponse {
    items: Vec<DeploymentItem>,
}

#[derive(Debug, Deserialize)]
struct DeploymentItem {
    metadata: ObjectMetadata,
    #[serde(default)]
    spec: DeploymentSpec,
    #[serde(default)]
    status: DeploymentStatus,
}

#[derive(Debug, Default, Deserialize)]
struct DeploymentSpec {
    replicas: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentStatus {
    replicas: Option<u32>,
    ready_replicas: Option<u32>,
}

impl DeploymentListResponse {
    fn into_deployments(self, namespace: &str) -> Vec<DeploymentInfo> {
        self.items
            .into_iter()
            .map(|item| DeploymentInfo {
                name: item.metadata.name,
                namespace: item
                    .metadata
                    .namespace
                    .unwrap_or_else(|| namespace.to_string()),
                // Desired count; Kubernetes defaults it to 1 when omitted.
                replicas: item.spec.replicas.or(item.status.replicas).unwrap_or(1),
                ready_replicas: item.status.ready_replicas.unwrap_or(0),
            })
            .collect()
    }
}

/// Response structure for `kubectl config view --minify -o json`.
#[derive(Debug, Deserialize)]
struct KubeconfigView {
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UserEntry {
    exec: Option<ExecConfig>,
    auth_provider: Option<AuthProviderConfig>,
    token: Option<String>,
    client_certificate: Option<String>,
    client_certificate_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecConfig {
    command: String,
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AuthProviderConfig {
    name: String,
}
