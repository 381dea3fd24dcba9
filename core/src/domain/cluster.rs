//! Cluster-side data returned by the cluster query adapter.

use serde::{Deserialize, Serialize};

/// A deployment in a namespace with its replica counts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub name: String,
    pub namespace: String,
    pub replicas: u32,
    pub ready_replicas: u32,
}

/// How the current kubeconfig user authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum AuthKind {
    /// An exec credential plugin.
    Exec,
    /// A legacy `auth-provider` entry.
    AuthProvider,
    /// A static token or client certificate.
    Static,
    #[default]
    Unknown,
}

/// The login tool that can refresh cluster credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum AuthProvider {
    /// Azure managed-identity login plugin.
    Kubelogin,
    AzureCli,
    GoogleCloud,
    AwsCli,
    #[default]
    Generic,
}

impl AuthProvider {
    /// Classifies an exec plugin or auth-provider name.
    pub fn detect(command: &str) -> Self {
        let name = command.to_lowercase();
        let name = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(&name);

        if name.starts_with("kubelogin") {
            AuthProvider::Kubelogin
        } else if name == "az" || name.starts_with("az.") || name == "azure" {
            AuthProvider::AzureCli
        } else if name.contains("gcloud") || name == "gcp" || name.contains("gke") {
            AuthProvider::GoogleCloud
        } else if name == "aws" || name.starts_with("aws-iam-authenticator") || name.starts_with("aws.") {
            AuthProvider::AwsCli
        } else {
            AuthProvider::Generic
        }
    }

    /// What the user should run to get working credentials again.
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            Self::Kubelogin => "run `kubelogin convert-kubeconfig -l azurecli` and then `az login`",
            Self::AzureCli => "run `az login` and retry",
            Self::GoogleCloud => "run `gcloud auth login` and retry",
            Self::AwsCli => "run `aws sso login` (or refresh your AWS credentials) and retry",
            Self::Generic => "refresh the credentials for the current kubeconfig context and retry",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kubelogin => "kubelogin",
            Self::AzureCli => "azure-cli",
            Self::GoogleCloud => "gcloud",
            Self::AwsCli => "aws-cli",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the cluster authentication probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAuthInfo {
    pub needs_auth: bool,
    pub auth_kind: AuthKind,
    pub provider: AuthProvider,
}
