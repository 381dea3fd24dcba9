//! Interception listing records.

use serde::{Deserialize, Serialize};

/// Interception state of a deployment as reported by the interception CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordStatus {
    Intercepted,
    Available,
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intercepted => "intercepted",
            Self::Available => "available",
            Self::Error => "error",
        }
    }
}

/// One deployment block from the interception listing.
///
/// Produced fresh on every parse and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptionRecord {
    pub deployment: String,
    pub namespace: String,
    pub status: RecordStatus,
    #[serde(rename = "clusterIP", skip_serializing_if = "Option::is_none")]
    pub cluster_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
}

impl InterceptionRecord {
    pub fn new(deployment: impl Into<String>, namespace: impl Into<String>, status: RecordStatus) -> Self {
        Self {
            deployment: deployment.into(),
            namespace: namespace.into(),
            status,
            cluster_ip: None,
            local_port: None,
            target_port: None,
            replicas: None,
        }
    }

    pub fn is_intercepted(&self) -> bool {
        self.status == RecordStatus::Intercepted
    }
}
