//! Interception session domain model.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an interception session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Redirection of one deployment's traffic to a local port.
///
/// The `id` is the full deployment name, so the registry can hold at most one
/// session per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptionSession {
    pub id: String,
    pub namespace: String,
    pub deployment: String,
    pub original_service_name: String,
    pub local_port: u16,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Whether this process launched the interception (and holds its subprocess).
    pub is_local: bool,
}

impl InterceptionSession {
    /// A session being started by this process.
    pub fn starting(
        namespace: impl Into<String>,
        deployment: impl Into<String>,
        search_term: impl Into<String>,
        local_port: u16,
    ) -> Self {
        let deployment = deployment.into();
        Self {
            id: deployment.clone(),
            namespace: namespace.into(),
            deployment,
            original_service_name: search_term.into(),
            local_port,
            status: SessionStatus::Connecting,
            started_at: Utc::now(),
            last_error: None,
            is_local: true,
        }
    }

    /// A session synthesized from an externally-detected interception.
    pub fn detected(namespace: impl Into<String>, deployment: &str, local_port: Option<u16>) -> Self {
        Self {
            id: deployment.to_string(),
            namespace: namespace.into(),
            deployment: deployment.to_string(),
            original_service_name: derive_service_name(deployment),
            local_port: local_port.unwrap_or_default(),
            status: SessionStatus::Connected,
            started_at: Utc::now(),
            last_error: None,
            is_local: false,
        }
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = SessionStatus::Error;
        self.last_error = Some(message.into());
    }
}

fn service_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Leading token, then an optional environment-generated suffix.
    PATTERN.get_or_init(|| Regex::new(r"(?i)^([a-z0-9]+)(?:-[a-z0-9-]+)?$").unwrap())
}

/// Recovers the short service name from a generated deployment name.
///
/// `orders-staging-7f9c` becomes `orders`. Names the pattern does not
/// recognize are returned unchanged.
pub fn derive_service_name(deployment: &str) -> String {
    service_name_pattern()
        .captures(deployment)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| deployment.to_string())
}
