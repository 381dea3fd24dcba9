//! Status snapshot reported to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConnectionStatus, InterceptionRecord, NamespaceConnection};

/// What the raw `status` command of the interception CLI says about its daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DaemonProbe {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Who asked for a status refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileTrigger {
    /// A polling timer.
    Background,
    /// A direct user action.
    User,
}

/// A point-in-time view of connection and interception state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub interceptions: Vec<InterceptionRecord>,
    pub connection_status: ConnectionStatus,
    pub daemon_status: ConnectionStatus,
    pub timestamp: DateTime<Utc>,
    pub namespace_connection: Option<NamespaceConnection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusSnapshot {
    pub fn intercepted(&self) -> impl Iterator<Item = &InterceptionRecord> {
        self.interceptions.iter().filter(|r| r.is_intercepted())
    }
}
