//! Domain layer - Pure business logic and data models.
//!
//! This module contains domain entities that represent core business concepts.
//! These types have no I/O dependencies and can be tested in isolation.

mod cluster;
mod connection;
mod record;
mod session;
mod status;

// Re-export all domain types
pub use cluster::{AuthKind, AuthProvider, ClusterAuthInfo, DeploymentInfo};
pub use connection::{ConnectionStatus, NamespaceConnection};
pub use record::{InterceptionRecord, RecordStatus};
pub use session::{derive_service_name, InterceptionSession, SessionStatus};
pub use status::{DaemonProbe, ReconcileTrigger, StatusSnapshot};
