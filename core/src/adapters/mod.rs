//! Adapters layer - External system implementations.
//!
//! This module contains implementations of the port traits defined in `ports`,
//! plus the kubectl adapter used for read-only cluster queries.

pub mod kubectl;
pub mod process;
pub mod runner;
pub mod tools;

// Re-export main types for convenience
pub use kubectl::KubectlCluster;
pub use process::{TokioChild, TokioSpawner};
pub use runner::SystemCommandRunner;
pub use tools::ToolPaths;
