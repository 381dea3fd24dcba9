//! KBridge Core Library
//!
//! Orchestrates traffic interception for Kubernetes deployments on top of the
//! `telepresence` and `kubectl` CLIs. Provides functionality to:
//! - Connect the interception daemon to one namespace at a time
//! - Start and stop per-deployment interceptions (one session per deployment)
//! - Reconcile in-memory sessions against the daemon's interception listing
//! - Supervise the long-running interception subprocesses
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure data models and state rules
//! - `ports`: Trait definitions for running commands and spawning processes
//! - `adapters`: tokio implementations of the ports, kubectl queries, tool discovery
//! - `intercept`: Listing parser, daemon commands, process supervisor
//! - `orchestrator`: Connection and session state machines, reconciler

// Hexagonal architecture layers
pub mod adapters;
pub mod domain;
pub mod ports;

pub mod config;
pub mod error;
pub mod intercept;
pub mod orchestrator;

#[cfg(test)]
mod testing;

// Re-export domain types (primary API)
pub use domain::{
    ConnectionStatus, DeploymentInfo, InterceptionRecord, InterceptionSession, NamespaceConnection,
    ReconcileTrigger, RecordStatus, SessionStatus, StatusSnapshot,
};

// Re-export other commonly used types
pub use config::{ConfigStore, Settings};
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, StopAllReport};
