//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces the orchestrator uses to interact
//! with the host OS. Implementations live in `adapters`.

mod runner;
mod spawner;

pub use runner::{render_command, CommandRunner};
pub use spawner::{ChildProcess, Signal, Spawner};
