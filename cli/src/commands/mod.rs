//! Subcommand implementations.

pub mod cluster;
pub mod config;
pub mod disconnect;
pub mod intercept;
pub mod leave;
pub mod status;

use anyhow::Result;
use kbridge_core::adapters::{SystemCommandRunner, TokioSpawner};
use kbridge_core::{ConfigStore, Orchestrator, Settings};
use serde::Serialize;

pub type SystemOrchestrator = Orchestrator<SystemCommandRunner, TokioSpawner>;

/// Loads settings from the config file, falling back to defaults.
pub async fn load_settings() -> Result<Settings> {
    let store = ConfigStore::new()?;
    Ok(store.load().await?)
}

pub async fn orchestrator() -> Result<SystemOrchestrator> {
    Ok(Orchestrator::system(load_settings().await?))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 1).collect();
        format!("{}…", head)
    }
}
