//! Disconnect command - stop everything and quit the daemon.

use anyhow::Result;
use kbridge_core::ReconcileTrigger;

use super::{orchestrator, print_json};

pub async fn run(json: bool) -> Result<()> {
    let orchestrator = orchestrator().await?;
    orchestrator.get_formatted_status(ReconcileTrigger::User).await;

    let report = orchestrator.disconnect().await;

    if json {
        return print_json(&report);
    }

    for id in report.stopped.iter().chain(&report.external_left) {
        println!("Left {}", id);
    }
    for failure in &report.failed {
        println!("Failed to stop {}: {}", failure.id, failure.error);
    }
    println!("Disconnected.");
    Ok(())
}
