//! Leave command - stop one interception.

use anyhow::{bail, Result};
use kbridge_core::ReconcileTrigger;

use super::{orchestrator, print_json};

pub async fn run(deployment: &str, json: bool) -> Result<()> {
    let orchestrator = orchestrator().await?;

    // Picks up interceptions started by other processes.
    orchestrator.get_formatted_status(ReconcileTrigger::User).await;

    let needle = deployment.to_lowercase();
    let sessions = orchestrator.get_sessions();
    let Some(session) = sessions
        .iter()
        .find(|s| s.id == deployment)
        .or_else(|| sessions.iter().find(|s| s.id.to_lowercase().contains(&needle)))
    else {
        bail!(kbridge_core::Error::SessionNotFound(deployment.to_string()));
    };

    orchestrator.stop(&session.id).await?;

    if json {
        print_json(session)?;
    } else {
        println!("Left interception of {}.", session.deployment);
    }
    Ok(())
}
