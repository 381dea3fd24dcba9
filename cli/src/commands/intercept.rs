//! Intercept command - connect, intercept, and hold until Ctrl-C.

use anyhow::Result;
use kbridge_core::ReconcileTrigger;
use tracing::{info, warn};

use super::{orchestrator, print_json, status::print_snapshot};

pub async fn run(search: &str, namespace: &str, port: u16, json: bool) -> Result<()> {
    let orchestrator = orchestrator().await?;

    orchestrator.connect(namespace).await?;

    let session = match orchestrator.start(search, port).await {
        Ok(session) => session,
        Err(e) => {
            orchestrator.disconnect().await;
            return Err(e.into());
        }
    };

    if json {
        print_json(&session)?;
    } else {
        println!(
            "Intercepting {} in {} -> localhost:{} (Ctrl-C to stop)",
            session.deployment, session.namespace, session.local_port
        );
    }

    let mut ticker = tokio::time::interval(orchestrator.settings().poll_interval());
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, cleaning up");
                break;
            }
            _ = ticker.tick() => {
                let snapshot = orchestrator.get_formatted_status(ReconcileTrigger::Background).await;
                if orchestrator.get_session(&session.id).is_none() {
                    warn!(deployment = %session.deployment, "Interception ended outside this process");
                    break;
                }
                if !json {
                    print_snapshot(&snapshot);
                }
            }
        }
    }

    if orchestrator.get_session(&session.id).is_some() {
        if let Err(e) = orchestrator.stop(&session.id).await {
            warn!(error = %e, "Stopping the interception failed");
        }
    }
    let report = orchestrator.disconnect().await;

    if json {
        print_json(&report)?;
    } else {
        println!("Stopped {} and disconnected.", session.deployment);
    }
    Ok(())
}
