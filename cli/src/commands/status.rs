//! Status command - reconcile and show interceptions.

use anyhow::Result;
use kbridge_core::{ReconcileTrigger, RecordStatus, StatusSnapshot};

use super::{orchestrator, print_json, truncate};

pub async fn run(namespace: Option<&str>, json: bool) -> Result<()> {
    let orchestrator = orchestrator().await?;
    let mut snapshot = orchestrator.get_formatted_status(ReconcileTrigger::User).await;

    if let Some(namespace) = namespace {
        snapshot.interceptions.retain(|r| r.namespace == namespace);
    }

    if json {
        return print_json(&snapshot);
    }

    print_snapshot(&snapshot);
    Ok(())
}

pub fn print_snapshot(snapshot: &StatusSnapshot) {
    let namespace = snapshot
        .namespace_connection
        .as_ref()
        .map(|c| c.namespace.as_str())
        .unwrap_or("-");
    println!(
        "Connection: {} (namespace {}, daemon {})",
        snapshot.connection_status, namespace, snapshot.daemon_status
    );
    if let Some(error) = &snapshot.error {
        println!("Error: {}", error);
    }

    if snapshot.interceptions.is_empty() {
        println!("No deployments reported.");
        return;
    }

    // Table header
    println!(
        "\n{:<40} {:<12} {:<15} {:<11} {:<8}",
        "DEPLOYMENT", "STATUS", "CLUSTER IP", "PORTS", "REPLICAS"
    );
    println!("{}", "-".repeat(90));

    for record in &snapshot.interceptions {
        let status = match record.status {
            RecordStatus::Intercepted => "intercepted",
            RecordStatus::Available => "available",
            RecordStatus::Error => "error",
        };
        let ports = match (record.local_port, record.target_port) {
            (Some(local), Some(target)) => format!("{}->{}", target, local),
            (Some(local), None) => local.to_string(),
            _ => "-".to_string(),
        };
        let replicas = record
            .replicas
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<40} {:<12} {:<15} {:<11} {:<8}",
            truncate(&record.deployment, 40),
            status,
            record.cluster_ip.as_deref().unwrap_or("-"),
            ports,
            replicas
        );
    }

    println!("\nIntercepted: {}", snapshot.intercepted().count());
}
