//! Read-only cluster queries.

use anyhow::Result;

use super::{orchestrator, print_json, truncate};

pub async fn namespaces(json: bool) -> Result<()> {
    let namespaces = orchestrator().await?.list_namespaces().await?;

    if json {
        return print_json(&namespaces);
    }

    for namespace in &namespaces {
        println!("{}", namespace);
    }
    Ok(())
}

pub async fn deployments(namespace: &str, json: bool) -> Result<()> {
    let deployments = orchestrator().await?.list_deployments(namespace).await?;

    if json {
        return print_json(&deployments);
    }

    if deployments.is_empty() {
        println!("No deployments found in namespace '{}'.", namespace);
        return Ok(());
    }

    println!("{:<40} {:<9} READY", "NAME", "REPLICAS");
    println!("{}", "-".repeat(56));
    for deployment in &deployments {
        println!(
            "{:<40} {:<9} {}",
            truncate(&deployment.name, 40),
            deployment.replicas,
            deployment.ready_replicas
        );
    }

    println!("\nTotal: {} deployments", deployments.len());
    Ok(())
}
