use crate::utils;
use colored::Colorize;
use driftwood_core::{InstanceStatus, StateManager};
use std::path::Path;

pub async fn list(project_root: &Path) -> anyhow::Result<()> {
    let state = StateManager::new(project_root).load().await?;
    if state.instances.is_empty() {
        println!("{}", "No managed instances".dimmed());
        return Ok(());
    }

    println!("{}", format!("{:<50} {:<10} {}", "ADDRESS", "STATUS", "ID").bold());
    for (address, instance) in &state.instances {
        let status = match instance.status {
            InstanceStatus::Present => instance.status.to_string().green(),
            InstanceStatus::Tainted => instance.status.to_string().yellow(),
        };
        println!("{:<50} {:<10} {}", address, status, instance.id.dimmed());
    }
    Ok(())
}

pub async fn show(project_root: &Path, address: &str) -> anyhow::Result<()> {
    let state = StateManager::new(project_root).load().await?;
    let Some(instance) = state.instance(address) else {
        anyhow::bail!("{address} is not in state");
    };

    println!("{}", address.bold());
    println!("  {} {}", "type:".dimmed(), instance.resource_type);
    println!("  {} {}", "status:".dimmed(), instance.status);
    println!("  {} {}", "id:".dimmed(), instance.id);
    println!("  {} {}", "updated:".dimmed(), instance.updated_at.to_rfc3339());
    utils::print_attributes(&instance.attributes);
    Ok(())
}
