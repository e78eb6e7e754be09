use crate::utils;
use anyhow::Context;
use colored::Colorize;
use driftwood_core::{
    InstanceState, InstanceStatus, OnConflict, Provider, RawInstance, StateManager, address,
    split_address,
};
use std::path::Path;

fn print_instance(instance: &InstanceState) {
    println!("{} {}", "id:".bold(), instance.id.dimmed());
    utils::print_attributes(&instance.attributes);
}

pub async fn create(
    provider: &Provider,
    project_root: &Path,
    resource_type: &str,
    name: &str,
    config_path: &Path,
    adopt: bool,
) -> anyhow::Result<()> {
    let handler = provider.handler(resource_type)?;
    let config = utils::load_resource_config(config_path)?;
    let address = address(resource_type, name);

    let manager = StateManager::new(project_root);
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;
    if state.instance(&address).is_some() {
        anyhow::bail!("{address} is already managed; use `driftwood update` or delete it first");
    }

    println!("{} {}", "Creating".blue(), address.cyan());
    let on_conflict = if adopt { OnConflict::Adopt } else { OnConflict::Fail };
    let created = match handler.create(config, on_conflict).await {
        Ok(created) => created,
        Err(err) => {
            // the remote object exists, so it has to be tracked for replacement
            if let Some(id) = err.tainted_id() {
                let instance = InstanceState::new(id, resource_type).with_status(InstanceStatus::Tainted);
                state.set_instance(address.clone(), instance);
                manager.save(&state).await?;
                eprintln!("{} {} was recorded as tainted", "⚠".yellow(), address);
            }
            return Err(err).with_context(|| format!("Failed to create {address}"));
        }
    };

    let instance = InstanceState::new(created.id, resource_type).with_attributes(created.attributes);
    print_instance(&instance);
    state.set_instance(address.clone(), instance);
    manager.save(&state).await?;
    lock.release().await?;

    println!("{} {}", "✓ Created".green(), address);
    Ok(())
}

pub async fn read(provider: &Provider, project_root: &Path, address: &str) -> anyhow::Result<()> {
    let (resource_type, _) = split_address(address)?;
    let handler = provider.handler(resource_type)?;

    let manager = StateManager::new(project_root);
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;
    let Some(instance) = state.instance_mut(address) else {
        anyhow::bail!("{address} is not in state");
    };

    match handler.read(&instance.id).await? {
        Some(current) => {
            instance.set_attributes(current.attributes);
            print_instance(instance);
        }
        None => {
            state.remove_instance(address);
            println!(
                "{} {} no longer exists and was removed from state",
                "⚠".yellow(),
                address
            );
        }
    }
    manager.save(&state).await?;
    lock.release().await?;
    Ok(())
}

pub async fn update(
    provider: &Provider,
    project_root: &Path,
    address: &str,
    config_path: &Path,
) -> anyhow::Result<()> {
    let (resource_type, _) = split_address(address)?;
    let handler = provider.handler(resource_type)?;
    let config = utils::load_resource_config(config_path)?;

    let manager = StateManager::new(project_root);
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;
    let Some(instance) = state.instance_mut(address) else {
        anyhow::bail!("{address} is not in state");
    };
    if instance.status == InstanceStatus::Tainted {
        anyhow::bail!("{address} is tainted; delete and re-create it");
    }

    println!("{} {}", "Updating".blue(), address.cyan());
    let prior = RawInstance {
        id: instance.id.clone(),
        attributes: instance.attributes_value(),
    };
    let updated = handler
        .update(&prior, config)
        .await
        .with_context(|| format!("Failed to update {address}"))?;
    instance.set_attributes(updated.attributes);
    print_instance(instance);

    manager.save(&state).await?;
    lock.release().await?;
    println!("{} {}", "✓ Updated".green(), address);
    Ok(())
}

pub async fn delete(provider: &Provider, project_root: &Path, address: &str) -> anyhow::Result<()> {
    let (resource_type, _) = split_address(address)?;
    let handler = provider.handler(resource_type)?;

    let manager = StateManager::new(project_root);
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;
    let Some(instance) = state.instance(address) else {
        anyhow::bail!("{address} is not in state");
    };

    println!("{} {}", "Deleting".blue(), address.cyan());
    handler
        .delete(&instance.id)
        .await
        .with_context(|| format!("Failed to delete {address}"))?;
    state.remove_instance(address);

    manager.save(&state).await?;
    lock.release().await?;
    println!("{} {}", "✓ Deleted".green(), address);
    Ok(())
}

pub async fn import(
    provider: &Provider,
    project_root: &Path,
    resource_type: &str,
    name: &str,
    id: &str,
) -> anyhow::Result<()> {
    let handler = provider.handler(resource_type)?;
    let address = address(resource_type, name);

    let manager = StateManager::new(project_root);
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;
    if state.instance(&address).is_some() {
        anyhow::bail!("{address} is already managed");
    }

    println!("{} {}", "Importing".blue(), id.dimmed());
    let imported = handler
        .import(id)
        .await
        .with_context(|| format!("Failed to import {address}"))?;
    let instance = InstanceState::new(imported.id, resource_type).with_attributes(imported.attributes);
    print_instance(&instance);
    state.set_instance(address.clone(), instance);

    manager.save(&state).await?;
    lock.release().await?;
    println!("{} {}", "✓ Imported".green(), address);
    Ok(())
}
