//! Management API backends

use anyhow::Context;
use clap::ValueEnum;
use driftwood_arm::{ArmClient, ArmConfig};
use driftwood_config::ProviderConfig;
use driftwood_core::state::STATE_DIR;
use driftwood_core::{ManagementClient, MemoryClient, Provider, ProviderScope, Reconciler};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const MEMORY_FILE: &str = "memory.json";
const MEMORY_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Azure Resource Manager over HTTPS
    Arm,
    /// Offline API persisted in .driftwood/memory.json
    Memory,
}

/// A provider wired to one backend for the duration of a command
pub struct Session {
    provider: Provider,
    memory: Option<(Arc<MemoryClient>, PathBuf)>,
}

impl Session {
    pub async fn open(
        kind: BackendKind,
        project_root: &Path,
        stop: CancellationToken,
    ) -> anyhow::Result<Self> {
        let config = ProviderConfig::discover().context("Failed to load provider configuration")?;

        let (client, scope, memory): (Arc<dyn ManagementClient>, ProviderScope, _) = match kind {
            BackendKind::Arm => {
                let scope = config.scope()?;
                let arm = ArmClient::new(ArmConfig::from_provider(&config)?)?;
                tracing::debug!(endpoint = arm.endpoint(), "using ARM backend");
                let client: Arc<dyn ManagementClient> = Arc::new(arm);
                (client, scope, None)
            }
            BackendKind::Memory => {
                let path = project_root.join(STATE_DIR).join(MEMORY_FILE);
                let memory = Arc::new(MemoryClient::from_snapshot(load_snapshot(&path).await?));
                tracing::debug!(path = %path.display(), "using memory backend");
                let scope = ProviderScope::new(
                    config
                        .subscription_id
                        .clone()
                        .unwrap_or_else(|| MEMORY_SUBSCRIPTION.to_string()),
                );
                let client: Arc<dyn ManagementClient> = memory.clone();
                (client, scope, Some((memory, path)))
            }
        };

        let reconciler = Reconciler::new(client, scope)
            .with_timeouts(config.timeouts())
            .with_poll_config(config.poll_config())
            .with_stop_token(stop);

        Ok(Self {
            provider: driftwood_resources::provider(Arc::new(reconciler)),
            memory,
        })
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Persist the memory backend's objects
    pub async fn close(self) -> anyhow::Result<()> {
        let Some((memory, path)) = self.memory else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let content = serde_json::to_string_pretty(&memory.snapshot())?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

async fn load_snapshot(path: &Path) -> anyhow::Result<BTreeMap<String, Value>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not a valid snapshot", path.display()))
}
