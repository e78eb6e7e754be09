//! Persisted instance state
//!
//! Manages the `.driftwood/state.json` file recording every instance the
//! host manages: its identifier, last-read attributes and whether it is
//! tainted.

use crate::error::{ReconcileError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
pub const STATE_DIR: &str = ".driftwood";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Address of an instance in state, `<type>.<name>`
pub fn address(resource_type: &str, name: &str) -> String {
    format!("{resource_type}.{name}")
}

/// Split an address into resource type and name
pub fn split_address(address: &str) -> Result<(&str, &str)> {
    match address.split_once('.') {
        Some((resource_type, name)) if !resource_type.is_empty() && !name.is_empty() => {
            Ok((resource_type, name))
        }
        _ => Err(ReconcileError::InvalidConfig(format!(
            "invalid address {address:?}: expected <type>.<name>"
        ))),
    }
}

/// All managed instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Instances indexed by address
    pub instances: BTreeMap<String, InstanceState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            instances: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update an instance
    pub fn set_instance(&mut self, address: String, instance: InstanceState) {
        self.instances.insert(address, instance);
        self.updated_at = Utc::now();
    }

    pub fn remove_instance(&mut self, address: &str) -> Option<InstanceState> {
        let result = self.instances.remove(address);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    pub fn instance(&self, address: &str) -> Option<&InstanceState> {
        self.instances.get(address)
    }

    pub fn instance_mut(&mut self, address: &str) -> Option<&mut InstanceState> {
        self.instances.get_mut(address)
    }
}

/// State of a single instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceState {
    /// Encoded resource identifier
    pub id: String,

    pub resource_type: String,

    pub status: InstanceStatus,

    /// Attributes as last read
    pub attributes: BTreeMap<String, Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl InstanceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: InstanceStatus::Present,
            attributes: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = status;
        self
    }

    /// Replace the attributes with the fields of a JSON object
    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.set_attributes(attributes);
        self
    }

    pub fn set_attributes(&mut self, attributes: Value) {
        self.attributes = match attributes {
            Value::Object(map) => map.into_iter().collect(),
            Value::Null => BTreeMap::new(),
            other => BTreeMap::from([("value".to_string(), other)]),
        };
        self.updated_at = Utc::now();
    }

    /// Attributes as a JSON object
    pub fn attributes_value(&self) -> Value {
        Value::Object(self.attributes.clone().into_iter().collect())
    }

    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Status of a managed instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Created and readable
    Present,
    /// Created, but the read that should follow failed; must be replaced
    Tainted,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Present => write!(f, "present"),
            InstanceStatus::Tainted => write!(f, "tainted"),
        }
    }
}

/// Reads and writes the state file
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(ReconcileError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} instances", state.instances.len());
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!("Saved state with {} instances", state.instances.len());
        Ok(())
    }

    /// Acquire the advisory lock for exclusive access
    ///
    /// A lock older than one hour is considered stale and replaced.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(ReconcileError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
