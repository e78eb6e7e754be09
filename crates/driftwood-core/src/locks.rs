//! Named lock registry
//!
//! Mutations of a shared parent object (a network interface, an IoT Hub)
//! are read-modify-write cycles over the whole parent document. Two
//! resources touching the same parent must therefore hold the same named
//! lock for the entire cycle. The registry is an injected service:
//! every [`crate::Reconciler`] shares one, tests create their own.

use crate::error::{ReconcileError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Category of locked object
///
/// Locks are always taken in ascending `rank` order, so that resources
/// locking overlapping parents (virtual network, then subnet, then the
/// target) can never deadlock each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKind {
    rank: u16,
    name: &'static str,
}

impl LockKind {
    pub const fn new(name: &'static str, rank: u16) -> Self {
        Self { rank, name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rank(&self) -> u16 {
        self.rank
    }
}

impl std::fmt::Display for LockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A (kind, name) pair identifying one lock
///
/// Names are folded to lower case, as the management API treats them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    kind: LockKind,
    name: String,
}

impl LockKey {
    pub fn new(kind: LockKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into().to_ascii_lowercase(),
        }
    }

    pub fn kind(&self) -> LockKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

type Entry = Arc<AsyncMutex<()>>;

/// Process-wide table of named locks
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    entries: Arc<Mutex<HashMap<LockKey, Entry>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a logical operation that may hold several locks
    pub fn scope(&self) -> LockScope {
        LockScope {
            registry: self.clone(),
            held: BTreeMap::new(),
        }
    }

    /// Number of locks currently held or waited on
    pub fn len(&self) -> usize {
        self.table()
            .values()
            .filter(|entry| Arc::strong_count(entry) > 1)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether some scope currently holds the lock
    pub fn is_locked(&self, kind: LockKind, name: &str) -> bool {
        let key = LockKey::new(kind, name);
        let table = self.table();
        match table.get(&key) {
            Some(entry) => entry.try_lock().is_err(),
            None => false,
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<LockKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, key: &LockKey) -> Entry {
        self.table().entry(key.clone()).or_default().clone()
    }

    /// Drop entries nobody holds or waits on
    fn prune(&self) {
        self.table().retain(|_, entry| Arc::strong_count(entry) > 1);
    }
}

struct Held {
    count: usize,
    _guard: OwnedMutexGuard<()>,
}

/// Locks held by one logical operation
///
/// Re-acquiring a key the scope already holds only bumps a counter, so
/// nested helpers of the same operation never deadlock on each other.
/// Everything still held is released when the scope is dropped, on every
/// exit path.
pub struct LockScope {
    registry: LockRegistry,
    held: BTreeMap<LockKey, Held>,
}

impl LockScope {
    pub async fn acquire(&mut self, kind: LockKind, name: impl Into<String>) -> Result<()> {
        self.acquire_key(LockKey::new(kind, name)).await
    }

    /// Acquire `keys` in canonical order
    pub async fn acquire_all(&mut self, keys: impl IntoIterator<Item = LockKey>) -> Result<()> {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        for key in keys {
            self.acquire_key(key).await?;
        }
        Ok(())
    }

    pub async fn acquire_key(&mut self, key: LockKey) -> Result<()> {
        if let Some(held) = self.held.get_mut(&key) {
            held.count += 1;
            return Ok(());
        }
        self.check_order(&key)?;

        tracing::debug!(lock = %key, "acquiring lock");
        let guard = self.registry.entry(&key).lock_owned().await;
        tracing::debug!(lock = %key, "acquired lock");
        self.held.insert(key, Held { count: 1, _guard: guard });
        Ok(())
    }

    /// Acquire without waiting; `Ok(false)` when another scope holds the lock
    pub fn try_acquire(&mut self, kind: LockKind, name: impl Into<String>) -> Result<bool> {
        let key = LockKey::new(kind, name);
        if let Some(held) = self.held.get_mut(&key) {
            held.count += 1;
            return Ok(true);
        }
        self.check_order(&key)?;

        match self.registry.entry(&key).try_lock_owned() {
            Ok(guard) => {
                self.held.insert(key, Held { count: 1, _guard: guard });
                Ok(true)
            }
            Err(_) => {
                self.registry.prune();
                Ok(false)
            }
        }
    }

    /// Release one acquisition; releasing a key that is not held does nothing
    pub fn release(&mut self, kind: LockKind, name: &str) {
        let key = LockKey::new(kind, name);
        let Some(held) = self.held.get_mut(&key) else {
            return;
        };
        held.count -= 1;
        if held.count == 0 {
            self.held.remove(&key);
            self.registry.prune();
            tracing::debug!(lock = %key, "released lock");
        }
    }

    pub fn holds(&self, kind: LockKind, name: &str) -> bool {
        self.held.contains_key(&LockKey::new(kind, name))
    }

    pub fn held_keys(&self) -> impl Iterator<Item = &LockKey> {
        self.held.keys()
    }

    fn check_order(&self, key: &LockKey) -> Result<()> {
        match self.held.last_key_value() {
            Some((highest, _)) if key < highest => Err(ReconcileError::LockOrder {
                requested: key.to_string(),
                held: highest.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl Drop for LockScope {
    fn drop(&mut self) {
        // also prunes entries left behind by a wait that was abandoned
        self.held.clear();
        self.registry.prune();
    }
}
