//! In-process management API
//!
//! [`MemoryClient`] keeps remote objects in a map keyed by resource path
//! (case-insensitively, like the real API) and can simulate long-running
//! operations, latency and failures. It backs the reconciler tests and the
//! CLI's offline backend.

use crate::client::{ApiError, Lookup, ManagementClient, Submission};
use crate::id::ResourcePath;
use crate::operation::{OperationHandle, OperationStatus};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Kind of management API call, for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Get,
    Put,
    Delete,
    OperationStatus,
}

#[derive(Debug)]
enum Effect {
    Write { path: String, body: Value },
    Remove { path: String },
}

#[derive(Debug)]
struct PendingOperation {
    remaining: u32,
    effect: Effect,
}

#[derive(Debug, Default)]
struct Store {
    /// lowercased path -> (path as written, document)
    objects: BTreeMap<String, (String, Value)>,
    operations: HashMap<String, PendingOperation>,
    failures: VecDeque<(CallKind, ApiError)>,
    calls: Vec<(CallKind, String)>,
    next_operation: u64,
}

impl Store {
    fn contains(&self, path: &str) -> bool {
        self.objects.contains_key(&path.to_ascii_lowercase())
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Write { path, body } => {
                let body = stamp(&path, body);
                self.objects.insert(path.to_ascii_lowercase(), (path, body));
            }
            Effect::Remove { path } => {
                let key = path.to_ascii_lowercase();
                let nested = format!("{key}/");
                self.objects
                    .retain(|k, _| *k != key && !k.starts_with(&nested));
            }
        }
    }

    fn take_failure(&mut self, kind: CallKind) -> Option<ApiError> {
        let index = self.failures.iter().position(|(k, _)| *k == kind)?;
        self.failures.remove(index).map(|(_, err)| err)
    }
}

/// Outcome of long-running operations started by a [`MemoryClient`]
#[derive(Debug, Clone)]
enum OperationMode {
    Synchronous,
    Succeed { polls: u32 },
    Fail { polls: u32, code: String, message: String },
    Hang,
}

/// Management API backed by an in-memory object map
#[derive(Debug)]
pub struct MemoryClient {
    store: Mutex<Store>,
    latency: Duration,
    mode: OperationMode,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            latency: Duration::ZERO,
            mode: OperationMode::Synchronous,
        }
    }

    /// Restore the objects captured by [`MemoryClient::snapshot`]
    pub fn from_snapshot(objects: BTreeMap<String, Value>) -> Self {
        let client = Self::new();
        for (path, body) in objects {
            client.insert(&path, body);
        }
        client
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer mutations with an operation that succeeds after `polls` in-progress polls
    pub fn with_async_operations(mut self, polls: u32) -> Self {
        self.mode = OperationMode::Succeed { polls };
        self
    }

    /// Answer mutations with an operation that fails after `polls` in-progress polls
    pub fn fail_operations(
        mut self,
        polls: u32,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.mode = OperationMode::Fail {
            polls,
            code: code.into(),
            message: message.into(),
        };
        self
    }

    /// Answer mutations with an operation that never finishes
    pub fn with_hanging_operations(mut self) -> Self {
        self.mode = OperationMode::Hang;
        self
    }

    /// Make the next call of `kind` fail with `error`
    pub fn fail_next(&self, kind: CallKind, error: ApiError) {
        self.store().failures.push_back((kind, error));
    }

    /// Store an object directly, bypassing the API
    pub fn insert(&self, path: &str, body: Value) {
        self.store().apply(Effect::Write {
            path: path.to_string(),
            body,
        });
    }

    pub fn object(&self, path: &str) -> Option<Value> {
        self.store()
            .objects
            .get(&path.to_ascii_lowercase())
            .map(|(_, body)| body.clone())
    }

    /// Remove an object directly, as an out-of-band deletion would
    pub fn remove(&self, path: &str) {
        self.store().apply(Effect::Remove {
            path: path.to_string(),
        });
    }

    /// All objects keyed by path
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.store()
            .objects
            .values()
            .map(|(path, body)| (path.clone(), body.clone()))
            .collect()
    }

    /// Number of calls of `kind` made so far
    pub fn calls(&self, kind: CallKind) -> usize {
        self.store().calls.iter().filter(|(k, _)| *k == kind).count()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and pop an injected failure, after the configured latency
    async fn enter(&self, kind: CallKind, path: &str) -> Result<(), ApiError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut store = self.store();
        store.calls.push((kind, path.to_string()));
        match store.take_failure(kind) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn submit(&self, effect: Effect) -> Submission {
        let mut store = self.store();
        let polls = match &self.mode {
            OperationMode::Synchronous => {
                let body = match &effect {
                    Effect::Write { path, body } => Some(stamp(path, body.clone())),
                    Effect::Remove { .. } => None,
                };
                store.apply(effect);
                return Submission::Done(body);
            }
            OperationMode::Succeed { polls } | OperationMode::Fail { polls, .. } => *polls,
            OperationMode::Hang => u32::MAX,
        };

        store.next_operation += 1;
        let id = format!("op-{}", store.next_operation);
        let handle = OperationHandle::new(id.clone(), format!("memory://operations/{id}"));
        store.operations.insert(
            id,
            PendingOperation {
                remaining: polls,
                effect,
            },
        );
        Submission::Accepted(handle)
    }
}

#[async_trait]
impl ManagementClient for MemoryClient {
    async fn get(&self, path: &str, _api_version: &str) -> Result<Lookup<Value>, ApiError> {
        self.enter(CallKind::Get, path).await?;
        Ok(match self.object(path) {
            Some(body) => Lookup::Found(body),
            None => Lookup::NotFound,
        })
    }

    async fn put(&self, path: &str, _api_version: &str, body: &Value) -> Result<Submission, ApiError> {
        self.enter(CallKind::Put, path).await?;
        {
            let store = self.store();
            let orphaned = !store.contains(path)
                && ResourcePath::parse(path)
                    .ok()
                    .and_then(|p| p.parent())
                    .is_some_and(|parent| !store.contains(&parent.to_string()));
            if orphaned {
                return Ok(Submission::NotFound);
            }
        }
        Ok(self.submit(Effect::Write {
            path: path.to_string(),
            body: body.clone(),
        }))
    }

    async fn delete(&self, path: &str, _api_version: &str) -> Result<Submission, ApiError> {
        self.enter(CallKind::Delete, path).await?;
        if !self.store().contains(path) {
            return Ok(Submission::NotFound);
        }
        Ok(self.submit(Effect::Remove {
            path: path.to_string(),
        }))
    }

    async fn operation_status(&self, handle: &OperationHandle) -> Result<OperationStatus, ApiError> {
        self.enter(CallKind::OperationStatus, handle.status_url()).await?;
        let mut store = self.store();
        let Some(pending) = store.operations.get_mut(handle.id()) else {
            return Err(ApiError::not_found(format!(
                "operation {} does not exist",
                handle.id()
            )));
        };
        if pending.remaining > 0 {
            if pending.remaining != u32::MAX {
                pending.remaining -= 1;
            }
            return Ok(OperationStatus::InProgress { retry_after: None });
        }

        let Some(finished) = store.operations.remove(handle.id()) else {
            return Ok(OperationStatus::InProgress { retry_after: None });
        };
        match &self.mode {
            OperationMode::Fail { code, message, .. } => Ok(OperationStatus::Failed {
                code: code.clone(),
                message: message.clone(),
            }),
            _ => {
                store.apply(finished.effect);
                Ok(OperationStatus::Succeeded)
            }
        }
    }
}

/// Fill in the `id` and `name` fields the real API returns
fn stamp(path: &str, mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        map.entry("id").or_insert_with(|| Value::String(path.to_string()));
        if let Some(name) = path.rsplit('/').next() {
            map.entry("name")
                .or_insert_with(|| Value::String(name.to_string()));
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RG: &str = "/subscriptions/sub-1/resourceGroups/rg-1";
    const NIC: &str =
        "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.Network/networkInterfaces/nic-1";

    #[tokio::test]
    async fn test_paths_are_case_insensitive() {
        let client = MemoryClient::new();
        client.insert(RG, json!({"location": "westeurope"}));

        let found = client
            .get(&RG.to_uppercase(), "2020-06-01")
            .await
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(found["location"], "westeurope");
        assert_eq!(found["name"], "rg-1");
        assert_eq!(found["id"], RG);
    }

    #[tokio::test]
    async fn test_put_without_parent_is_not_found() {
        let client = MemoryClient::new();
        let result = client.put(NIC, "v", &json!({})).await.unwrap();
        assert_eq!(result, Submission::NotFound);

        client.insert(RG, json!({}));
        let result = client.put(NIC, "v", &json!({})).await.unwrap();
        assert!(matches!(result, Submission::Done(Some(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_nested_objects() {
        let client = MemoryClient::new();
        client.insert(RG, json!({}));
        client.insert(NIC, json!({}));

        client.delete(RG, "v").await.unwrap();
        assert!(client.object(NIC).is_none());
        assert_eq!(client.delete(RG, "v").await.unwrap(), Submission::NotFound);
    }

    #[tokio::test]
    async fn test_async_operation_applies_on_success() {
        let client = MemoryClient::new().with_async_operations(2);
        client.insert(RG, json!({}));

        let Submission::Accepted(handle) = client.put(NIC, "v", &json!({"a": 1})).await.unwrap()
        else {
            panic!("expected an accepted operation");
        };
        assert!(client.object(NIC).is_none());

        for _ in 0..2 {
            let status = client.operation_status(&handle).await.unwrap();
            assert_eq!(status, OperationStatus::InProgress { retry_after: None });
        }
        let status = client.operation_status(&handle).await.unwrap();
        assert_eq!(status, OperationStatus::Succeeded);
        assert_eq!(client.object(NIC).unwrap()["a"], 1);
        assert_eq!(client.calls(CallKind::OperationStatus), 3);
    }

    #[tokio::test]
    async fn test_failed_operation_leaves_store_untouched() {
        let client = MemoryClient::new().fail_operations(0, "Conflict", "busy");
        client.insert(RG, json!({}));

        let Submission::Accepted(handle) = client.put(NIC, "v", &json!({})).await.unwrap() else {
            panic!("expected an accepted operation");
        };
        let status = client.operation_status(&handle).await.unwrap();
        assert!(matches!(status, OperationStatus::Failed { .. }));
        assert!(client.object(NIC).is_none());
    }

    #[tokio::test]
    async fn test_injected_failure_applies_once() {
        let client = MemoryClient::new();
        client.fail_next(CallKind::Get, ApiError::new(500, "InternalError", "boom"));

        let err = client.get(RG, "v").await.unwrap_err();
        assert_eq!(err.status, 500);
        assert!(client.get(RG, "v").await.is_ok());
        assert_eq!(client.calls(CallKind::Get), 2);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let client = MemoryClient::new();
        client.insert(RG, json!({"location": "westeurope"}));

        let restored = MemoryClient::from_snapshot(client.snapshot());
        assert_eq!(restored.object(RG), client.object(RG));
    }
}
