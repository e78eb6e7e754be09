//! Create / Read / Update / Delete reconciliation
//!
//! [`Reconciler`] owns the collaborators every lifecycle operation needs:
//! the management client, the lock registry, the poller, per-kind timeouts
//! and the stop token. The operations themselves live in
//! [`StandaloneOps`] and [`MemberOps`], one per resource placement.

mod member;
mod standalone;

pub use member::MemberOps;
pub use standalone::StandaloneOps;

use crate::client::{ManagementClient, Submission};
use crate::drift::{Observation, observe};
use crate::error::{ReconcileError, Result};
use crate::id::{ResourceIdentifier, ResourcePath};
use crate::locks::{LockKey, LockRegistry, LockScope};
use crate::operation::PollConfig;
use crate::poller::Poller;
use crate::resource::{MemberResource, ProviderScope, Resource, StandaloneResource};
use crate::timeouts::{Deadline, OperationKind, Timeouts};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Reconciles declared configuration against the management API
pub struct Reconciler {
    client: Arc<dyn ManagementClient>,
    scope: ProviderScope,
    locks: LockRegistry,
    poller: Poller,
    timeouts: Timeouts,
    stop: CancellationToken,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ManagementClient>, scope: ProviderScope) -> Self {
        Self {
            client,
            scope,
            locks: LockRegistry::new(),
            poller: Poller::default(),
            timeouts: Timeouts::default(),
            stop: CancellationToken::new(),
        }
    }

    /// Share a lock registry with other reconcilers
    pub fn with_locks(mut self, locks: LockRegistry) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_poll_config(mut self, config: PollConfig) -> Self {
        self.poller = Poller::new(config);
        self
    }

    /// Token whose cancellation aborts every in-flight operation
    pub fn with_stop_token(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn scope(&self) -> &ProviderScope {
        &self.scope
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    pub fn standalone<R: StandaloneResource>(&self) -> StandaloneOps<'_, R> {
        StandaloneOps::new(self)
    }

    pub fn member<R: MemberResource>(&self) -> MemberOps<'_, R> {
        MemberOps::new(self)
    }

    fn deadline(&self, kind: OperationKind) -> Deadline {
        Deadline::after(self.timeouts.for_kind(kind))
    }

    /// Run `fut` within `deadline`, aborting on the stop token
    async fn bounded<T, F>(&self, deadline: Deadline, context: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => Err(ReconcileError::Cancelled {
                context: context.to_string(),
            }),
            _ = tokio::time::sleep_until(deadline.instant()) => Err(ReconcileError::Timeout {
                context: context.to_string(),
                after: deadline.budget(),
            }),
            result = fut => result,
        }
    }

    async fn lock(
        &self,
        keys: Vec<LockKey>,
        deadline: Deadline,
        context: &str,
    ) -> Result<LockScope> {
        let mut scope = self.locks.scope();
        self.bounded(deadline, context, scope.acquire_all(keys)).await?;
        Ok(scope)
    }

    async fn fetch(
        &self,
        path: &str,
        api_version: &str,
        deadline: Deadline,
        context: &str,
    ) -> Result<Observation<Value>> {
        tracing::debug!(path, "GET");
        self.bounded(deadline, context, async {
            observe(self.client.get(path, api_version).await, context)
        })
        .await
    }

    async fn put(
        &self,
        path: &str,
        api_version: &str,
        body: &Value,
        deadline: Deadline,
        context: &str,
    ) -> Result<Completion> {
        tracing::debug!(path, "PUT");
        let submission = self
            .bounded(deadline, context, async {
                self.client
                    .put(path, api_version, body)
                    .await
                    .map_err(|source| remote(context, source))
            })
            .await?;
        self.settle(submission, deadline, context).await
    }

    async fn remove(
        &self,
        path: &str,
        api_version: &str,
        deadline: Deadline,
        context: &str,
    ) -> Result<Completion> {
        tracing::debug!(path, "DELETE");
        let submission = self
            .bounded(deadline, context, async {
                self.client
                    .delete(path, api_version)
                    .await
                    .map_err(|source| remote(context, source))
            })
            .await?;
        self.settle(submission, deadline, context).await
    }

    async fn settle(
        &self,
        submission: Submission,
        deadline: Deadline,
        context: &str,
    ) -> Result<Completion> {
        match submission {
            Submission::Done(_) => Ok(Completion::Finished),
            Submission::NotFound => Ok(Completion::Gone),
            Submission::Accepted(handle) => {
                tracing::debug!(operation = handle.id(), "waiting for long-running operation");
                self.poller
                    .wait(self.client.as_ref(), handle, deadline, &self.stop, context)
                    .await?;
                Ok(Completion::Finished)
            }
        }
    }

    /// Reject updates that cannot be applied in place
    fn ensure_in_place<R: Resource>(
        &self,
        prior_id: &R::Id,
        prior: &R::Attributes,
        config: &R::Config,
    ) -> Result<()> {
        let replacement = |reason: String| ReconcileError::RequiresReplacement {
            resource_type: R::TYPE_NAME,
            id: prior_id.encode(),
            reason,
        };

        // ARM names are case-insensitive
        let next = R::identify(config, &self.scope)?;
        if !next.encode().eq_ignore_ascii_case(&prior_id.encode()) {
            return Err(replacement(format!(
                "identifier would change to {:?}",
                next.encode()
            )));
        }
        if !R::supports_update() {
            return Err(replacement("in-place update is not supported".to_string()));
        }
        if let Some(reason) = R::requires_replacement(prior, config) {
            return Err(replacement(reason));
        }
        Ok(())
    }
}

/// How a submitted mutation ended
enum Completion {
    Finished,
    /// The target or its scope does not exist
    Gone,
}

fn remote(context: &str, source: crate::client::ApiError) -> ReconcileError {
    ReconcileError::Remote {
        context: context.to_string(),
        source,
    }
}

fn describe(resource_type: &str, id: &str) -> String {
    format!("{resource_type} {id:?}")
}

fn decode<T: DeserializeOwned>(value: Value, context: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|source| ReconcileError::MalformedResponse {
        context: context.to_string(),
        source,
    })
}

fn encode_body<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Path of the object enclosing `path`, for error messages
fn enclosing(path: &str) -> String {
    ResourcePath::parse(path)
        .ok()
        .and_then(|p| p.parent())
        .map(|p| p.to_string())
        .unwrap_or_else(|| path.to_string())
}

/// Turn the read that follows a successful write into the created instance
///
/// The identifier is already fixed at this point, so any failure is
/// reported as tainted rather than lost.
fn taint<T>(read: Result<Option<T>>, id: &str, context: &str) -> Result<T> {
    match read {
        Ok(Some(instance)) => Ok(instance),
        Ok(None) => Err(ReconcileError::Tainted {
            id: id.to_string(),
            source: Box::new(ReconcileError::NotFound {
                context: context.to_string(),
            }),
        }),
        Err(source) => Err(ReconcileError::Tainted {
            id: id.to_string(),
            source: Box::new(source),
        }),
    }
}
