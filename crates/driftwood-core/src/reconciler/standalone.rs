use super::{Completion, Reconciler, decode, describe, enclosing, encode_body, taint};
use crate::drift::Observation;
use crate::error::{ReconcileError, Result};
use crate::id::ResourceIdentifier;
use crate::resource::{InstanceOf, OnConflict, Phase, ResourceInstance, StandaloneResource};
use crate::timeouts::OperationKind;
use std::marker::PhantomData;
use tracing::{Instrument, info, info_span, warn};

/// Lifecycle operations for a resource that is its own remote object
pub struct StandaloneOps<'a, R> {
    rec: &'a Reconciler,
    _resource: PhantomData<fn() -> R>,
}

impl<'a, R: StandaloneResource> StandaloneOps<'a, R> {
    pub(super) fn new(rec: &'a Reconciler) -> Self {
        Self {
            rec,
            _resource: PhantomData,
        }
    }

    /// Create the remote object described by `config`
    ///
    /// Fails with [`ReconcileError::AlreadyExists`] when the object is
    /// already present, unless `on_conflict` is [`OnConflict::Adopt`].
    pub async fn create(&self, config: &R::Config, on_conflict: OnConflict) -> Result<InstanceOf<R>> {
        R::validate(config)?;
        let id = R::identify(config, self.rec.scope())?;
        let encoded = id.encode();
        let span = info_span!("create", resource_type = R::TYPE_NAME, id = %encoded);
        self.create_inner(id, encoded, config, on_conflict)
            .instrument(span)
            .await
    }

    async fn create_inner(
        &self,
        id: R::Id,
        encoded: String,
        config: &R::Config,
        on_conflict: OnConflict,
    ) -> Result<InstanceOf<R>> {
        let context = describe(R::TYPE_NAME, &encoded);
        let deadline = self.rec.deadline(OperationKind::Create);
        let path = R::path(&id);
        info!(phase = %Phase::Creating, "reconciling");

        let locks = self.rec.lock(R::lock_keys(&id), deadline, &context).await?;

        let remote = match self.rec.fetch(&path, R::API_VERSION, deadline, &context).await? {
            Observation::Gone => R::expand(config)?,
            Observation::Present(existing) => match on_conflict {
                OnConflict::Fail => {
                    return Err(ReconcileError::AlreadyExists {
                        resource_type: R::TYPE_NAME,
                        id: encoded,
                    });
                }
                OnConflict::Adopt => {
                    info!("adopting existing remote object");
                    let mut remote: R::Remote = decode(existing, &context)?;
                    R::patch(&mut remote, config)?;
                    remote
                }
            },
        };

        let body = encode_body(&remote)?;
        if let Completion::Gone = self.rec.put(&path, R::API_VERSION, &body, deadline, &context).await? {
            return Err(ReconcileError::ParentNotFound {
                context,
                parent: enclosing(&path),
            });
        }
        drop(locks);

        let instance = taint(self.read(&id).await, &encoded, &context)?;
        info!(phase = %Phase::Present, "created");
        Ok(instance)
    }

    /// Refresh the instance from the remote object
    ///
    /// `None` means the object no longer exists and should be dropped from
    /// state; a missing object is never reported as an error.
    pub async fn read(&self, id: &R::Id) -> Result<Option<InstanceOf<R>>> {
        let encoded = id.encode();
        let context = describe(R::TYPE_NAME, &encoded);
        let deadline = self.rec.deadline(OperationKind::Read);

        match self.rec.fetch(&R::path(id), R::API_VERSION, deadline, &context).await? {
            Observation::Gone => {
                warn!(resource_type = R::TYPE_NAME, id = %encoded, "{context} was not found - removing from state");
                Ok(None)
            }
            Observation::Present(document) => {
                let remote: R::Remote = decode(document, &context)?;
                Ok(Some(ResourceInstance {
                    id: id.clone(),
                    attributes: R::flatten(id, &remote),
                }))
            }
        }
    }

    /// Apply `config` to an instance created earlier
    pub async fn update(&self, prior: &InstanceOf<R>, config: &R::Config) -> Result<InstanceOf<R>> {
        R::validate(config)?;
        self.rec.ensure_in_place::<R>(&prior.id, &prior.attributes, config)?;
        let encoded = prior.id.encode();
        let span = info_span!("update", resource_type = R::TYPE_NAME, id = %encoded);
        self.update_inner(&prior.id, encoded, config)
            .instrument(span)
            .await
    }

    async fn update_inner(&self, id: &R::Id, encoded: String, config: &R::Config) -> Result<InstanceOf<R>> {
        let context = describe(R::TYPE_NAME, &encoded);
        let deadline = self.rec.deadline(OperationKind::Update);
        let path = R::path(id);
        info!(phase = %Phase::Updating, "reconciling");

        let locks = self.rec.lock(R::lock_keys(id), deadline, &context).await?;

        let mut remote: R::Remote = match self.rec.fetch(&path, R::API_VERSION, deadline, &context).await? {
            Observation::Present(existing) => decode(existing, &context)?,
            Observation::Gone => return Err(ReconcileError::NotFound { context }),
        };
        R::patch(&mut remote, config)?;

        let body = encode_body(&remote)?;
        if let Completion::Gone = self.rec.put(&path, R::API_VERSION, &body, deadline, &context).await? {
            return Err(ReconcileError::NotFound { context });
        }
        drop(locks);

        self.read(id).await?.ok_or(ReconcileError::NotFound { context })
    }

    /// Delete the remote object; deleting an absent object succeeds
    pub async fn delete(&self, id: &R::Id) -> Result<()> {
        let encoded = id.encode();
        let span = info_span!("delete", resource_type = R::TYPE_NAME, id = %encoded);
        self.delete_inner(id, encoded).instrument(span).await
    }

    async fn delete_inner(&self, id: &R::Id, encoded: String) -> Result<()> {
        let context = describe(R::TYPE_NAME, &encoded);
        let deadline = self.rec.deadline(OperationKind::Delete);
        info!(phase = %Phase::Deleting, "reconciling");

        let _locks = self.rec.lock(R::lock_keys(id), deadline, &context).await?;
        match self.rec.remove(&R::path(id), R::API_VERSION, deadline, &context).await {
            Ok(Completion::Finished) => {
                info!(phase = %Phase::Absent, "deleted");
                Ok(())
            }
            Ok(Completion::Gone) => {
                info!("already absent");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                info!(error = %err, "already absent");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Adopt an existing remote object by its encoded identifier
    pub async fn import(&self, raw_id: &str) -> Result<InstanceOf<R>> {
        let id = R::Id::decode(raw_id)?;
        self.read(&id)
            .await?
            .ok_or_else(|| ReconcileError::ImportNotFound {
                resource_type: R::TYPE_NAME,
                id: id.encode(),
            })
    }
}
