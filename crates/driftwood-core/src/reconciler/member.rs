use super::{Completion, Reconciler, decode, describe, encode_body, taint};
use crate::drift::Observation;
use crate::error::{ReconcileError, Result};
use crate::id::ResourceIdentifier;
use crate::resource::{InstanceOf, MemberResource, OnConflict, Phase, ResourceInstance};
use crate::timeouts::{Deadline, OperationKind};
use std::marker::PhantomData;
use tracing::{Instrument, debug, info, info_span, warn};

/// Lifecycle operations for a resource kept inside a parent object
///
/// Every mutation reads the whole parent, changes this resource's element
/// and writes the parent back while holding the resource's locks, so
/// concurrent mutations of siblings never overwrite each other.
pub struct MemberOps<'a, R> {
    rec: &'a Reconciler,
    _resource: PhantomData<fn() -> R>,
}

impl<'a, R: MemberResource> MemberOps<'a, R> {
    pub(super) fn new(rec: &'a Reconciler) -> Self {
        Self {
            rec,
            _resource: PhantomData,
        }
    }

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
        let parent_path = R::parent_path(&id);
        info!(phase = %Phase::Creating, "reconciling");

        let locks = self.rec.lock(R::lock_keys(&id), deadline, &context).await?;

        let Some(mut parent) = self.load_parent(&parent_path, deadline, &context).await? else {
            return Err(self.parent_missing(&parent_path, context));
        };

        // checked under the lock so a concurrent create cannot slip in between
        if R::find(&parent, &id).is_some() {
            match on_conflict {
                OnConflict::Fail => {
                    return Err(ReconcileError::AlreadyExists {
                        resource_type: R::TYPE_NAME,
                        id: encoded,
                    });
                }
                OnConflict::Adopt => {
                    info!("adopting existing element");
                    R::replace(&mut parent, &id, config)?;
                }
            }
        } else {
            R::insert(&mut parent, &id, config)?;
        }

        if let Completion::Gone = self.store_parent(&parent_path, &parent, deadline, &context).await? {
            return Err(self.parent_missing(&parent_path, context));
        }
        drop(locks);

        let instance = taint(self.read(&id).await, &encoded, &context)?;
        info!(phase = %Phase::Present, "created");
        Ok(instance)
    }

    /// Refresh the instance from its parent
    ///
    /// A missing parent or a missing element both yield `None`.
    pub async fn read(&self, id: &R::Id) -> Result<Option<InstanceOf<R>>> {
        let encoded = id.encode();
        let context = describe(R::TYPE_NAME, &encoded);
        let deadline = self.rec.deadline(OperationKind::Read);
        let parent_path = R::parent_path(id);

        let Some(parent) = self.load_parent(&parent_path, deadline, &context).await? else {
            warn!(
                resource_type = R::TYPE_NAME,
                id = %encoded,
                "{} {parent_path:?} was not found - removing {context} from state",
                R::PARENT_KIND
            );
            return Ok(None);
        };

        match R::find(&parent, id) {
            Some(attributes) => Ok(Some(ResourceInstance {
                id: id.clone(),
                attributes,
            })),
            None => {
                warn!(resource_type = R::TYPE_NAME, id = %encoded, "{context} was not found - removing from state");
                Ok(None)
            }
        }
    }

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
        let parent_path = R::parent_path(id);
        info!(phase = %Phase::Updating, "reconciling");

        let locks = self.rec.lock(R::lock_keys(id), deadline, &context).await?;

        let Some(mut parent) = self.load_parent(&parent_path, deadline, &context).await? else {
            return Err(self.parent_missing(&parent_path, context));
        };
        if !R::replace(&mut parent, id, config)? {
            return Err(ReconcileError::NotFound { context });
        }

        if let Completion::Gone = self.store_parent(&parent_path, &parent, deadline, &context).await? {
            return Err(self.parent_missing(&parent_path, context));
        }
        drop(locks);

        self.read(id).await?.ok_or(ReconcileError::NotFound { context })
    }

    /// Remove the element; an absent element or parent counts as deleted
    pub async fn delete(&self, id: &R::Id) -> Result<()> {
        let encoded = id.encode();
        let span = info_span!("delete", resource_type = R::TYPE_NAME, id = %encoded);
        self.delete_inner(id, encoded).instrument(span).await
    }

    async fn delete_inner(&self, id: &R::Id, encoded: String) -> Result<()> {
        let context = describe(R::TYPE_NAME, &encoded);
        let deadline = self.rec.deadline(OperationKind::Delete);
        let parent_path = R::parent_path(id);
        info!(phase = %Phase::Deleting, "reconciling");

        let _locks = self.rec.lock(R::lock_keys(id), deadline, &context).await?;

        let Some(mut parent) = self.load_parent(&parent_path, deadline, &context).await? else {
            info!(parent = %parent_path, "parent already absent");
            return Ok(());
        };
        if !R::remove(&mut parent, id) {
            info!("already absent");
            return Ok(());
        }

        match self.store_parent(&parent_path, &parent, deadline, &context).await {
            Ok(Completion::Finished) => {
                info!(phase = %Phase::Absent, "deleted");
                Ok(())
            }
            Ok(Completion::Gone) => {
                info!(parent = %parent_path, "parent disappeared during delete");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                info!(error = %err, "already absent");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn import(&self, raw_id: &str) -> Result<InstanceOf<R>> {
        let id = R::Id::decode(raw_id)?;
        self.read(&id)
            .await?
            .ok_or_else(|| ReconcileError::ImportNotFound {
                resource_type: R::TYPE_NAME,
                id: id.encode(),
            })
    }

    async fn load_parent(
        &self,
        parent_path: &str,
        deadline: Deadline,
        context: &str,
    ) -> Result<Option<R::Parent>> {
        match self.rec.fetch(parent_path, R::API_VERSION, deadline, context).await? {
            Observation::Present(document) => {
                debug!(parent = parent_path, "loaded parent");
                Ok(Some(decode(document, context)?))
            }
            Observation::Gone => Ok(None),
        }
    }

    async fn store_parent(
        &self,
        parent_path: &str,
        parent: &R::Parent,
        deadline: Deadline,
        context: &str,
    ) -> Result<Completion> {
        let body = encode_body(parent)?;
        self.rec
            .put(parent_path, R::API_VERSION, &body, deadline, context)
            .await
    }

    fn parent_missing(&self, parent_path: &str, context: String) -> ReconcileError {
        ReconcileError::ParentNotFound {
            context,
            parent: format!("{} {parent_path:?}", R::PARENT_KIND),
        }
    }
}
