//! Host-facing resource handlers
//!
//! The host works with JSON configuration and attributes. A
//! [`ResourceHandler`] converts at that boundary once and dispatches to the
//! typed operations of the [`Reconciler`]; [`Provider`] maps resource type
//! names to handlers.

use crate::error::{ReconcileError, Result};
use crate::id::ResourceIdentifier;
use crate::reconciler::Reconciler;
use crate::resource::{InstanceOf, MemberResource, OnConflict, Resource, ResourceInstance, StandaloneResource};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// An instance in host representation
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstance {
    pub id: String,
    pub attributes: Value,
}

/// CRUD entry points for one resource type, in host representation
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn resource_type(&self) -> &'static str;

    async fn create(&self, config: Value, on_conflict: OnConflict) -> Result<RawInstance>;

    /// `None` when the remote object is gone and should leave state
    async fn read(&self, id: &str) -> Result<Option<RawInstance>>;

    async fn update(&self, prior: &RawInstance, config: Value) -> Result<RawInstance>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn import(&self, id: &str) -> Result<RawInstance>;
}

fn parse_config<T: DeserializeOwned>(resource_type: &str, config: Value) -> Result<T> {
    serde_json::from_value(config)
        .map_err(|err| ReconcileError::InvalidConfig(format!("{resource_type}: {err}")))
}

fn parse_prior<R: Resource>(prior: &RawInstance) -> Result<InstanceOf<R>> {
    let id = R::Id::decode(&prior.id)?;
    let attributes = serde_json::from_value(prior.attributes.clone()).map_err(|err| {
        ReconcileError::StateError(format!(
            "stored attributes of {} {:?} are unreadable: {err}",
            R::TYPE_NAME,
            prior.id
        ))
    })?;
    Ok(ResourceInstance { id, attributes })
}

fn raw<R: Resource>(instance: InstanceOf<R>) -> Result<RawInstance> {
    Ok(RawInstance {
        id: instance.id.encode(),
        attributes: serde_json::to_value(&instance.attributes)?,
    })
}

/// Handler for a [`StandaloneResource`]
pub struct StandaloneHandler<R> {
    reconciler: Arc<Reconciler>,
    _resource: PhantomData<fn() -> R>,
}

impl<R: StandaloneResource> StandaloneHandler<R> {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            _resource: PhantomData,
        }
    }
}

#[async_trait]
impl<R: StandaloneResource> ResourceHandler for StandaloneHandler<R> {
    fn resource_type(&self) -> &'static str {
        R::TYPE_NAME
    }

    async fn create(&self, config: Value, on_conflict: OnConflict) -> Result<RawInstance> {
        let config: R::Config = parse_config(R::TYPE_NAME, config)?;
        raw::<R>(self.reconciler.standalone::<R>().create(&config, on_conflict).await?)
    }

    async fn read(&self, id: &str) -> Result<Option<RawInstance>> {
        let id = R::Id::decode(id)?;
        match self.reconciler.standalone::<R>().read(&id).await? {
            Some(instance) => Ok(Some(raw::<R>(instance)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, prior: &RawInstance, config: Value) -> Result<RawInstance> {
        let prior = parse_prior::<R>(prior)?;
        let config: R::Config = parse_config(R::TYPE_NAME, config)?;
        raw::<R>(self.reconciler.standalone::<R>().update(&prior, &config).await?)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = R::Id::decode(id)?;
        self.reconciler.standalone::<R>().delete(&id).await
    }

    async fn import(&self, id: &str) -> Result<RawInstance> {
        raw::<R>(self.reconciler.standalone::<R>().import(id).await?)
    }
}

/// Handler for a [`MemberResource`]
pub struct MemberHandler<R> {
    reconciler: Arc<Reconciler>,
    _resource: PhantomData<fn() -> R>,
}

impl<R: MemberResource> MemberHandler<R> {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            _resource: PhantomData,
        }
    }
}

#[async_trait]
impl<R: MemberResource> ResourceHandler for MemberHandler<R> {
    fn resource_type(&self) -> &'static str {
        R::TYPE_NAME
    }

    async fn create(&self, config: Value, on_conflict: OnConflict) -> Result<RawInstance> {
        let config: R::Config = parse_config(R::TYPE_NAME, config)?;
        raw::<R>(self.reconciler.member::<R>().create(&config, on_conflict).await?)
    }

    async fn read(&self, id: &str) -> Result<Option<RawInstance>> {
        let id = R::Id::decode(id)?;
        match self.reconciler.member::<R>().read(&id).await? {
            Some(instance) => Ok(Some(raw::<R>(instance)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, prior: &RawInstance, config: Value) -> Result<RawInstance> {
        let prior = parse_prior::<R>(prior)?;
        let config: R::Config = parse_config(R::TYPE_NAME, config)?;
        raw::<R>(self.reconciler.member::<R>().update(&prior, &config).await?)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = R::Id::decode(id)?;
        self.reconciler.member::<R>().delete(&id).await
    }

    async fn import(&self, id: &str) -> Result<RawInstance> {
        raw::<R>(self.reconciler.member::<R>().import(id).await?)
    }
}

/// Registry of resource types served by one reconciler
pub struct Provider {
    reconciler: Arc<Reconciler>,
    handlers: BTreeMap<&'static str, Arc<dyn ResourceHandler>>,
}

impl Provider {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            handlers: BTreeMap::new(),
        }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn register(mut self, handler: Arc<dyn ResourceHandler>) -> Self {
        self.handlers.insert(handler.resource_type(), handler);
        self
    }

    pub fn register_standalone<R: StandaloneResource>(self) -> Self {
        let handler = Arc::new(StandaloneHandler::<R>::new(self.reconciler.clone()));
        self.register(handler)
    }

    pub fn register_member<R: MemberResource>(self) -> Self {
        let handler = Arc::new(MemberHandler::<R>::new(self.reconciler.clone()));
        self.register(handler)
    }

    pub fn handler(&self, resource_type: &str) -> Result<Arc<dyn ResourceHandler>> {
        self.handlers
            .get(resource_type)
            .cloned()
            .ok_or_else(|| ReconcileError::UnknownResourceType(resource_type.to_string()))
    }

    /// Registered type names, sorted
    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }
}
