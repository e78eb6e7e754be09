//! `azurerm_resource_group`

use driftwood_core::{ProviderScope, ReconcileError, Resource, ResourcePath, Result, StandaloneResource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const MAX_NAME_LEN: usize = 90;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceGroupConfig {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroupAttributes {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Resource group document as returned by ARM
#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceGroupRemote {
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Canonical location form, `West Europe` becomes `westeurope`
pub fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}

pub(crate) fn validate_group_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(ReconcileError::InvalidConfig(format!(
            "resource group name must be 1 to {MAX_NAME_LEN} characters: {name:?}"
        )));
    }
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '(' | ')');
    if !name.chars().all(allowed) {
        return Err(ReconcileError::InvalidConfig(format!(
            "resource group name may only contain alphanumerics, underscores, hyphens, periods and parentheses: {name:?}"
        )));
    }
    if name.ends_with('.') {
        return Err(ReconcileError::InvalidConfig(format!(
            "resource group name cannot end with a period: {name:?}"
        )));
    }
    Ok(())
}

pub struct ResourceGroup;

impl Resource for ResourceGroup {
    const TYPE_NAME: &'static str = "azurerm_resource_group";
    const API_VERSION: &'static str = "2020-06-01";

    type Config = ResourceGroupConfig;
    type Id = ResourcePath;
    type Attributes = ResourceGroupAttributes;

    fn validate(config: &ResourceGroupConfig) -> Result<()> {
        validate_group_name(&config.name)?;
        if normalize_location(&config.location).is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "location must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn identify(config: &ResourceGroupConfig, scope: &ProviderScope) -> Result<ResourcePath> {
        ResourcePath::resource_group(&scope.subscription_id, &config.name)
    }

    fn requires_replacement(
        prior: &ResourceGroupAttributes,
        config: &ResourceGroupConfig,
    ) -> Option<String> {
        let wanted = normalize_location(&config.location);
        (normalize_location(&prior.location) != wanted)
            .then(|| format!("location changed from {:?} to {wanted:?}", prior.location))
    }
}

impl StandaloneResource for ResourceGroup {
    type Remote = ResourceGroupRemote;

    fn expand(config: &ResourceGroupConfig) -> Result<ResourceGroupRemote> {
        Ok(ResourceGroupRemote {
            location: normalize_location(&config.location),
            tags: Some(config.tags.clone()),
            extra: Map::new(),
        })
    }

    fn patch(remote: &mut ResourceGroupRemote, config: &ResourceGroupConfig) -> Result<()> {
        // location is immutable on an existing group
        remote.tags = Some(config.tags.clone());
        Ok(())
    }

    fn flatten(id: &ResourcePath, remote: &ResourceGroupRemote) -> ResourceGroupAttributes {
        ResourceGroupAttributes {
            name: id.name().to_string(),
            location: normalize_location(&remote.location),
            tags: remote.tags.clone().unwrap_or_default(),
        }
    }
}
