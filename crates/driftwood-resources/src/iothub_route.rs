//! `azurerm_iothub_route`
//!
//! Routes have no API of their own: they live in
//! `properties.routing.routes` of the IoT Hub and are written by putting
//! the whole hub back. Route names match case-insensitively.

use crate::locks::IOTHUB;
use driftwood_core::{
    LockKey, MemberResource, ProviderScope, ReconcileError, Resource, ResourceIdentifier,
    ResourcePath, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const NAMESPACE: &str = "Microsoft.Devices";
const MAX_NAME_LEN: usize = 64;

/// Message source a route listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteSource {
    DeviceConnectionStateEvents,
    DeviceJobLifecycleEvents,
    DeviceLifecycleEvents,
    DeviceMessages,
    Invalid,
    TwinChangeEvents,
}

fn default_condition() -> String {
    "true".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IotHubRouteConfig {
    pub resource_group_name: String,
    pub iothub_name: String,
    pub name: String,
    pub source: RouteSource,
    #[serde(default = "default_condition")]
    pub condition: String,
    pub endpoint_names: Vec<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IotHubRouteAttributes {
    pub resource_group_name: String,
    pub iothub_name: String,
    pub name: String,
    pub source: String,
    pub condition: String,
    pub endpoint_names: Vec<String>,
    pub enabled: bool,
}

/// `/subscriptions/{s}/resourceGroups/{g}/providers/Microsoft.Devices/IotHubs/{hub}/Routes/{name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IotHubRouteId(ResourcePath);

impl IotHubRouteId {
    pub fn new(subscription_id: &str, resource_group: &str, hub: &str, name: &str) -> Result<Self> {
        ResourcePath::new(subscription_id, resource_group, NAMESPACE, "IotHubs", hub)?
            .child("Routes", name)
            .map(Self)
    }

    pub fn hub_name(&self) -> &str {
        self.0.get("IotHubs").unwrap_or_default()
    }

    pub fn route_name(&self) -> &str {
        self.0.name()
    }

    pub fn path(&self) -> &ResourcePath {
        &self.0
    }
}

impl ResourceIdentifier for IotHubRouteId {
    fn encode(&self) -> String {
        self.0.to_string()
    }

    fn decode(id: &str) -> Result<Self> {
        let path = ResourcePath::parse(id)?.into_shape(NAMESPACE, &["IotHubs", "Routes"])?;
        Ok(Self(path))
    }
}

/// IoT Hub document, keeping every field a route does not own
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IotHub {
    #[serde(default)]
    pub properties: IotHubProperties,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IotHubProperties {
    #[serde(default)]
    pub routing: Routing,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Routing {
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub name: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub endpoint_names: Vec<String>,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Route {
    fn from_config(config: &IotHubRouteConfig) -> Self {
        Self {
            name: config.name.clone(),
            source: source_name(config.source),
            condition: Some(config.condition.clone()),
            endpoint_names: config.endpoint_names.clone(),
            is_enabled: config.enabled,
            extra: Map::new(),
        }
    }
}

fn source_name(source: RouteSource) -> String {
    match serde_json::to_value(source) {
        Ok(Value::String(name)) => name,
        _ => format!("{source:?}"),
    }
}

fn validate_route_name(name: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
    if name.is_empty() || name.len() > MAX_NAME_LEN || !name.chars().all(allowed) {
        return Err(ReconcileError::InvalidConfig(format!(
            "route name may only contain alphanumeric characters, periods, underscores and hyphens, and must be 1 to {MAX_NAME_LEN} characters: {name:?}"
        )));
    }
    Ok(())
}

pub struct IotHubRoute;

impl Resource for IotHubRoute {
    const TYPE_NAME: &'static str = "azurerm_iothub_route";
    const API_VERSION: &'static str = "2020-03-01";

    type Config = IotHubRouteConfig;
    type Id = IotHubRouteId;
    type Attributes = IotHubRouteAttributes;

    fn validate(config: &IotHubRouteConfig) -> Result<()> {
        validate_route_name(&config.name)?;
        match config.endpoint_names.as_slice() {
            [endpoint] if !endpoint.is_empty() => Ok(()),
            _ => Err(ReconcileError::InvalidConfig(
                "endpoint_names must contain exactly one non-empty endpoint".to_string(),
            )),
        }
    }

    fn identify(config: &IotHubRouteConfig, scope: &ProviderScope) -> Result<IotHubRouteId> {
        IotHubRouteId::new(
            &scope.subscription_id,
            &config.resource_group_name,
            &config.iothub_name,
            &config.name,
        )
    }

    fn lock_keys(id: &IotHubRouteId) -> Vec<LockKey> {
        vec![LockKey::new(IOTHUB, id.hub_name())]
    }
}

impl MemberResource for IotHubRoute {
    const PARENT_KIND: &'static str = "IoT Hub";

    type Parent = IotHub;

    fn parent_path(id: &IotHubRouteId) -> String {
        id.path().parent().map(|hub| hub.to_string()).unwrap_or_default()
    }

    fn find(parent: &IotHub, id: &IotHubRouteId) -> Option<IotHubRouteAttributes> {
        let route = parent
            .properties
            .routing
            .routes
            .iter()
            .find(|route| route.name.eq_ignore_ascii_case(id.route_name()))?;
        Some(IotHubRouteAttributes {
            resource_group_name: id.path().resource_group_name().to_string(),
            iothub_name: id.hub_name().to_string(),
            name: route.name.clone(),
            source: route.source.clone(),
            condition: route.condition.clone().unwrap_or_else(default_condition),
            endpoint_names: route.endpoint_names.clone(),
            enabled: route.is_enabled,
        })
    }

    fn insert(parent: &mut IotHub, _id: &IotHubRouteId, config: &IotHubRouteConfig) -> Result<()> {
        parent.properties.routing.routes.push(Route::from_config(config));
        Ok(())
    }

    fn replace(parent: &mut IotHub, id: &IotHubRouteId, config: &IotHubRouteConfig) -> Result<bool> {
        let Some(route) = parent
            .properties
            .routing
            .routes
            .iter_mut()
            .find(|route| route.name.eq_ignore_ascii_case(id.route_name()))
        else {
            return Ok(false);
        };
        let extra = std::mem::take(&mut route.extra);
        *route = Route {
            extra,
            ..Route::from_config(config)
        };
        Ok(true)
    }

    fn remove(parent: &mut IotHub, id: &IotHubRouteId) -> bool {
        let routes = &mut parent.properties.routing.routes;
        let before = routes.len();
        routes.retain(|route| !route.name.eq_ignore_ascii_case(id.route_name()));
        routes.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ROUTE_ID: &str = "/subscriptions/sub/resourceGroups/rg-1/providers/Microsoft.Devices/IotHubs/hub-1/Routes/telemetry";

    fn config() -> IotHubRouteConfig {
        serde_json::from_value(json!({
            "resource_group_name": "rg-1",
            "iothub_name": "hub-1",
            "name": "telemetry",
            "source": "DeviceMessages",
            "endpoint_names": ["events"],
            "enabled": true
        }))
        .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = config();
        assert_eq!(config.condition, "true");
        assert_eq!(config.source, RouteSource::DeviceMessages);
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let parsed = serde_json::from_value::<IotHubRouteConfig>(json!({
            "resource_group_name": "rg-1",
            "iothub_name": "hub-1",
            "name": "telemetry",
            "source": "Telemetry",
            "endpoint_names": ["events"],
            "enabled": true
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate() {
        assert!(IotHubRoute::validate(&config()).is_ok());

        let mut bad = config();
        bad.name = "no spaces".to_string();
        assert!(IotHubRoute::validate(&bad).is_err());

        let mut bad = config();
        bad.name = "r".repeat(65);
        assert!(IotHubRoute::validate(&bad).is_err());

        let mut bad = config();
        bad.endpoint_names = vec!["a".to_string(), "b".to_string()];
        assert!(IotHubRoute::validate(&bad).is_err());

        let mut bad = config();
        bad.endpoint_names = vec![String::new()];
        assert!(IotHubRoute::validate(&bad).is_err());
    }

    #[test]
    fn test_id() {
        let id = IotHubRoute::identify(&config(), &ProviderScope::new("sub")).unwrap();
        assert_eq!(id.encode(), ROUTE_ID);
        assert_eq!(id.hub_name(), "hub-1");
        assert_eq!(IotHubRouteId::decode(ROUTE_ID).unwrap(), id);
        assert_eq!(
            IotHubRoute::parent_path(&id),
            "/subscriptions/sub/resourceGroups/rg-1/providers/Microsoft.Devices/IotHubs/hub-1"
        );
        assert_eq!(IotHubRoute::lock_keys(&id), vec![LockKey::new(IOTHUB, "hub-1")]);

        let wrong = "/subscriptions/sub/resourceGroups/rg-1/providers/Microsoft.Devices/IotHubs/hub-1/Endpoints/e";
        assert!(matches!(
            IotHubRouteId::decode(wrong),
            Err(ReconcileError::InvalidId { .. })
        ));
    }

    #[test]
    fn test_find_is_case_insensitive() {
        let hub: IotHub = serde_json::from_value(json!({
            "properties": {
                "routing": {
                    "routes": [{
                        "name": "TELEMETRY",
                        "source": "DeviceMessages",
                        "endpointNames": ["events"],
                        "isEnabled": false
                    }]
                }
            }
        }))
        .unwrap();
        let id = IotHubRouteId::decode(ROUTE_ID).unwrap();
        let found = IotHubRoute::find(&hub, &id).unwrap();
        assert_eq!(found.name, "TELEMETRY");
        assert_eq!(found.condition, "true");
        assert!(!found.enabled);
    }

    #[test]
    fn test_replace_keeps_unmodelled_fields() {
        let mut hub: IotHub = serde_json::from_value(json!({
            "properties": {
                "routing": {
                    "routes": [{
                        "name": "telemetry",
                        "source": "DeviceMessages",
                        "endpointNames": ["old"],
                        "isEnabled": true,
                        "priority": 3
                    }]
                }
            }
        }))
        .unwrap();
        let id = IotHubRouteId::decode(ROUTE_ID).unwrap();
        let mut config = config();
        config.endpoint_names = vec!["new".to_string()];

        assert!(IotHubRoute::replace(&mut hub, &id, &config).unwrap());

        let document = serde_json::to_value(&hub).unwrap();
        let route = &document["properties"]["routing"]["routes"][0];
        assert_eq!(route["endpointNames"], json!(["new"]));
        assert_eq!(route["priority"], json!(3));
        assert_eq!(route["condition"], json!("true"));
    }
}
