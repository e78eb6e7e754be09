//! `azurerm_network_interface_backend_address_pool_association`
//!
//! Adds a load balancer backend address pool to one IP configuration of a
//! network interface. The association is recorded in the NIC's
//! `properties.ipConfigurations[].properties.loadBalancerBackendAddressPools`.

use crate::locks::NETWORK_INTERFACE;
use driftwood_core::{
    LockKey, MemberResource, ProviderScope, ReconcileError, Resource, ResourceIdentifier,
    ResourcePath, Result, join_composite, split_composite,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const NAMESPACE: &str = "Microsoft.Network";
const ID_FORMAT: &str = "{networkInterfaceId}/ipConfigurations/{ipConfigurationName}|{backendAddressPoolId}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NicBackendPoolConfig {
    pub network_interface_id: String,
    pub ip_configuration_name: String,
    pub backend_address_pool_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicBackendPoolAttributes {
    pub network_interface_id: String,
    pub ip_configuration_name: String,
    pub backend_address_pool_id: String,
}

/// `{ipConfigurationId}|{backendAddressPoolId}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicBackendPoolId {
    pub ip_configuration: ResourcePath,
    pub backend_address_pool: ResourcePath,
}

fn parse_pool(id: &str) -> Result<ResourcePath> {
    ResourcePath::parse(id)?.into_shape(NAMESPACE, &["loadBalancers", "backendAddressPools"])
}

impl NicBackendPoolId {
    pub fn network_interface(&self) -> Option<ResourcePath> {
        self.ip_configuration.parent()
    }

    pub fn network_interface_name(&self) -> &str {
        self.ip_configuration.get("networkInterfaces").unwrap_or_default()
    }

    pub fn ip_configuration_name(&self) -> &str {
        self.ip_configuration.name()
    }

    fn describe(&self) -> String {
        format!(
            "{} {:?}",
            NicBackendPoolAssociation::TYPE_NAME,
            self.encode()
        )
    }
}

impl ResourceIdentifier for NicBackendPoolId {
    fn encode(&self) -> String {
        join_composite(
            &self.ip_configuration.to_string(),
            &self.backend_address_pool.to_string(),
        )
    }

    fn decode(id: &str) -> Result<Self> {
        let (left, right) = split_composite(id, ID_FORMAT)?;
        let ip_configuration = ResourcePath::parse(left)?
            .into_shape(NAMESPACE, &["networkInterfaces", "ipConfigurations"])?;
        Ok(Self {
            ip_configuration,
            backend_address_pool: parse_pool(right)?,
        })
    }
}

/// Network interface document, keeping every field the association does not own
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NetworkInterface {
    #[serde(default)]
    pub properties: NetworkInterfaceProperties,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceProperties {
    #[serde(default)]
    pub ip_configurations: Vec<IpConfiguration>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IpConfiguration {
    pub name: String,
    #[serde(default)]
    pub properties: IpConfigurationProperties,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpConfigurationProperties {
    #[serde(default)]
    pub load_balancer_backend_address_pools: Vec<SubResource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResource {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SubResource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: Map::new(),
        }
    }

    pub(crate) fn refers_to(&self, path: &ResourcePath) -> bool {
        self.id.eq_ignore_ascii_case(&path.to_string())
    }
}

fn ip_configuration<'a>(nic: &'a NetworkInterface, id: &NicBackendPoolId) -> Option<&'a IpConfiguration> {
    nic.properties
        .ip_configurations
        .iter()
        .find(|config| config.name == id.ip_configuration_name())
}

fn ip_configuration_mut<'a>(
    nic: &'a mut NetworkInterface,
    id: &NicBackendPoolId,
) -> Option<&'a mut IpConfiguration> {
    nic.properties
        .ip_configurations
        .iter_mut()
        .find(|config| config.name == id.ip_configuration_name())
}

pub struct NicBackendPoolAssociation;

impl Resource for NicBackendPoolAssociation {
    const TYPE_NAME: &'static str = "azurerm_network_interface_backend_address_pool_association";
    const API_VERSION: &'static str = "2020-11-01";

    type Config = NicBackendPoolConfig;
    type Id = NicBackendPoolId;
    type Attributes = NicBackendPoolAttributes;

    fn validate(config: &NicBackendPoolConfig) -> Result<()> {
        if config.ip_configuration_name.is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "ip_configuration_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn identify(config: &NicBackendPoolConfig, _scope: &ProviderScope) -> Result<NicBackendPoolId> {
        let nic = ResourcePath::parse(&config.network_interface_id)?
            .into_shape(NAMESPACE, &["networkInterfaces"])?;
        Ok(NicBackendPoolId {
            ip_configuration: nic.child("ipConfigurations", &config.ip_configuration_name)?,
            backend_address_pool: parse_pool(&config.backend_address_pool_id)?,
        })
    }

    fn lock_keys(id: &NicBackendPoolId) -> Vec<LockKey> {
        vec![LockKey::new(NETWORK_INTERFACE, id.network_interface_name())]
    }

    fn supports_update() -> bool {
        false
    }
}

impl MemberResource for NicBackendPoolAssociation {
    const PARENT_KIND: &'static str = "Network Interface";

    type Parent = NetworkInterface;

    fn parent_path(id: &NicBackendPoolId) -> String {
        id.network_interface().map(|nic| nic.to_string()).unwrap_or_default()
    }

    fn find(parent: &NetworkInterface, id: &NicBackendPoolId) -> Option<NicBackendPoolAttributes> {
        let config = ip_configuration(parent, id)?;
        let pool = config
            .properties
            .load_balancer_backend_address_pools
            .iter()
            .find(|pool| pool.refers_to(&id.backend_address_pool))?;
        Some(NicBackendPoolAttributes {
            network_interface_id: Self::parent_path(id),
            ip_configuration_name: config.name.clone(),
            backend_address_pool_id: pool.id.clone(),
        })
    }

    fn insert(parent: &mut NetworkInterface, id: &NicBackendPoolId, _config: &NicBackendPoolConfig) -> Result<()> {
        let Some(config) = ip_configuration_mut(parent, id) else {
            return Err(ReconcileError::ParentNotFound {
                context: id.describe(),
                parent: format!(
                    "IP Configuration {:?} on Network Interface {:?}",
                    id.ip_configuration_name(),
                    id.network_interface_name()
                ),
            });
        };
        config
            .properties
            .load_balancer_backend_address_pools
            .push(SubResource::new(id.backend_address_pool.to_string()));
        Ok(())
    }

    fn replace(parent: &mut NetworkInterface, id: &NicBackendPoolId, _config: &NicBackendPoolConfig) -> Result<bool> {
        // every field is part of the identifier, so there is nothing to rewrite
        Ok(Self::find(parent, id).is_some())
    }

    fn remove(parent: &mut NetworkInterface, id: &NicBackendPoolId) -> bool {
        let Some(config) = ip_configuration_mut(parent, id) else {
            return false;
        };
        let pools = &mut config.properties.load_balancer_backend_address_pools;
        let before = pools.len();
        pools.retain(|pool| !pool.refers_to(&id.backend_address_pool));
        pools.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NIC: &str = "/subscriptions/sub/resourceGroups/rg-1/providers/Microsoft.Network/networkInterfaces/nic-1";
    const POOL: &str = "/subscriptions/sub/resourceGroups/rg-1/providers/Microsoft.Network/loadBalancers/lb-1/backendAddressPools/pool-1";

    fn config() -> NicBackendPoolConfig {
        NicBackendPoolConfig {
            network_interface_id: NIC.to_string(),
            ip_configuration_name: "internal".to_string(),
            backend_address_pool_id: POOL.to_string(),
        }
    }

    #[test]
    fn test_composite_id() {
        let id = NicBackendPoolAssociation::identify(&config(), &ProviderScope::new("sub")).unwrap();
        let encoded = id.encode();
        assert_eq!(encoded, format!("{NIC}/ipConfigurations/internal|{POOL}"));
        assert_eq!(NicBackendPoolId::decode(&encoded).unwrap(), id);
        assert_eq!(id.network_interface_name(), "nic-1");
        assert_eq!(NicBackendPoolAssociation::parent_path(&id), NIC);
    }

    #[test]
    fn test_malformed_composite_id() {
        for bad in [
            format!("{NIC}/ipConfigurations/internal"),
            format!("{NIC}|{POOL}"),
            format!("{NIC}/ipConfigurations/internal|{NIC}"),
            format!("{NIC}/ipConfigurations/internal|{POOL}|{POOL}"),
        ] {
            assert!(
                matches!(NicBackendPoolId::decode(&bad), Err(ReconcileError::InvalidId { .. })),
                "{bad} decoded"
            );
        }
    }

    #[test]
    fn test_insert_into_missing_ip_configuration() {
        let mut nic: NetworkInterface = serde_json::from_value(json!({
            "properties": {"ipConfigurations": [{"name": "other", "properties": {}}]}
        }))
        .unwrap();
        let id = NicBackendPoolAssociation::identify(&config(), &ProviderScope::new("sub")).unwrap();
        let err = NicBackendPoolAssociation::insert(&mut nic, &id, &config()).unwrap_err();
        assert!(matches!(err, ReconcileError::ParentNotFound { .. }));
    }

    #[test]
    fn test_remove_only_this_pool() {
        let other_pool = POOL.replace("pool-1", "pool-2");
        let mut nic: NetworkInterface = serde_json::from_value(json!({
            "properties": {
                "ipConfigurations": [{
                    "name": "internal",
                    "properties": {
                        "privateIPAllocationMethod": "Dynamic",
                        "loadBalancerBackendAddressPools": [{"id": POOL.to_lowercase()}, {"id": other_pool}]
                    }
                }]
            }
        }))
        .unwrap();
        let id = NicBackendPoolAssociation::identify(&config(), &ProviderScope::new("sub")).unwrap();

        assert!(NicBackendPoolAssociation::find(&nic, &id).is_some());
        assert!(NicBackendPoolAssociation::remove(&mut nic, &id));
        assert!(!NicBackendPoolAssociation::remove(&mut nic, &id));

        let document = serde_json::to_value(&nic).unwrap();
        let properties = &document["properties"]["ipConfigurations"][0]["properties"];
        assert_eq!(properties["loadBalancerBackendAddressPools"], json!([{"id": other_pool}]));
        assert_eq!(properties["privateIPAllocationMethod"], json!("Dynamic"));
    }
}
