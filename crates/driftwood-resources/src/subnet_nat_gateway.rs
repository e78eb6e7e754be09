//! `azurerm_subnet_nat_gateway_association`
//!
//! The association is the `properties.natGateway` reference of a subnet,
//! so its identifier is the subnet's own.

use crate::locks::{SUBNET, VIRTUAL_NETWORK};
use crate::nic_backend_pool::SubResource;
use driftwood_core::{
    LockKey, MemberResource, ProviderScope, ReconcileError, Resource, ResourceIdentifier,
    ResourcePath, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const NAMESPACE: &str = "Microsoft.Network";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubnetNatGatewayConfig {
    pub subnet_id: String,
    pub nat_gateway_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetNatGatewayAttributes {
    pub subnet_id: String,
    pub nat_gateway_id: String,
}

/// `/subscriptions/{s}/resourceGroups/{g}/providers/Microsoft.Network/virtualNetworks/{vnet}/subnets/{subnet}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetId(ResourcePath);

impl SubnetId {
    pub fn virtual_network_name(&self) -> &str {
        self.0.get("virtualNetworks").unwrap_or_default()
    }

    pub fn subnet_name(&self) -> &str {
        self.0.name()
    }
}

impl ResourceIdentifier for SubnetId {
    fn encode(&self) -> String {
        self.0.to_string()
    }

    fn decode(id: &str) -> Result<Self> {
        let path = ResourcePath::parse(id)?.into_shape(NAMESPACE, &["virtualNetworks", "subnets"])?;
        Ok(Self(path))
    }
}

/// Subnet document, keeping every field the association does not own
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Subnet {
    #[serde(default)]
    pub properties: SubnetProperties,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nat_gateway: Option<SubResource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct SubnetNatGatewayAssociation;

impl Resource for SubnetNatGatewayAssociation {
    const TYPE_NAME: &'static str = "azurerm_subnet_nat_gateway_association";
    const API_VERSION: &'static str = "2020-11-01";

    type Config = SubnetNatGatewayConfig;
    type Id = SubnetId;
    type Attributes = SubnetNatGatewayAttributes;

    fn validate(config: &SubnetNatGatewayConfig) -> Result<()> {
        ResourcePath::parse(&config.nat_gateway_id)
            .and_then(|gateway| gateway.expect_shape(NAMESPACE, &["natGateways"]))
            .map_err(|err| {
                ReconcileError::InvalidConfig(format!("nat_gateway_id is not a NAT gateway ID: {err}"))
            })
    }

    fn identify(config: &SubnetNatGatewayConfig, _scope: &ProviderScope) -> Result<SubnetId> {
        SubnetId::decode(&config.subnet_id)
    }

    fn lock_keys(id: &SubnetId) -> Vec<LockKey> {
        vec![
            LockKey::new(VIRTUAL_NETWORK, id.virtual_network_name()),
            LockKey::new(SUBNET, id.subnet_name()),
        ]
    }

    fn supports_update() -> bool {
        false
    }
}

impl MemberResource for SubnetNatGatewayAssociation {
    const PARENT_KIND: &'static str = "Subnet";

    type Parent = Subnet;

    fn parent_path(id: &SubnetId) -> String {
        id.encode()
    }

    fn find(parent: &Subnet, id: &SubnetId) -> Option<SubnetNatGatewayAttributes> {
        let gateway = parent.properties.nat_gateway.as_ref()?;
        Some(SubnetNatGatewayAttributes {
            subnet_id: id.encode(),
            nat_gateway_id: gateway.id.clone(),
        })
    }

    fn insert(parent: &mut Subnet, _id: &SubnetId, config: &SubnetNatGatewayConfig) -> Result<()> {
        parent.properties.nat_gateway = Some(SubResource::new(config.nat_gateway_id.clone()));
        Ok(())
    }

    fn replace(parent: &mut Subnet, _id: &SubnetId, config: &SubnetNatGatewayConfig) -> Result<bool> {
        match parent.properties.nat_gateway.as_mut() {
            Some(gateway) => {
                gateway.id = config.nat_gateway_id.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(parent: &mut Subnet, _id: &SubnetId) -> bool {
        parent.properties.nat_gateway.take().is_some()
    }
}
