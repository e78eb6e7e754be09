//! Azure resource types reconciled by driftwood
//!
//! | type | shape | parent |
//! |------|-------|--------|
//! | `azurerm_resource_group` | standalone | |
//! | `azurerm_iothub_route` | member | IoT Hub |
//! | `azurerm_network_interface_backend_address_pool_association` | member | network interface |
//! | `azurerm_subnet_nat_gateway_association` | member | subnet |

pub mod iothub_route;
pub mod locks;
pub mod nic_backend_pool;
pub mod resource_group;
pub mod subnet_nat_gateway;

pub use iothub_route::{IotHubRoute, IotHubRouteConfig, IotHubRouteId, RouteSource};
pub use nic_backend_pool::{NicBackendPoolAssociation, NicBackendPoolConfig, NicBackendPoolId, SubResource};
pub use resource_group::{ResourceGroup, ResourceGroupConfig, normalize_location};
pub use subnet_nat_gateway::{SubnetId, SubnetNatGatewayAssociation, SubnetNatGatewayConfig};

use driftwood_core::{Provider, Reconciler, Resource};
use std::sync::Arc;

/// Names of every resource type of this crate, sorted
pub fn resource_types() -> Vec<&'static str> {
    let mut types = vec![
        ResourceGroup::TYPE_NAME,
        IotHubRoute::TYPE_NAME,
        NicBackendPoolAssociation::TYPE_NAME,
        SubnetNatGatewayAssociation::TYPE_NAME,
    ];
    types.sort_unstable();
    types
}

/// Provider with every resource type of this crate registered
pub fn provider(reconciler: Arc<Reconciler>) -> Provider {
    tracing::debug!("registering azurerm resource types");
    Provider::new(reconciler)
        .register_standalone::<ResourceGroup>()
        .register_member::<IotHubRoute>()
        .register_member::<NicBackendPoolAssociation>()
        .register_member::<SubnetNatGatewayAssociation>()
}
