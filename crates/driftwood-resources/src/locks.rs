//! Lock kinds for shared Azure parents
//!
//! Ranks follow containment: a virtual network is always locked before
//! any of its subnets.

use driftwood_core::LockKind;

pub const VIRTUAL_NETWORK: LockKind = LockKind::new("azurerm_virtual_network", 10);
pub const SUBNET: LockKind = LockKind::new("azurerm_subnet", 20);
pub const NETWORK_INTERFACE: LockKind = LockKind::new("azurerm_network_interface", 30);
pub const IOTHUB: LockKind = LockKind::new("azurerm_iothub", 40);
