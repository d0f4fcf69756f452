//! ---
//! pldm_section: "03-firmware-update"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Firmware-update dispatch, inventory and condition gating."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::condition_config::ConditionConfig;
use crate::dispatch::AggregateDispatcher;
use crate::inventory::ComponentInventoryModel;
use crate::types::EndpointId;

/// Active version of one component as reported by its endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentVersion {
    pub name: String,
    pub active_version: String,
}

impl ComponentVersion {
    pub fn new(name: impl Into<String>, active_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active_version: active_version.into(),
        }
    }
}

/// Source of the component versions learned for each endpoint.
pub trait FirmwareInventory: Send + Sync {
    fn component_versions(&self, eid: EndpointId) -> Vec<ComponentVersion>;
    /// Drop whatever was learned about an endpoint that went away.
    fn forget(&self, eid: EndpointId);
}

/// Firmware inventory filled in by the caller.
#[derive(Debug, Default)]
pub struct StaticFirmwareInventory {
    records: RwLock<BTreeMap<EndpointId, Vec<ComponentVersion>>>,
}

impl StaticFirmwareInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, eid: EndpointId, versions: Vec<ComponentVersion>) {
        self.records.write().insert(eid, versions);
    }

}

impl FirmwareInventory for StaticFirmwareInventory {
    fn component_versions(&self, eid: EndpointId) -> Vec<ComponentVersion> {
        self.records.read().get(&eid).cloned().unwrap_or_default()
    }

    fn forget(&self, eid: EndpointId) {
        self.records.write().remove(&eid);
    }
}

/// Borrowed view of the firmware-update collaborators.
///
/// Handed to code that needs to reach the other collaborators without owning
/// them, e.g. a session being built for a freshly discovered component.
#[derive(Clone, Copy)]
pub struct ResourceContext<'a> {
    pub update_manager: &'a AggregateDispatcher,
    pub inventory_items: &'a ComponentInventoryModel,
    pub inventory_manager: &'a dyn FirmwareInventory,
    pub conditions: &'a ConditionConfig,
}
