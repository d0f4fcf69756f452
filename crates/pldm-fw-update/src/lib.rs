//! ---
//! pldm_section: "03-firmware-update"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Firmware-update dispatch, inventory and condition gating."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
//! Firmware-update orchestration core.
//!
//! Inbound commands for an endpoint are routed by the [`AggregateDispatcher`]
//! to whichever per-component session claims them. The
//! [`ComponentInventoryModel`] publishes the inventory facets of every
//! discovered component and keeps them coupled to the dispatcher's registry.
//! [`ServiceCondition`] gates update steps on external unit jobs.

pub mod condition;
pub mod condition_config;
pub mod dispatch;
pub mod error;
pub mod inventory;
pub mod reactor;
pub mod resources;
pub mod types;

pub use condition::{ComponentConditions, ConditionState, Routine, ServiceCondition};
pub use condition_config::{ConditionConfig, ServiceConditionPair};
pub use dispatch::{
    AggregateDispatcher, HandlerOutcome, HandlerRegistry, SessionArena, SessionHandle,
    SoftwareBinding, UpdateHandler, UpdateSession,
};
pub use error::{ConditionError, ConfigError, InventoryError, ReactorError};
pub use inventory::{version_digest, ComponentInventoryModel, FacetPaths};
pub use reactor::{Reactor, ReactorEvent, ReactorHandle, ReactorStats, SessionFactory};
pub use resources::{ComponentVersion, FirmwareInventory, ResourceContext, StaticFirmwareInventory};
pub use types::{ComponentId, EndpointId, Response, PLDM_FWUP_COMMAND_NOT_EXPECTED};
