//! ---
//! pldm_section: "03-firmware-update"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Firmware-update dispatch, inventory and condition gating."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use std::path::PathBuf;

use pldm_bus::BusError;
use thiserror::Error;

use crate::types::{ComponentId, EndpointId};

/// Reasons a component's inventory could not be created.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("invalid inventory item arguments for {eid}, {name:?}")]
    InvalidArguments { eid: EndpointId, name: String },
    #[error("no inventory path recorded for endpoint {0}")]
    UnknownEndpoint(EndpointId),
    #[error("failed to publish inventory for {component}: {source}")]
    Publish {
        component: ComponentId,
        #[source]
        source: BusError,
    },
}

/// Failures of a service condition.
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("bad argument to a service unit: {0}")]
    BadArgument(String),
    #[error("service {service} still awaiting job {job}")]
    JobInFlight { service: String, job: String },
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Failures reading a condition descriptor.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read condition descriptor {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("condition descriptor is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures talking to a running reactor.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("reactor is no longer running")]
    Closed,
}
