//! ---
//! pldm_section: "01-core-functionality"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Shared primitives and utilities for the firmware-update runtime."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
//! Core shared primitives for the PLDM firmware-update workspace.
//! This crate exposes configuration loading and tracing setup consumed by the
//! daemon and the firmware-update core.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, ConditionsConfig, InventoryConfig, LoadedAppConfig, LoggingConfig, ReactorConfig,
    StandaloneComponent, StandaloneConfig, StandaloneEndpoint,
};
pub use logging::{init_tracing, LogFormat};
