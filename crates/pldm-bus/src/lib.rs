//! ---
//! pldm_section: "02-bus-boundary"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Object-server and service-manager boundaries."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
//! Boundaries to the externally owned object server and service manager.
//!
//! The firmware-update core only ever talks to these subsystems through the
//! [`ObjectServer`] and [`ServiceManager`] traits. The in-memory backends are
//! used by tests and by the daemon when it runs without a system bus.
#![warn(missing_docs)]

pub mod object;
pub mod service;

/// Shared result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Failures reported by bus backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The requested object path is not hosted by the object server.
    #[error("unknown object: {0}")]
    UnknownObject(String),
    /// The object path violates the object path grammar.
    #[error("invalid object path: {0}")]
    InvalidObjectPath(String),
    /// The interface is already published at the object path.
    #[error("interface {interface} already published at {path}")]
    InterfaceExists {
        /// Object path.
        path: String,
        /// Interface name.
        interface: &'static str,
    },
    /// A signal payload did not match the expected signature.
    #[error("unexpected signal payload: expected {expected}, found {found}")]
    Signature {
        /// Expected signature string.
        expected: &'static str,
        /// Signature actually carried by the message.
        found: String,
    },
    /// The service manager refused to start a unit.
    #[error("failed to start unit {unit}: {reason}")]
    UnitStart {
        /// Unit name passed to the start call.
        unit: String,
        /// Reason reported by the service manager.
        reason: String,
    },
    /// The backend is not reachable.
    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

pub use object::{
    is_valid_object_path, Activations, Association, InMemoryObjectServer, InterfaceData,
    ObjectServer, PublishedInterface, VersionPurpose,
};
pub use service::{
    InMemoryServiceManager, JobRemoved, ServiceManager, SignalMessage, StartedUnit, Value,
};
