//! ---
//! pldm_section: "03-firmware-update"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Firmware-update dispatch, inventory and condition gating."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use std::fmt;

/// Transport endpoint identifier (MCTP EID).
pub type EndpointId = u8;

/// Raw response payload produced by a handler.
pub type Response = Vec<u8>;

/// Completion code telling the requester that no session expected the command.
pub const PLDM_FWUP_COMMAND_NOT_EXPECTED: u8 = 0x88;

/// One independently updatable firmware component on an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId {
    pub eid: EndpointId,
    pub name: String,
}

impl ComponentId {
    pub fn new(eid: EndpointId, name: impl Into<String>) -> Self {
        Self {
            eid,
            name: name.into(),
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.eid, self.name)
    }
}
