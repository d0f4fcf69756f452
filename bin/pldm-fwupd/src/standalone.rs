//! ---
//! pldm_section: "05-daemon"
//! pldm_subsection: "binary"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "In-process wiring used when the daemon runs without a system bus."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use pldm_bus::object::BOARD_INTERFACE;
use pldm_bus::{InMemoryObjectServer, InterfaceData, ObjectServer, ServiceManager};
use pldm_common::config::StandaloneConfig;
use pldm_fw_update::{
    ComponentConditions, ComponentId, ComponentVersion, EndpointId, HandlerOutcome,
    ResourceContext, SessionFactory, SoftwareBinding, StaticFirmwareInventory, UpdateHandler,
    UpdateSession,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Process-wide handler for commands not bound to any component.
#[derive(Debug, Default)]
pub struct UnboundCommandHandler;

impl UpdateHandler for UnboundCommandHandler {
    fn handle_request(&mut self, eid: EndpointId, command: u8, request: &[u8]) -> HandlerOutcome {
        debug!(eid, command, len = request.len(), "no update in progress for command");
        HandlerOutcome::NotRecognized
    }
}

/// Component session holding the conditions gating its update.
pub struct StandaloneSession {
    component: ComponentId,
    conditions: ComponentConditions,
    listeners: [JoinHandle<()>; 2],
    binding: Option<SoftwareBinding>,
}

impl UpdateHandler for StandaloneSession {
    fn handle_request(&mut self, eid: EndpointId, command: u8, _request: &[u8]) -> HandlerOutcome {
        debug!(
            component = %self.component,
            software = ?self.binding.as_ref().map(|binding| binding.object_path.as_str()),
            eid,
            command,
            "no transfer in progress"
        );
        HandlerOutcome::NotRecognized
    }
}

impl UpdateSession for StandaloneSession {
    fn bind_software(&mut self, binding: SoftwareBinding) {
        self.conditions.pre.assign_arg(binding.object_path.as_str());
        self.conditions.post.assign_arg(binding.object_path.as_str());
        info!(
            component = %self.component,
            software = %binding.object_path,
            pre = self.conditions.pre.service(),
            post = self.conditions.post.service(),
            "software bound to session"
        );
        self.binding = Some(binding);
    }
}

impl Drop for StandaloneSession {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

/// Builds a [`StandaloneSession`] for every discovered component.
pub struct StandaloneSessionFactory {
    manager: Arc<dyn ServiceManager>,
}

impl StandaloneSessionFactory {
    pub fn new(manager: Arc<dyn ServiceManager>) -> Self {
        Self { manager }
    }
}

impl SessionFactory for StandaloneSessionFactory {
    fn create_session(
        &self,
        component: &ComponentId,
        resources: ResourceContext<'_>,
    ) -> Option<Box<dyn UpdateSession>> {
        let conditions = ComponentConditions::from_bindings(
            resources.conditions,
            &component.name,
            Arc::clone(&self.manager),
        );
        let listeners = conditions.subscribe();
        Some(Box::new(StandaloneSession {
            component: component.clone(),
            conditions,
            listeners,
            binding: None,
        }))
    }
}

/// Host every configured endpoint and record its component versions.
pub fn seed(
    config: &StandaloneConfig,
    server: &InMemoryObjectServer,
    firmware: &StaticFirmwareInventory,
) -> Result<()> {
    for endpoint in &config.endpoints {
        if let Some(board) = &endpoint.board {
            if server.interface(board, BOARD_INTERFACE).is_none() {
                server
                    .add_interface(board, InterfaceData::Board)
                    .with_context(|| format!("failed to host board {board}"))?;
            }
        }
        server
            .add_interface(&endpoint.inventory_path, InterfaceData::Item)
            .with_context(|| {
                format!(
                    "failed to host endpoint {} at {}",
                    endpoint.eid, endpoint.inventory_path
                )
            })?;
        let versions = endpoint
            .components
            .iter()
            .map(|component| ComponentVersion::new(component.name.as_str(), component.version.as_str()))
            .collect::<Vec<_>>();
        info!(
            eid = endpoint.eid,
            path = %endpoint.inventory_path,
            components = versions.len(),
            "standalone endpoint seeded"
        );
        firmware.record(endpoint.eid, versions);
    }
    Ok(())
}
