//! ---
//! pldm_section: "03-firmware-update"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Firmware-update dispatch, inventory and condition gating."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
//! Single-threaded event loop driving the dispatcher and the inventory.
//!
//! Every mutation of the shared collaborators happens on the task running
//! [`Reactor::run`]; other tasks only talk to it through a [`ReactorHandle`].

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::condition_config::ConditionConfig;
use crate::dispatch::{AggregateDispatcher, UpdateSession};
use crate::error::ReactorError;
use crate::inventory::ComponentInventoryModel;
use crate::resources::{FirmwareInventory, ResourceContext};
use crate::types::{ComponentId, EndpointId, Response};

/// Builds the update session for a component found on an endpoint.
pub trait SessionFactory: Send + Sync {
    /// `None` leaves the component without inventory.
    fn create_session(
        &self,
        component: &ComponentId,
        resources: ResourceContext<'_>,
    ) -> Option<Box<dyn UpdateSession>>;
}

#[derive(Debug)]
pub enum ReactorEvent {
    Request {
        eid: EndpointId,
        command: u8,
        payload: Vec<u8>,
        reply: oneshot::Sender<Response>,
    },
    /// Acknowledged with the number of components created.
    EndpointDiscovered {
        eid: EndpointId,
        inventory_path: String,
        done: oneshot::Sender<usize>,
    },
    /// Acknowledged with the number of components removed.
    EndpointRemoved {
        eid: EndpointId,
        done: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactorStats {
    pub requests: u64,
    pub unclaimed: u64,
    pub components_created: u64,
}

pub struct Reactor {
    dispatcher: Arc<AggregateDispatcher>,
    inventory: Arc<ComponentInventoryModel>,
    firmware: Arc<dyn FirmwareInventory>,
    conditions: Arc<ConditionConfig>,
    factory: Box<dyn SessionFactory>,
    events: mpsc::Receiver<ReactorEvent>,
    stats: ReactorStats,
}

impl Reactor {
    pub fn new(
        dispatcher: Arc<AggregateDispatcher>,
        inventory: Arc<ComponentInventoryModel>,
        firmware: Arc<dyn FirmwareInventory>,
        conditions: Arc<ConditionConfig>,
        factory: Box<dyn SessionFactory>,
        queue_depth: usize,
    ) -> (Self, ReactorHandle) {
        let (sender, events) = mpsc::channel(queue_depth.max(1));
        let reactor = Self {
            dispatcher,
            inventory,
            firmware,
            conditions,
            factory,
            events,
            stats: ReactorStats::default(),
        };
        (reactor, ReactorHandle { sender })
    }

    /// Borrow every collaborator at once.
    pub fn resources(&self) -> ResourceContext<'_> {
        ResourceContext {
            update_manager: &self.dispatcher,
            inventory_items: &self.inventory,
            inventory_manager: self.firmware.as_ref(),
            conditions: &self.conditions,
        }
    }

    /// Process events until [`ReactorEvent::Shutdown`] arrives or every
    /// handle is dropped.
    pub async fn run(mut self) -> ReactorStats {
        info!("reactor started");
        while let Some(event) = self.events.recv().await {
            match event {
                ReactorEvent::Request {
                    eid,
                    command,
                    payload,
                    reply,
                } => self.handle_request(eid, command, &payload, reply),
                ReactorEvent::EndpointDiscovered {
                    eid,
                    inventory_path,
                    done,
                } => {
                    let created = self.handle_discovery(eid, &inventory_path);
                    acknowledge(done, created, eid);
                }
                ReactorEvent::EndpointRemoved { eid, done } => {
                    let removed = self.inventory.remove_endpoint(eid);
                    self.firmware.forget(eid);
                    debug!(eid, removed, "endpoint removal handled");
                    acknowledge(done, removed, eid);
                }
                ReactorEvent::Shutdown => {
                    debug!("reactor shutdown requested");
                    break;
                }
            }
        }
        info!(
            requests = self.stats.requests,
            unclaimed = self.stats.unclaimed,
            components = self.stats.components_created,
            "reactor stopped"
        );
        self.stats
    }

    fn handle_request(
        &mut self,
        eid: EndpointId,
        command: u8,
        payload: &[u8],
        reply: oneshot::Sender<Response>,
    ) {
        self.stats.requests += 1;
        let outcome = self.dispatcher.dispatch(eid, command, payload);
        if !outcome.is_claimed() {
            self.stats.unclaimed += 1;
            debug!(eid, command, "command not expected by any handler");
        }
        if reply.send(outcome.into_response()).is_err() {
            warn!(eid, command, "requester went away before the response");
        }
    }

    fn handle_discovery(&mut self, eid: EndpointId, inventory_path: &str) -> usize {
        self.inventory.refresh_inventory_path(eid, inventory_path);
        let versions = self.firmware.component_versions(eid);
        if versions.is_empty() {
            warn!(eid, path = inventory_path, "endpoint reported no firmware components");
        }
        let mut created = 0;
        for version in versions {
            let component = ComponentId::new(eid, version.name.as_str());
            let session = self.factory.create_session(&component, self.resources());
            if session.is_none() {
                warn!(component = %component, "no update session for component");
                continue;
            }
            match self.inventory.create_component(
                eid,
                &version.name,
                &version.active_version,
                session,
            ) {
                Ok(_) => created += 1,
                Err(err) => {
                    error!(component = %component, error = %err, "failed to create component inventory");
                }
            }
        }
        self.stats.components_created += created as u64;
        created
    }
}

fn acknowledge(done: oneshot::Sender<usize>, count: usize, eid: EndpointId) {
    if done.send(count).is_err() {
        debug!(eid, "endpoint change no longer awaited");
    }
}

/// Cloneable sender side of a running [`Reactor`].
#[derive(Debug, Clone)]
pub struct ReactorHandle {
    sender: mpsc::Sender<ReactorEvent>,
}

impl ReactorHandle {
    /// Route one command and wait for its response bytes.
    pub async fn request(
        &self,
        eid: EndpointId,
        command: u8,
        payload: Vec<u8>,
    ) -> Result<Response, ReactorError> {
        let (reply, response) = oneshot::channel();
        self.send(ReactorEvent::Request {
            eid,
            command,
            payload,
            reply,
        })
        .await?;
        response.await.map_err(|_| ReactorError::Closed)
    }

    /// Announce an endpoint and wait until its components are created.
    /// Returns how many were.
    pub async fn discover(
        &self,
        eid: EndpointId,
        inventory_path: impl Into<String>,
    ) -> Result<usize, ReactorError> {
        let (done, created) = oneshot::channel();
        self.send(ReactorEvent::EndpointDiscovered {
            eid,
            inventory_path: inventory_path.into(),
            done,
        })
        .await?;
        created.await.map_err(|_| ReactorError::Closed)
    }

    /// Tear an endpoint down and wait until it is gone. Returns how many
    /// components were removed.
    pub async fn remove_endpoint(&self, eid: EndpointId) -> Result<usize, ReactorError> {
        let (done, removed) = oneshot::channel();
        self.send(ReactorEvent::EndpointRemoved { eid, done }).await?;
        removed.await.map_err(|_| ReactorError::Closed)
    }

    pub async fn shutdown(&self) -> Result<(), ReactorError> {
        self.send(ReactorEvent::Shutdown).await
    }

    async fn send(&self, event: ReactorEvent) -> Result<(), ReactorError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| ReactorError::Closed)
    }
}
