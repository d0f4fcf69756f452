//! ---
//! pldm_section: "03-firmware-update"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Firmware-update dispatch, inventory and condition gating."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
//! Published inventory of every firmware component discovered on an endpoint.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pldm_bus::{
    Activations, Association, InterfaceData, ObjectServer, PublishedInterface, VersionPurpose,
};
use pldm_common::config::InventoryConfig;
use sha2::{Digest, Sha512};
use tracing::{error, info, warn};

use crate::dispatch::{AggregateDispatcher, SessionHandle, SoftwareBinding, UpdateSession};
use crate::error::InventoryError;
use crate::types::{ComponentId, EndpointId};

const UNKNOWN_VERSION: &str = "N/A";
const RUNNING: &str = "running";
const RAN_ON: &str = "ran_on";

/// First 8 hex characters of the SHA-512 digest of `version`.
pub fn version_digest(version: &str) -> String {
    if version.is_empty() {
        warn!("digesting an empty version string");
    }
    let digest = Sha512::digest(version.as_bytes());
    hex::encode(&digest[..4])
}

/// Object paths derived for one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetPaths {
    pub device_path: String,
    pub software_path: String,
}

/// Code update entry point of a component, pointing at its session.
#[derive(Debug)]
struct CodeUpdater {
    interface: Arc<PublishedInterface>,
    session: SessionHandle,
}

/// Everything published for one component. Dropping it retracts all of it
/// except the activation object, which the session owns.
#[derive(Debug)]
struct InventoryFacetSet {
    paths: FacetPaths,
    display_version: String,
    board: Arc<PublishedInterface>,
    version: Arc<PublishedInterface>,
    association: Arc<PublishedInterface>,
    activation: Weak<PublishedInterface>,
    code_updater: CodeUpdater,
}

#[derive(Debug, Default)]
struct InventoryState {
    inventory_paths: BTreeMap<EndpointId, String>,
    facets: BTreeMap<ComponentId, InventoryFacetSet>,
}

/// Owner of component facet sets, kept in lockstep with the dispatcher.
pub struct ComponentInventoryModel {
    server: Arc<dyn ObjectServer>,
    dispatcher: Arc<AggregateDispatcher>,
    settings: InventoryConfig,
    state: Mutex<InventoryState>,
}

impl ComponentInventoryModel {
    pub fn new(
        server: Arc<dyn ObjectServer>,
        dispatcher: Arc<AggregateDispatcher>,
        settings: &InventoryConfig,
    ) -> Self {
        Self {
            server,
            dispatcher,
            settings: settings.clone(),
            state: Mutex::new(InventoryState::default()),
        }
    }

    /// Publish the facets of a newly discovered component and register its
    /// session with the dispatcher.
    ///
    /// Nothing is published or registered unless every step succeeds. A
    /// component that already exists is replaced in place, and is left
    /// untouched when its replacement fails.
    pub fn create_component(
        &self,
        eid: EndpointId,
        name: &str,
        active_version: &str,
        session: Option<Box<dyn UpdateSession>>,
    ) -> Result<SessionHandle, InventoryError> {
        let mut session = match session {
            Some(session) if !name.is_empty() => session,
            _ => {
                error!(eid, name, "invalid inventory item arguments");
                return Err(InventoryError::InvalidArguments {
                    eid,
                    name: name.to_owned(),
                });
            }
        };

        let mut state = self.state.lock();
        let inventory_path = match state.inventory_paths.get(&eid) {
            Some(path) if !path.is_empty() => path.clone(),
            _ => {
                error!(eid, "failed to find inventory path for endpoint");
                return Err(InventoryError::UnknownEndpoint(eid));
            }
        };

        let component = ComponentId::new(eid, name);
        let paths = self.derive_paths(&inventory_path, name, active_version);
        let display_version = if active_version.is_empty() {
            UNKNOWN_VERSION
        } else {
            active_version
        };

        let publish = |path: &str, data: InterfaceData| {
            PublishedInterface::publish(&self.server, path, data)
                .map(Arc::new)
                .map_err(|source| {
                    error!(component = %component, path, error = %source, "failed to publish inventory");
                    InventoryError::Publish {
                        component: component.clone(),
                        source,
                    }
                })
        };

        // An existing component stays published and registered until the
        // replacement is complete. Facets it already serves at the same
        // paths are carried over instead of published twice.
        let previous = state.facets.get(&component);
        let same_device = previous.filter(|facets| facets.paths.device_path == paths.device_path);
        let unchanged = same_device.filter(|facets| {
            facets.paths.software_path == paths.software_path
                && facets.display_version == display_version
        });

        let board = match same_device {
            Some(facets) => Arc::clone(&facets.board),
            None => publish(&paths.device_path, InterfaceData::Board)?,
        };
        let version = match unchanged {
            Some(facets) => Arc::clone(&facets.version),
            None => publish(
                &paths.software_path,
                InterfaceData::Version {
                    version: display_version.to_owned(),
                    purpose: VersionPurpose::Other,
                },
            )?,
        };
        let association = match unchanged {
            Some(facets) => Arc::clone(&facets.association),
            None => publish(
                &paths.software_path,
                InterfaceData::Associations(vec![Association::new(
                    RUNNING,
                    RAN_ON,
                    paths.device_path.clone(),
                )]),
            )?,
        };
        let activation_object = match unchanged.and_then(|facets| facets.activation.upgrade()) {
            Some(activation) => activation,
            None => publish(
                &paths.software_path,
                InterfaceData::Activation(Activations::Active),
            )?,
        };
        let updater = match unchanged {
            Some(facets) => Arc::clone(&facets.code_updater.interface),
            None => publish(&paths.software_path, InterfaceData::Update)?,
        };
        let replacing = previous.is_some();

        let activation = Arc::downgrade(&activation_object);
        session.bind_software(SoftwareBinding {
            object_path: paths.software_path.clone(),
            activation: Activations::Active,
            activation_object,
        });
        let handle = self.dispatcher.register(component.clone(), session);

        info!(
            component = %component,
            version = display_version,
            device_path = %paths.device_path,
            software_path = %paths.software_path,
            session = %handle,
            replaced = replacing,
            "component inventory created"
        );
        state.facets.insert(
            component,
            InventoryFacetSet {
                paths,
                display_version: display_version.to_owned(),
                board,
                version,
                association,
                activation,
                code_updater: CodeUpdater {
                    interface: updater,
                    session: handle,
                },
            },
        );
        Ok(handle)
    }

    /// Record where an endpoint lives in the inventory tree.
    pub fn refresh_inventory_path(&self, eid: EndpointId, path: &str) {
        let mut state = self.state.lock();
        state.inventory_paths.insert(eid, path.to_owned());
    }

    /// Drop one component's facets and session. Returns false when unknown.
    pub fn remove_component(&self, component: &ComponentId) -> bool {
        let mut state = self.state.lock();
        let unregistered = self.dispatcher.unregister(component);
        let removed = state.facets.remove(component).is_some();
        if removed || unregistered {
            info!(component = %component, "component inventory removed");
        }
        removed
    }

    /// Drop every component of an endpoint together with its path record.
    pub fn remove_endpoint(&self, eid: EndpointId) -> usize {
        let mut state = self.state.lock();
        self.dispatcher.unregister_all(eid);
        let before = state.facets.len();
        state.facets.retain(|component, _| component.eid != eid);
        state.inventory_paths.remove(&eid);
        let removed = before - state.facets.len();
        info!(eid, removed, "endpoint inventory removed");
        removed
    }

    pub fn inventory_path(&self, eid: EndpointId) -> Option<String> {
        self.state.lock().inventory_paths.get(&eid).cloned()
    }

    pub fn facet_paths(&self, component: &ComponentId) -> Option<FacetPaths> {
        self.state
            .lock()
            .facets
            .get(component)
            .map(|facets| facets.paths.clone())
    }

    /// Session the component's code updater points at.
    pub fn session_of(&self, component: &ComponentId) -> Option<SessionHandle> {
        self.state
            .lock()
            .facets
            .get(component)
            .map(|facets| facets.code_updater.session)
    }

    pub fn contains(&self, component: &ComponentId) -> bool {
        self.state.lock().facets.contains_key(component)
    }

    pub fn component_count(&self) -> usize {
        self.state.lock().facets.len()
    }

    /// Components of `eid` with published inventory.
    pub fn components_of(&self, eid: EndpointId) -> Vec<ComponentId> {
        self.state
            .lock()
            .facets
            .keys()
            .filter(|component| component.eid == eid)
            .cloned()
            .collect()
    }

    fn derive_paths(&self, inventory_path: &str, name: &str, version: &str) -> FacetPaths {
        let board_path = self.resolve_board_path(inventory_path);
        let device_path = format!("{}_{}", board_path, name);
        let leaf = device_path
            .rsplit_once('/')
            .map_or(device_path.as_str(), |(_, leaf)| leaf);
        let software_path = format!(
            "{}/{}_{}",
            self.settings.software_root,
            leaf,
            version_digest(version)
        );
        FacetPaths {
            device_path,
            software_path,
        }
    }

    fn resolve_board_path(&self, inventory_path: &str) -> String {
        let interface = self.settings.board_interface.as_str();
        match self.server.get_ancestors(inventory_path, &[interface]) {
            Ok(boards) => match boards.as_slice() {
                [board] => board.clone(),
                _ => {
                    error!(
                        path = inventory_path,
                        interface,
                        count = boards.len(),
                        "ambiguous board path, using default"
                    );
                    self.settings.fallback_board_path.clone()
                }
            },
            Err(err) => {
                error!(path = inventory_path, error = %err, "failed to get ancestors, using default board path");
                self.settings.fallback_board_path.clone()
            }
        }
    }
}

impl std::fmt::Debug for ComponentInventoryModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ComponentInventoryModel")
            .field("server", &self.server.name())
            .field("inventory_paths", &state.inventory_paths)
            .field("components", &state.facets.keys().collect::<Vec<_>>())
            .finish()
    }
}
