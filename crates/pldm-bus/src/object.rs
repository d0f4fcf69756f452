//! ---
//! pldm_section: "02-bus-boundary"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Object-server and service-manager boundaries."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{BusError, Result};

/// Generic inventory item interface.
pub const ITEM_INTERFACE: &str = "xyz.openbmc_project.Inventory.Item";
/// Board inventory item interface.
pub const BOARD_INTERFACE: &str = "xyz.openbmc_project.Inventory.Item.Board";
/// Software version interface.
pub const VERSION_INTERFACE: &str = "xyz.openbmc_project.Software.Version";
/// Association definitions interface.
pub const ASSOCIATIONS_INTERFACE: &str = "xyz.openbmc_project.Association.Definitions";
/// Software activation interface.
pub const ACTIVATION_INTERFACE: &str = "xyz.openbmc_project.Software.Activation";
/// Code update entry point interface.
pub const UPDATE_INTERFACE: &str = "xyz.openbmc_project.Software.Update";

/// Purpose advertised on a software version record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionPurpose {
    /// Purpose unknown.
    Unknown,
    /// Firmware of a host processor.
    Host,
    /// Firmware of the management controller itself.
    Bmc,
    /// Any other device firmware.
    #[default]
    Other,
}

/// Activation states of a software object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activations {
    /// Image is present but has not been activated.
    #[default]
    NotReady,
    /// Image is ready to be activated.
    Ready,
    /// Activation in progress.
    Activating,
    /// Image is the running image.
    Active,
    /// Activation failed.
    Failed,
}

/// One `(forward, reverse, endpoint)` association triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Name of the association seen from the publishing object.
    pub forward: String,
    /// Name of the association seen from the endpoint.
    pub reverse: String,
    /// Object path on the other end of the association.
    pub endpoint: String,
}

impl Association {
    /// Build an association triple.
    pub fn new(
        forward: impl Into<String>,
        reverse: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            forward: forward.into(),
            reverse: reverse.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Typed payload of an interface hosted at an object path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceData {
    /// Plain inventory item.
    Item,
    /// Board inventory item.
    Board,
    /// Software version record.
    Version {
        /// Human-visible version string.
        version: String,
        /// Version purpose.
        purpose: VersionPurpose,
    },
    /// Association definitions.
    Associations(Vec<Association>),
    /// Software activation state.
    Activation(Activations),
    /// Code update entry point.
    Update,
}

impl InterfaceData {
    /// Interface name the payload is published under.
    pub fn name(&self) -> &'static str {
        match self {
            InterfaceData::Item => ITEM_INTERFACE,
            InterfaceData::Board => BOARD_INTERFACE,
            InterfaceData::Version { .. } => VERSION_INTERFACE,
            InterfaceData::Associations(_) => ASSOCIATIONS_INTERFACE,
            InterfaceData::Activation(_) => ACTIVATION_INTERFACE,
            InterfaceData::Update => UPDATE_INTERFACE,
        }
    }
}

/// Object server hosting typed interfaces at hierarchical object paths.
pub trait ObjectServer: Send + Sync {
    /// Publish an interface at `path`.
    fn add_interface(&self, path: &str, data: InterfaceData) -> Result<()>;
    /// Retract an interface from `path`. Unknown entries are ignored.
    fn remove_interface(&self, path: &str, interface: &str);
    /// Objects that are ancestors of `path` and implement any of `interfaces`.
    fn get_ancestors(&self, path: &str, interfaces: &[&str]) -> Result<Vec<String>>;
    /// Human-readable backend name for logging.
    fn name(&self) -> &'static str;
}

/// Returns true when `path` follows the object path grammar.
pub fn is_valid_object_path(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    rest.split('/').all(|element| {
        !element.is_empty()
            && element
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    })
}

/// Handle to an interface published on an [`ObjectServer`].
///
/// The interface is retracted when the handle is dropped, so a bundle of
/// handles appears and disappears together with its owner.
pub struct PublishedInterface {
    server: Arc<dyn ObjectServer>,
    path: String,
    interface: &'static str,
}

impl PublishedInterface {
    /// Publish `data` at `path` and return the owning handle.
    pub fn publish(server: &Arc<dyn ObjectServer>, path: &str, data: InterfaceData) -> Result<Self> {
        let interface = data.name();
        server.add_interface(path, data)?;
        Ok(Self {
            server: Arc::clone(server),
            path: path.to_owned(),
            interface,
        })
    }

    /// Object path the interface lives at.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Interface name.
    pub fn interface(&self) -> &'static str {
        self.interface
    }
}

impl fmt::Debug for PublishedInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishedInterface")
            .field("server", &self.server.name())
            .field("path", &self.path)
            .field("interface", &self.interface)
            .finish()
    }
}

impl Drop for PublishedInterface {
    fn drop(&mut self) {
        trace!(path = %self.path, interface = self.interface, "retracting interface");
        self.server.remove_interface(&self.path, self.interface);
    }
}

/// In-memory object server backed by a mutex protected tree.
#[derive(Default)]
pub struct InMemoryObjectServer {
    objects: Mutex<BTreeMap<String, BTreeMap<&'static str, InterfaceData>>>,
    fail_lookups: AtomicBool,
}

impl InMemoryObjectServer {
    /// Create an empty object server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent ancestor lookup fail with [`BusError::Unavailable`].
    pub fn fail_ancestor_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Interface payload hosted at `path`, if any.
    pub fn interface(&self, path: &str, interface: &str) -> Option<InterfaceData> {
        self.objects
            .lock()
            .get(path)
            .and_then(|ifaces| ifaces.get(interface))
            .cloned()
    }

    /// True when `path` hosts at least one interface.
    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().contains_key(path)
    }

    /// Number of objects currently hosted.
    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }

    /// Paths of every hosted object implementing `interface`.
    pub fn paths_with(&self, interface: &str) -> Vec<String> {
        self.objects
            .lock()
            .iter()
            .filter(|(_, ifaces)| ifaces.contains_key(interface))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

impl ObjectServer for InMemoryObjectServer {
    fn add_interface(&self, path: &str, data: InterfaceData) -> Result<()> {
        if !is_valid_object_path(path) {
            return Err(BusError::InvalidObjectPath(path.to_owned()));
        }
        let interface = data.name();
        let mut objects = self.objects.lock();
        let ifaces = objects.entry(path.to_owned()).or_default();
        if ifaces.contains_key(interface) {
            return Err(BusError::InterfaceExists {
                path: path.to_owned(),
                interface,
            });
        }
        ifaces.insert(interface, data);
        debug!(path, interface, "interface published");
        Ok(())
    }

    fn remove_interface(&self, path: &str, interface: &str) {
        let mut objects = self.objects.lock();
        if let Some(ifaces) = objects.get_mut(path) {
            ifaces.remove(interface);
            if ifaces.is_empty() {
                objects.remove(path);
            }
        }
    }

    fn get_ancestors(&self, path: &str, interfaces: &[&str]) -> Result<Vec<String>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable("ancestor lookup disabled".into()));
        }
        let objects = self.objects.lock();
        if !objects.contains_key(path) {
            return Err(BusError::UnknownObject(path.to_owned()));
        }
        Ok(objects
            .iter()
            .filter(|(candidate, _)| {
                let prefix = if candidate.as_str() == "/" {
                    "/".to_owned()
                } else {
                    format!("{}/", candidate)
                };
                candidate.as_str() != path && path.starts_with(&prefix)
            })
            .filter(|(_, ifaces)| {
                interfaces.is_empty() || interfaces.iter().any(|name| ifaces.contains_key(name))
            })
            .map(|(candidate, _)| candidate.clone())
            .collect())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
