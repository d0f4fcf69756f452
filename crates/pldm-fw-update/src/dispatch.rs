//! ---
//! pldm_section: "03-firmware-update"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Firmware-update dispatch, inventory and condition gating."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
//! Routing of inbound firmware-update commands to per-component sessions.
//!
//! Several update sessions can share one endpoint. Ownership of a command is
//! decided by asking: the default handler first, then every registered
//! session in registration order, until one of them claims it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use pldm_bus::{Activations, PublishedInterface};
use tracing::{debug, trace};

use crate::types::{ComponentId, EndpointId, Response, PLDM_FWUP_COMMAND_NOT_EXPECTED};

/// Result of offering a command to a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The handler owns the transaction and produced a response.
    Claimed(Response),
    /// The handler does not expect this command.
    NotRecognized,
}

impl HandlerOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, HandlerOutcome::Claimed(_))
    }

    /// Encode for the wire. An unclaimed command becomes a bare
    /// `COMMAND_NOT_EXPECTED` completion code.
    pub fn into_response(self) -> Response {
        match self {
            HandlerOutcome::Claimed(response) => response,
            HandlerOutcome::NotRecognized => vec![PLDM_FWUP_COMMAND_NOT_EXPECTED],
        }
    }
}

/// Anything that can be offered an inbound firmware-update command.
pub trait UpdateHandler: Send {
    fn handle_request(&mut self, eid: EndpointId, command: u8, request: &[u8]) -> HandlerOutcome;
}

/// Software object bound onto a session once its inventory is published.
#[derive(Debug)]
pub struct SoftwareBinding {
    pub object_path: String,
    pub activation: Activations,
    /// Activation interface at `object_path`. The session holds the owning
    /// reference; the inventory only keeps a weak one.
    pub activation_object: Arc<PublishedInterface>,
}

/// Per-component update session as seen by the dispatcher and the inventory.
pub trait UpdateSession: UpdateHandler {
    fn bind_software(&mut self, binding: SoftwareBinding);
}

/// Non-owning reference to a session stored in a [`SessionArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Authoritative owner of every registered session.
#[derive(Default)]
pub struct SessionArena {
    next_handle: u64,
    sessions: HashMap<SessionHandle, Box<dyn UpdateSession>>,
}

impl SessionArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session: Box<dyn UpdateSession>) -> SessionHandle {
        self.next_handle += 1;
        let handle = SessionHandle(self.next_handle);
        self.sessions.insert(handle, session);
        handle
    }

    pub fn remove(&mut self, handle: SessionHandle) -> Option<Box<dyn UpdateSession>> {
        self.sessions.remove(&handle)
    }

    pub fn get_mut(&mut self, handle: SessionHandle) -> Option<&mut (dyn UpdateSession + 'static)> {
        self.sessions.get_mut(&handle).map(|session| session.as_mut())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl fmt::Debug for SessionArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionArena")
            .field("next_handle", &self.next_handle)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

/// Append-ordered `(component, session)` entries consulted during dispatch.
#[derive(Debug, Default, Clone)]
pub struct HandlerRegistry {
    entries: Vec<(ComponentId, SessionHandle)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite in place. Returns the handle that was replaced.
    pub fn insert(&mut self, component: ComponentId, handle: SessionHandle) -> Option<SessionHandle> {
        match self.entries.iter_mut().find(|(id, _)| *id == component) {
            Some((_, existing)) => Some(std::mem::replace(existing, handle)),
            None => {
                self.entries.push((component, handle));
                None
            }
        }
    }

    pub fn remove(&mut self, component: &ComponentId) -> Option<SessionHandle> {
        let index = self.entries.iter().position(|(id, _)| id == component)?;
        Some(self.entries.remove(index).1)
    }

    /// Remove every entry of `eid`, keeping the relative order of the rest.
    pub fn remove_endpoint(&mut self, eid: EndpointId) -> Vec<SessionHandle> {
        let mut removed = Vec::new();
        self.entries.retain(|(id, handle)| {
            if id.eid == eid {
                removed.push(*handle);
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn get(&self, component: &ComponentId) -> Option<SessionHandle> {
        self.entries
            .iter()
            .find(|(id, _)| id == component)
            .map(|(_, handle)| *handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ComponentId, SessionHandle)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct DispatcherInner {
    default_handler: Box<dyn UpdateHandler>,
    registry: HandlerRegistry,
    sessions: SessionArena,
}

/// Default handler plus registry of per-component sessions.
///
/// One lock covers dispatch and registry mutation, so an endpoint being torn
/// down never races an in-flight dispatch. Handlers run under that lock and
/// must not call back into the dispatcher.
pub struct AggregateDispatcher {
    inner: Mutex<DispatcherInner>,
}

impl AggregateDispatcher {
    pub fn new(default_handler: Box<dyn UpdateHandler>) -> Self {
        Self {
            inner: Mutex::new(DispatcherInner {
                default_handler,
                registry: HandlerRegistry::new(),
                sessions: SessionArena::new(),
            }),
        }
    }

    /// Register `session` for `component`, replacing any previous session.
    pub fn register(&self, component: ComponentId, session: Box<dyn UpdateSession>) -> SessionHandle {
        let mut inner = self.inner.lock();
        let handle = inner.sessions.insert(session);
        if let Some(previous) = inner.registry.insert(component.clone(), handle) {
            inner.sessions.remove(previous);
            debug!(component = %component, replaced = %previous, "session replaced");
        }
        debug!(component = %component, session = %handle, "session registered");
        handle
    }

    pub fn unregister(&self, component: &ComponentId) -> bool {
        let mut inner = self.inner.lock();
        match inner.registry.remove(component) {
            Some(handle) => {
                inner.sessions.remove(handle);
                debug!(component = %component, session = %handle, "session unregistered");
                true
            }
            None => false,
        }
    }

    /// Drop every session of an endpoint. Returns how many were removed.
    pub fn unregister_all(&self, eid: EndpointId) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.registry.remove_endpoint(eid);
        for handle in &removed {
            inner.sessions.remove(*handle);
        }
        debug!(eid, removed = removed.len(), "endpoint sessions unregistered");
        removed.len()
    }

    /// Offer a command to the default handler, then to each registered
    /// session in order. The first claim wins.
    pub fn dispatch(&self, eid: EndpointId, command: u8, request: &[u8]) -> HandlerOutcome {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let outcome = inner.default_handler.handle_request(eid, command, request);
        if outcome.is_claimed() {
            trace!(eid, command, "claimed by default handler");
            return outcome;
        }

        for (component, handle) in inner.registry.iter() {
            let Some(session) = inner.sessions.get_mut(*handle) else {
                continue;
            };
            let outcome = session.handle_request(eid, command, request);
            if outcome.is_claimed() {
                trace!(eid, command, component = %component, "claimed by session");
                return outcome;
            }
        }

        debug!(eid, command, "command not expected by any session");
        HandlerOutcome::NotRecognized
    }

    /// Run `f` against a registered session.
    pub fn with_session<R>(
        &self,
        handle: SessionHandle,
        f: impl FnOnce(&mut dyn UpdateSession) -> R,
    ) -> Option<R> {
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(handle) {
            Some(session) => Some(f(session)),
            None => None,
        }
    }

    pub fn session_for(&self, component: &ComponentId) -> Option<SessionHandle> {
        self.inner.lock().registry.get(component)
    }

    pub fn is_registered(&self, component: &ComponentId) -> bool {
        self.session_for(component).is_some()
    }

    /// Registered components in dispatch order.
    pub fn components(&self) -> Vec<ComponentId> {
        self.inner
            .lock()
            .registry
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn handler_count(&self) -> usize {
        self.inner.lock().registry.len()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }
}

impl fmt::Debug for AggregateDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AggregateDispatcher")
            .field("registry", &inner.registry)
            .field("sessions", &inner.sessions)
            .finish()
    }
}
