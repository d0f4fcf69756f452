//! ---
//! pldm_section: "03-firmware-update"
//! pldm_subsection: "integration-tests"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Integration tests for command dispatch."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pldm_fw_update::{
    AggregateDispatcher, ComponentId, EndpointId, HandlerOutcome, SoftwareBinding, UpdateHandler,
    UpdateSession, PLDM_FWUP_COMMAND_NOT_EXPECTED,
};

const REQUEST_FIRMWARE_DATA: u8 = 0x15;
const TRANSFER_COMPLETE: u8 = 0x16;

/// Handler that claims a fixed set of commands and counts every attempt.
struct ScriptedSession {
    claims: Vec<u8>,
    reply: Vec<u8>,
    attempts: Arc<AtomicUsize>,
}

impl ScriptedSession {
    fn new(claims: &[u8], reply: &[u8], attempts: &Arc<AtomicUsize>) -> Box<Self> {
        Box::new(Self {
            claims: claims.to_vec(),
            reply: reply.to_vec(),
            attempts: Arc::clone(attempts),
        })
    }
}

impl UpdateHandler for ScriptedSession {
    fn handle_request(&mut self, _eid: EndpointId, command: u8, _request: &[u8]) -> HandlerOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.claims.contains(&command) {
            HandlerOutcome::Claimed(self.reply.clone())
        } else {
            HandlerOutcome::NotRecognized
        }
    }
}

impl UpdateSession for ScriptedSession {
    fn bind_software(&mut self, _binding: SoftwareBinding) {}
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[test]
fn default_handler_claim_skips_component_sessions() {
    let default_attempts = counter();
    let session_attempts = counter();
    let dispatcher = AggregateDispatcher::new(ScriptedSession::new(
        &[REQUEST_FIRMWARE_DATA],
        &[0x00, 0xAA],
        &default_attempts,
    ));
    for name in ["BMC", "BIOS", "CPLD"] {
        dispatcher.register(
            ComponentId::new(5, name),
            ScriptedSession::new(&[REQUEST_FIRMWARE_DATA], &[0x00, 0xBB], &session_attempts),
        );
    }

    let outcome = dispatcher.dispatch(5, REQUEST_FIRMWARE_DATA, &[1, 2, 3]);

    assert_eq!(outcome, HandlerOutcome::Claimed(vec![0x00, 0xAA]));
    assert_eq!(default_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(session_attempts.load(Ordering::SeqCst), 0);
}

#[test]
fn unclaimed_command_tries_every_handler_once() {
    let attempts = counter();
    let dispatcher = AggregateDispatcher::new(ScriptedSession::new(&[], &[], &attempts));
    let registered = 4;
    for index in 0..registered {
        dispatcher.register(
            ComponentId::new(9, format!("FW{index}")),
            ScriptedSession::new(&[TRANSFER_COMPLETE], &[0x00], &attempts),
        );
    }

    let outcome = dispatcher.dispatch(9, REQUEST_FIRMWARE_DATA, &[]);

    assert_eq!(outcome, HandlerOutcome::NotRecognized);
    assert_eq!(outcome.into_response(), vec![PLDM_FWUP_COMMAND_NOT_EXPECTED]);
    assert_eq!(attempts.load(Ordering::SeqCst), registered + 1);
}

#[test]
fn first_claiming_session_in_registration_order_wins() {
    let attempts = counter();
    let dispatcher = AggregateDispatcher::new(ScriptedSession::new(&[], &[], &attempts));
    dispatcher.register(
        ComponentId::new(5, "BMC"),
        ScriptedSession::new(&[], &[], &attempts),
    );
    dispatcher.register(
        ComponentId::new(5, "BIOS"),
        ScriptedSession::new(&[TRANSFER_COMPLETE], &[0x00, 0x01], &attempts),
    );
    dispatcher.register(
        ComponentId::new(5, "CPLD"),
        ScriptedSession::new(&[TRANSFER_COMPLETE], &[0x00, 0x02], &attempts),
    );

    let outcome = dispatcher.dispatch(5, TRANSFER_COMPLETE, &[]);

    assert_eq!(outcome, HandlerOutcome::Claimed(vec![0x00, 0x01]));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn unregister_all_stops_routing_to_endpoint_sessions() {
    let attempts = counter();
    let dispatcher = AggregateDispatcher::new(ScriptedSession::new(&[], &[], &attempts));
    dispatcher.register(
        ComponentId::new(5, "BMC"),
        ScriptedSession::new(&[], &[], &attempts),
    );
    dispatcher.register(
        ComponentId::new(5, "BIOS"),
        ScriptedSession::new(&[REQUEST_FIRMWARE_DATA], &[0x00, 0x42], &attempts),
    );

    assert_eq!(
        dispatcher.dispatch(5, REQUEST_FIRMWARE_DATA, &[]).into_response(),
        vec![0x00, 0x42]
    );

    assert_eq!(dispatcher.unregister_all(5), 2);
    assert_eq!(
        dispatcher.dispatch(5, REQUEST_FIRMWARE_DATA, &[]).into_response(),
        vec![PLDM_FWUP_COMMAND_NOT_EXPECTED]
    );
    assert_eq!(dispatcher.handler_count(), 0);
    assert_eq!(dispatcher.session_count(), 0);
}

#[test]
fn removing_an_endpoint_keeps_relative_order_of_others() {
    let attempts = counter();
    let dispatcher = AggregateDispatcher::new(ScriptedSession::new(&[], &[], &attempts));
    let order = [(1, "A"), (2, "B"), (1, "C"), (3, "D"), (2, "E")];
    for (eid, name) in order {
        dispatcher.register(
            ComponentId::new(eid, name),
            ScriptedSession::new(&[], &[], &attempts),
        );
    }

    dispatcher.unregister_all(1);

    let remaining: Vec<String> = dispatcher
        .components()
        .into_iter()
        .map(|component| component.name)
        .collect();
    assert_eq!(remaining, ["B", "D", "E"]);
}

#[test]
fn re_registering_a_component_replaces_its_session_in_place() {
    let attempts = counter();
    let dispatcher = AggregateDispatcher::new(ScriptedSession::new(&[], &[], &attempts));
    let bios = ComponentId::new(5, "BIOS");
    dispatcher.register(
        ComponentId::new(5, "BMC"),
        ScriptedSession::new(&[], &[], &attempts),
    );
    let first = dispatcher.register(
        bios.clone(),
        ScriptedSession::new(&[TRANSFER_COMPLETE], &[0x01], &attempts),
    );
    dispatcher.register(
        ComponentId::new(5, "CPLD"),
        ScriptedSession::new(&[], &[], &attempts),
    );
    let second = dispatcher.register(
        bios.clone(),
        ScriptedSession::new(&[TRANSFER_COMPLETE], &[0x02], &attempts),
    );

    assert_ne!(first, second);
    assert_eq!(dispatcher.session_for(&bios), Some(second));
    assert_eq!(dispatcher.session_count(), 3);
    assert_eq!(dispatcher.components()[1], bios);
    assert!(dispatcher.with_session(first, |_| ()).is_none());
    assert_eq!(
        dispatcher.dispatch(5, TRANSFER_COMPLETE, &[]),
        HandlerOutcome::Claimed(vec![0x02])
    );
}
