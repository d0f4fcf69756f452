//! ---
//! pldm_section: "03-firmware-update"
//! pldm_subsection: "integration-tests"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Integration tests for the firmware-update event loop."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use std::sync::Arc;

use pldm_bus::{InMemoryObjectServer, InterfaceData, ObjectServer};
use pldm_common::config::InventoryConfig;
use pldm_fw_update::{
    AggregateDispatcher, ComponentId, ComponentInventoryModel, ComponentVersion, ConditionConfig,
    EndpointId, FirmwareInventory, HandlerOutcome, Reactor, ReactorError, ReactorHandle, ReactorStats,
    ResourceContext, SessionFactory, SoftwareBinding, StaticFirmwareInventory, UpdateHandler,
    UpdateSession, PLDM_FWUP_COMMAND_NOT_EXPECTED,
};
use tokio::task::JoinHandle;

const DEVICE: &str = "/xyz/openbmc_project/inventory/system/board/Riser/dev5";
const GET_STATUS: u8 = 0x1B;

struct EchoSession {
    name: String,
}

impl UpdateHandler for EchoSession {
    fn handle_request(&mut self, _eid: EndpointId, command: u8, request: &[u8]) -> HandlerOutcome {
        if command == GET_STATUS && request == self.name.as_bytes() {
            let mut response = vec![0x00];
            response.extend_from_slice(self.name.as_bytes());
            HandlerOutcome::Claimed(response)
        } else {
            HandlerOutcome::NotRecognized
        }
    }
}

impl UpdateSession for EchoSession {
    fn bind_software(&mut self, _binding: SoftwareBinding) {}
}

struct NeverClaims;

impl UpdateHandler for NeverClaims {
    fn handle_request(&mut self, _: EndpointId, _: u8, _: &[u8]) -> HandlerOutcome {
        HandlerOutcome::NotRecognized
    }
}

/// Builds sessions only for components the conditions descriptor knows.
struct BoundOnlyFactory;

impl SessionFactory for BoundOnlyFactory {
    fn create_session(
        &self,
        component: &ComponentId,
        resources: ResourceContext<'_>,
    ) -> Option<Box<dyn UpdateSession>> {
        resources.conditions.pair_for(&component.name)?;
        assert!(!resources.update_manager.is_registered(component));
        Some(Box::new(EchoSession {
            name: component.name.clone(),
        }))
    }
}

struct Running {
    handle: ReactorHandle,
    task: JoinHandle<ReactorStats>,
    inventory: Arc<ComponentInventoryModel>,
    firmware: Arc<StaticFirmwareInventory>,
}

fn start() -> Running {
    let server = Arc::new(InMemoryObjectServer::new());
    server
        .add_interface("/xyz/openbmc_project/inventory/system/board/Riser", InterfaceData::Board)
        .expect("board");
    server.add_interface(DEVICE, InterfaceData::Item).expect("device");
    let shared: Arc<dyn ObjectServer> = server;

    let dispatcher = Arc::new(AggregateDispatcher::new(Box::new(NeverClaims)));
    let inventory = Arc::new(ComponentInventoryModel::new(
        shared,
        Arc::clone(&dispatcher),
        &InventoryConfig::default(),
    ));
    let firmware = Arc::new(StaticFirmwareInventory::new());
    let conditions: ConditionConfig = r#"{
        "Components": [
            { "Component": "BMC", "PreSetupTarget": "bmc-pre", "PostSetupTarget": "bmc-post" },
            { "Component": "BIOS", "PreSetupTarget": "bios-pre", "PostSetupTarget": "bios-post" }
        ]
    }"#
    .parse()
    .expect("descriptor");

    let (reactor, handle) = Reactor::new(
        dispatcher,
        Arc::clone(&inventory),
        firmware.clone(),
        Arc::new(conditions),
        Box::new(BoundOnlyFactory),
        8,
    );
    Running {
        handle,
        task: tokio::spawn(reactor.run()),
        inventory,
        firmware,
    }
}

#[tokio::test]
async fn discovery_creates_sessions_that_claim_requests() {
    let running = start();
    running.firmware.record(
        5,
        vec![
            ComponentVersion::new("BMC", "1.0"),
            ComponentVersion::new("BIOS", "2.0"),
            ComponentVersion::new("NIC", "3.0"),
        ],
    );

    let created = running.handle.discover(5, DEVICE).await.expect("discover");
    assert_eq!(created, 2);
    assert_eq!(
        running.inventory.components_of(5),
        vec![ComponentId::new(5, "BIOS"), ComponentId::new(5, "BMC")]
    );

    let response = running
        .handle
        .request(5, GET_STATUS, b"BIOS".to_vec())
        .await
        .expect("response");
    assert_eq!(response, b"\x00BIOS".to_vec());

    let unclaimed = running
        .handle
        .request(5, GET_STATUS, b"NIC".to_vec())
        .await
        .expect("response");
    assert_eq!(unclaimed, vec![PLDM_FWUP_COMMAND_NOT_EXPECTED]);
    assert_eq!(running.inventory.components_of(5).len(), 2);

    running.handle.shutdown().await.expect("shutdown");
    let stats = running.task.await.expect("reactor joined");
    assert_eq!(
        stats,
        ReactorStats {
            requests: 2,
            unclaimed: 1,
            components_created: 2,
        }
    );
}

#[tokio::test]
async fn endpoint_removal_unroutes_its_sessions() {
    let running = start();
    running
        .firmware
        .record(5, vec![ComponentVersion::new("BIOS", "2.0")]);
    running.handle.discover(5, DEVICE).await.expect("discover");

    let removed = running.handle.remove_endpoint(5).await.expect("remove");
    assert_eq!(removed, 1);
    assert_eq!(running.inventory.component_count(), 0);
    assert!(running.inventory.inventory_path(5).is_none());
    assert!(running.firmware.component_versions(5).is_empty());

    let response = running
        .handle
        .request(5, GET_STATUS, b"BIOS".to_vec())
        .await
        .expect("response");
    assert_eq!(response, vec![PLDM_FWUP_COMMAND_NOT_EXPECTED]);

    assert_eq!(running.handle.discover(5, DEVICE).await.expect("rediscover"), 0);
    assert_eq!(running.inventory.component_count(), 0);
    running.handle.shutdown().await.expect("shutdown");
    running.task.await.expect("reactor joined");
}

#[tokio::test]
async fn discovery_without_recorded_firmware_creates_nothing() {
    let running = start();

    assert_eq!(running.handle.discover(5, DEVICE).await.expect("discover"), 0);
    running.handle.shutdown().await.expect("shutdown");
    let stats = running.task.await.expect("reactor joined");

    assert_eq!(stats.components_created, 0);
    assert_eq!(running.inventory.inventory_path(5).as_deref(), Some(DEVICE));
}

#[tokio::test]
async fn handle_reports_closed_after_shutdown() {
    let running = start();
    running.handle.shutdown().await.expect("shutdown");
    running.task.await.expect("reactor joined");

    assert!(matches!(
        running.handle.request(5, GET_STATUS, Vec::new()).await,
        Err(ReactorError::Closed)
    ));
    assert!(matches!(
        running.handle.discover(5, DEVICE).await,
        Err(ReactorError::Closed)
    ));
}
