//! ---
//! pldm_section: "04-testing"
//! pldm_subsection: "integration-tests"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Integration and validation tests for the firmware-update stack."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use pldm_common::config::AppConfig;
use pldm_fw_update::{ConditionConfig, ConfigError};
use tempfile::tempdir;

fn repo_path(path: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(path)
}

fn read(path: &str) -> String {
    let full = repo_path(path);
    fs::read_to_string(&full)
        .unwrap_or_else(|err| panic!("failed to read {}: {}", full.display(), err))
}

#[test]
fn shipped_daemon_config_parses_and_validates() {
    let config: AppConfig = read("configs/fwupd.toml").parse().expect("valid config");
    assert_eq!(config.standalone.endpoints.len(), 2);
    assert_eq!(config.reactor.queue_depth, 64);
    assert!(config
        .standalone
        .endpoints
        .iter()
        .all(|endpoint| endpoint.board.as_deref()
            == Some("/xyz/openbmc_project/inventory/system/board/Riser")));
    assert_eq!(
        config.conditions.descriptor.as_deref(),
        Some(Path::new("configs/fw_update_conditions.json"))
    );
}

#[test]
fn shipped_descriptor_binds_standalone_components() {
    let config: AppConfig = read("configs/fwupd.toml").parse().expect("valid config");
    let bindings =
        ConditionConfig::load(repo_path("configs/fw_update_conditions.json")).expect("descriptor");
    assert_eq!(bindings.pre_service_for("BIOS"), "pldm-fw-bios-pre");
    assert_eq!(bindings.post_service_for("CPLD"), "pldm-fw-cpld-post");
    assert_eq!(bindings.pre_service_for("BMC"), "");

    let bound = config
        .standalone
        .endpoints
        .iter()
        .flat_map(|endpoint| endpoint.components.iter())
        .filter(|component| bindings.pair_for(&component.name).is_some())
        .count();
    assert_eq!(bound, 2);
}

#[test]
fn descriptor_io_and_parse_failures_are_distinguished() {
    let temp = tempdir().expect("tempdir");
    let missing = temp.path().join("missing.json");
    assert!(matches!(
        ConditionConfig::load(&missing),
        Err(ConfigError::Io { path, .. }) if path == missing
    ));

    let broken = temp.path().join("broken.json");
    fs::write(&broken, "{ \"Components\": [").expect("write descriptor");
    assert!(matches!(
        ConditionConfig::load(&broken),
        Err(ConfigError::Parse(_))
    ));

    let shapeless = temp.path().join("shapeless.json");
    fs::write(&shapeless, "{ \"Targets\": [] }").expect("write descriptor");
    assert!(ConditionConfig::load(&shapeless)
        .expect("valid json")
        .is_empty());
}
