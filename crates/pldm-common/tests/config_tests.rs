//! ---
//! pldm_section: "01-core-functionality"
//! pldm_subsection: "integration-tests"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Configuration loading and tracing bootstrap tests."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use std::fs;

use pldm_common::config::AppConfig;
use pldm_common::logging::{init_tracing, LogFormat};
use tempfile::tempdir;

const SAMPLE: &str = r#"
[logging]
directory = "LOGDIR"
format = "pretty"

[inventory]
software_root = "/xyz/openbmc_project/software"

[conditions]
descriptor = "/usr/share/pldm/fw_update_conditions.json"

[[standalone.endpoints]]
eid = 5
inventory_path = "/xyz/openbmc_project/inventory/system/board/Riser/dev5"
components = [
    { name = "BMC", version = "1.2.3" },
    { name = "BIOS" },
]
"#;

#[test]
fn load_with_source_picks_first_existing_candidate() {
    let temp = tempdir().expect("tempdir");
    let missing = temp.path().join("missing.toml");
    let present = temp.path().join("fwupd.toml");
    let log_dir = temp.path().join("logs");
    fs::write(
        &present,
        SAMPLE.replace("LOGDIR", &log_dir.display().to_string()),
    )
    .expect("write config");

    let loaded = AppConfig::load_with_source(&[missing, present.clone()]).expect("config loads");
    assert_eq!(loaded.source, present);
    assert_eq!(loaded.config.logging.format, LogFormat::Pretty);
    assert_eq!(loaded.config.standalone.endpoints.len(), 1);
    let endpoint = &loaded.config.standalone.endpoints[0];
    assert_eq!(endpoint.eid, 5);
    assert_eq!(endpoint.components[0].version, "1.2.3");
    assert!(endpoint.components[1].version.is_empty());
}

#[test]
fn load_reports_all_inspected_candidates() {
    let temp = tempdir().expect("tempdir");
    let err = AppConfig::load(&[temp.path().join("a.toml"), temp.path().join("b.toml")])
        .expect_err("no candidates exist");
    let message = err.to_string();
    assert!(message.contains("a.toml"));
    assert!(message.contains("b.toml"));
}

#[test]
fn init_tracing_creates_log_directory() {
    let temp = tempdir().expect("tempdir");
    let mut config = AppConfig::default();
    config.logging.directory = temp.path().join("nested").join("logs");
    init_tracing("pldm-fwupd-test", &config.logging).expect("tracing initialises");
    assert!(config.logging.directory.is_dir());
}
