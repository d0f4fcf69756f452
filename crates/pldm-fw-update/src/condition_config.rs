//! ---
//! pldm_section: "03-firmware-update"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Firmware-update dispatch, inventory and condition gating."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::ConfigError;

const COMPONENTS_KEY: &str = "Components";
const COMPONENT_KEY: &str = "Component";
const PRE_SETUP_KEY: &str = "PreSetupTarget";
const POST_SETUP_KEY: &str = "PostSetupTarget";

/// Service templates run before and after updating a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConditionPair {
    pub pre: String,
    pub post: String,
}

/// Component name to pre/post setup targets, immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct ConditionConfig {
    bindings: HashMap<String, ServiceConditionPair>,
}

impl ConditionConfig {
    /// Read and parse a descriptor file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Value = serde_json::from_str(&contents)?;
        Ok(Self::from_value(&document, &path.display().to_string()))
    }

    /// Build the bindings from a parsed descriptor. Entries missing a
    /// required field are skipped.
    pub fn from_value(document: &Value, source: &str) -> Self {
        let mut bindings = HashMap::new();
        let Some(components) = document.get(COMPONENTS_KEY).and_then(Value::as_array) else {
            error!(source, "bad condition descriptor format, no component array");
            return Self { bindings };
        };

        for (index, component) in components.iter().enumerate() {
            let field = |key: &str| component.get(key).and_then(Value::as_str);
            let (Some(name), Some(pre), Some(post)) = (
                field(COMPONENT_KEY),
                field(PRE_SETUP_KEY),
                field(POST_SETUP_KEY),
            ) else {
                warn!(source, index, "bad component attributes, entry skipped");
                continue;
            };
            if bindings.contains_key(name) {
                warn!(source, component = name, "duplicate component binding ignored");
                continue;
            }
            bindings.insert(
                name.to_owned(),
                ServiceConditionPair {
                    pre: pre.to_owned(),
                    post: post.to_owned(),
                },
            );
        }
        debug!(source, bindings = bindings.len(), "condition bindings loaded");
        Self { bindings }
    }

    /// Pre-update service template, empty when none is bound.
    pub fn pre_service_for(&self, name: &str) -> &str {
        self.bindings.get(name).map_or("", |pair| pair.pre.as_str())
    }

    /// Post-update service template, empty when none is bound.
    pub fn post_service_for(&self, name: &str) -> &str {
        self.bindings.get(name).map_or("", |pair| pair.post.as_str())
    }

    pub fn pair_for(&self, name: &str) -> Option<&ServiceConditionPair> {
        self.bindings.get(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl std::str::FromStr for ConditionConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let document: Value = serde_json::from_str(content)?;
        Ok(Self::from_value(&document, "<inline>"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn incomplete_entries_are_skipped() {
        let document = json!({
            "Components": [
                { "Component": "BIOS", "PreSetupTarget": "bios-pre", "PostSetupTarget": "bios-post" },
                { "Component": "BMC", "PreSetupTarget": "bmc-pre" },
                { "Component": 7, "PreSetupTarget": "x", "PostSetupTarget": "y" },
                "garbage"
            ]
        });
        let config = ConditionConfig::from_value(&document, "test");
        assert_eq!(config.len(), 1);
        assert_eq!(config.pre_service_for("BIOS"), "bios-pre");
        assert_eq!(config.post_service_for("BIOS"), "bios-post");
        assert!(config.pair_for("BMC").is_none());
    }

    #[test]
    fn unknown_component_lookups_are_empty() {
        let config: ConditionConfig = r#"{"Components": []}"#.parse().expect("valid json");
        assert!(config.is_empty());
        assert_eq!(config.pre_service_for("CPLD"), "");
        assert_eq!(config.post_service_for("CPLD"), "");
        assert!(config.pair_for("CPLD").is_none());
    }

    #[test]
    fn missing_component_array_yields_empty_bindings() {
        let config = ConditionConfig::from_value(&json!({ "Components": {} }), "test");
        assert!(config.is_empty());
    }

    #[test]
    fn first_binding_wins_on_duplicates() {
        let document = json!({
            "Components": [
                { "Component": "BIOS", "PreSetupTarget": "first", "PostSetupTarget": "first" },
                { "Component": "BIOS", "PreSetupTarget": "second", "PostSetupTarget": "second" }
            ]
        });
        let config = ConditionConfig::from_value(&document, "test");
        assert_eq!(config.pre_service_for("BIOS"), "first");
    }

    #[test]
    fn load_reads_descriptor_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fw_update_conditions.json");
        std::fs::write(
            &path,
            r#"{"Components": [{"Component": "CPLD", "PreSetupTarget": "cpld-pre", "PostSetupTarget": "cpld-post"}]}"#,
        )
        .expect("write descriptor");
        let config = ConditionConfig::load(&path).expect("descriptor loads");
        assert_eq!(
            config.pair_for("CPLD"),
            Some(&ServiceConditionPair {
                pre: "cpld-pre".into(),
                post: "cpld-post".into(),
            })
        );
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(
            "{ not json".parse::<ConditionConfig>(),
            Err(ConfigError::Parse(_))
        ));
    }
}
