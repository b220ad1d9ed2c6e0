//! Machine CRD
//!
//! One Machine exists per cloud instance. The hydration controller backfills
//! Machines for nodes launched before the resource kind existed; later
//! lifecycle belongs to other controllers.

use crate::scheduling::{KubeletConfiguration, MachineTemplateRef, NodeSelectorRequirement, Taint};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Condition set once the Machine has been derived from its node
pub const CONDITION_HYDRATED: &str = "Hydrated";

/// Condition set once the cloud instance carries the machine-name and cluster tags
pub const CONDITION_INSTANCE_TAGGED: &str = "InstanceTagged";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "compute.microscaler.io",
    version = "v1alpha1",
    kind = "Machine",
    status = "MachineStatus",
    shortname = "mach",
    printcolumn = r#"{"name":"ProviderID","type":"string","jsonPath":".status.providerID"}"#,
    printcolumn = r#"{"name":"Node","type":"string","jsonPath":".status.nodeName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    #[serde(default)]
    pub taints: Vec<Taint>,

    /// Always empty for hydrated Machines so bootstrap taints are not re-applied
    #[serde(default)]
    pub startup_taints: Vec<Taint>,

    #[serde(default)]
    pub requirements: Vec<NodeSelectorRequirement>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet: Option<KubeletConfiguration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_template_ref: Option<MachineTemplateRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Provider-ID of the backing instance
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    #[schemars(rename = "providerID")]
    pub provider_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_dns_name: Option<String>,

    /// Resource quantities as reported by the node
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capacity: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub allocatable: BTreeMap<String, String>,

    #[serde(default)]
    pub conditions: Vec<MachineCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineCondition {
    #[serde(rename = "type")]
    #[schemars(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl MachineStatus {
    /// Whether the named condition is present with status "True"
    pub fn is_condition_true(&self, type_: &str) -> bool {
        self.conditions
            .iter()
            .any(|c| c.type_ == type_ && c.status == "True")
    }

    /// Set a condition to "True", keeping the transition time when it already was
    pub fn set_condition_true(&mut self, type_: &str, reason: &str) {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) {
            if existing.status != "True" {
                existing.status = "True".to_string();
                existing.last_transition_time = Some(chrono::Utc::now());
            }
            existing.reason = Some(reason.to_string());
            existing.message = None;
            return;
        }
        self.conditions.push(MachineCondition {
            type_: type_.to_string(),
            status: "True".to_string(),
            reason: Some(reason.to_string()),
            message: None,
            last_transition_time: Some(chrono::Utc::now()),
        });
    }
}

impl Machine {
    /// Provider-ID recorded in status, if any
    pub fn provider_id(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.provider_id.as_deref())
    }

    /// True once both instance tags are known to be written
    pub fn is_instance_tagged(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.is_condition_true(CONDITION_INSTANCE_TAGGED))
    }

    /// Whether this Machine belongs to `provider_id`, by status or by hash label
    pub fn belongs_to(&self, provider_id: &str) -> bool {
        if let Some(recorded) = self.provider_id() {
            return recorded == provider_id;
        }
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(crate::keys::PROVIDER_ID_HASH_LABEL))
            .is_some_and(|h| *h == provider_id_hash(provider_id))
    }
}

/// Deterministic, label-safe hash of a provider-ID (32 lowercase hex chars)
pub fn provider_id_hash(provider_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, provider_id.as_bytes())
        .simple()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PROVIDER_ID_HASH_LABEL;

    #[test]
    fn test_provider_id_hash_is_stable_and_label_safe() {
        let a = provider_id_hash("aws:///us-west-2a/i-0123456789abcdef0");
        let b = provider_id_hash("aws:///us-west-2a/i-0123456789abcdef0");
        let c = provider_id_hash("aws:///us-west-2a/i-0fedcba9876543210");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn test_set_condition_true_is_idempotent() {
        let mut status = MachineStatus::default();
        status.set_condition_true(CONDITION_INSTANCE_TAGGED, "TagsApplied");
        let first = status.conditions[0].last_transition_time;
        status.set_condition_true(CONDITION_INSTANCE_TAGGED, "TagsApplied");
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].last_transition_time, first);
        assert!(status.is_condition_true(CONDITION_INSTANCE_TAGGED));
        assert!(!status.is_condition_true(CONDITION_HYDRATED));
    }

    #[test]
    fn test_belongs_to_uses_label_before_status_is_written() {
        let pid = "aws:///us-west-2a/i-0abc";
        let mut machine = Machine::new("m-1", MachineSpec::default());
        assert!(!machine.belongs_to(pid));

        machine.metadata.labels = Some(
            [(PROVIDER_ID_HASH_LABEL.to_string(), provider_id_hash(pid))]
                .into_iter()
                .collect(),
        );
        assert!(machine.belongs_to(pid));

        machine.status = Some(MachineStatus {
            provider_id: Some("aws:///us-west-2a/i-other".to_string()),
            ..Default::default()
        });
        assert!(!machine.belongs_to(pid));
    }

    #[test]
    fn test_status_serializes_provider_id_key() {
        let status = MachineStatus {
            provider_id: Some("aws:///zone/i-1".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["providerID"], "aws:///zone/i-1");
    }
}
