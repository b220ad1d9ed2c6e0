//! ProvisioningTemplate CRD
//!
//! Describes how nodes of a class are configured: taints, scheduling
//! requirements, kubelet settings and the provider machine template.

use crate::scheduling::{KubeletConfiguration, MachineTemplateRef, NodeSelectorRequirement, Taint};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "compute.microscaler.io",
    version = "v1alpha1",
    kind = "ProvisioningTemplate",
    shortname = "ptpl"
)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningTemplateSpec {
    /// Taints applied to every node launched from this template
    #[serde(default)]
    pub taints: Vec<Taint>,

    /// Taints present only while a node bootstraps; removed by other agents
    #[serde(default)]
    pub startup_taints: Vec<Taint>,

    /// Scheduling requirements for nodes of this class
    #[serde(default)]
    pub requirements: Vec<NodeSelectorRequirement>,

    /// Kubelet configuration (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet: Option<KubeletConfiguration>,

    /// Reference to the provider machine template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<MachineTemplateRef>,

    /// Legacy inline provider block, kept for templates that predate `providerRef`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_object")]
    pub provider: Option<serde_json::Value>,
}

fn preserve_unknown_object(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
    schemars::json_schema!({
        "type": "object",
        "nullable": true,
        "x-kubernetes-preserve-unknown-fields": true
    })
}
