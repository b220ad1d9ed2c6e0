//! Scheduling types shared by `ProvisioningTemplate` and `Machine`
//!
//! These mirror the core Kubernetes taint and node selector types, but derive
//! `JsonSchema` so they can be embedded in the CRD schemas.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Taint effect
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

impl TaintEffect {
    /// Parse the effect string used by core/v1 taints
    pub fn parse(effect: &str) -> Option<Self> {
        match effect {
            "NoSchedule" => Some(Self::NoSchedule),
            "PreferNoSchedule" => Some(Self::PreferNoSchedule),
            "NoExecute" => Some(Self::NoExecute),
            _ => None,
        }
    }
}

/// A taint applied to the node backing a Machine
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Taint {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    pub effect: TaintEffect,
}

impl Taint {
    /// Create a taint
    pub fn new(key: impl Into<String>, value: Option<&str>, effect: TaintEffect) -> Self {
        Self {
            key: key.into(),
            value: value.map(str::to_string),
            effect,
        }
    }

    /// Taints are identified by key and effect; the value does not participate.
    pub fn matches(&self, other: &Taint) -> bool {
        self.key == other.key && self.effect == other.effect
    }
}

/// Node selector operator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum NodeSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

/// A scheduling requirement (key/operator/values)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: NodeSelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

impl NodeSelectorRequirement {
    /// Single-value `In` requirement
    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operator: NodeSelectorOperator::In,
            values: vec![value.into()],
        }
    }
}

/// Kubelet configuration carried from the template to the Machine
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfiguration {
    /// DNS server addresses handed to pods
    #[serde(default, rename = "clusterDNS", skip_serializing_if = "Vec::is_empty")]
    #[schemars(rename = "clusterDNS")]
    pub cluster_dns: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_runtime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pods: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods_per_core: Option<i32>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub system_reserved: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kube_reserved: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub eviction_hard: BTreeMap<String, String>,

    #[serde(default, rename = "cpuCFSQuota", skip_serializing_if = "Option::is_none")]
    #[schemars(rename = "cpuCFSQuota")]
    pub cpu_cfs_quota: Option<bool>,
}

/// Reference to the provider-specific machine template resource
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineTemplateRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taint_identity_ignores_value() {
        let a = Taint::new("dedicated", Some("gpu"), TaintEffect::NoSchedule);
        let b = Taint::new("dedicated", Some("cpu"), TaintEffect::NoSchedule);
        let c = Taint::new("dedicated", Some("gpu"), TaintEffect::NoExecute);
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_kubelet_field_names() {
        let kubelet = KubeletConfiguration {
            cluster_dns: vec!["10.0.0.1".to_string()],
            container_runtime: Some("containerd".to_string()),
            max_pods: Some(10),
            ..Default::default()
        };
        let value = serde_json::to_value(&kubelet).unwrap();
        assert_eq!(value["clusterDNS"][0], "10.0.0.1");
        assert_eq!(value["containerRuntime"], "containerd");
        assert_eq!(value["maxPods"], 10);
        assert!(value.get("systemReserved").is_none());
    }
}
