//! Field hydration.
//!
//! Pure derivation of a `Machine` from a node, its resolved template and the
//! cloud instance backing it. Nothing here performs I/O, so the whole mapping
//! is covered by plain unit tests.

use crate::template::{ResolvedTemplate, TemplateSource};
use cloud_client::Instance;
use crds::keys::{
    self, HYDRATED_FROM_NODE_ANNOTATION, INLINE_PROVIDER_KIND, LABEL_ARCH, LABEL_INSTANCE_TYPE,
    LABEL_OS, LABEL_TOPOLOGY_REGION, LABEL_TOPOLOGY_ZONE, MACHINE_NAME_TAG,
    PROVIDER_COMPATIBILITY_ANNOTATION, PROVIDER_ID_HASH_LABEL, TEMPLATE_NAME_LABEL,
};
use crds::{
    provider_id_hash, Machine, MachineSpec, MachineStatus, MachineTemplateRef,
    NodeSelectorRequirement, Taint, TaintEffect, CONDITION_HYDRATED,
};
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use thiserror::Error;

/// Maximum length of a DNS-1123 subdomain (and therefore a Machine name)
const MAX_NAME_LEN: usize = 253;

/// Prefix of names synthesized from a provider-ID hash
const SYNTHESIZED_NAME_PREFIX: &str = "machine-";

/// Node taints owned by the node lifecycle and cloud controllers
const NODE_CONDITION_TAINT_PREFIX: &str = "node.kubernetes.io/";
const UNINITIALIZED_TAINT: &str = "node.cloudprovider.kubernetes.io/uninitialized";

/// Reason recorded on the `Hydrated` condition
pub const HYDRATED_REASON: &str = "HydratedFromNode";

/// Errors deriving a Machine. All of them are permanent: retrying with the
/// same inputs cannot succeed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DerivationError {
    #[error("template {0} has neither providerRef nor provider")]
    MissingMachineTemplate(String),

    #[error("template {0} sets both providerRef and provider")]
    AmbiguousMachineTemplate(String),

    #[error("template {0} has a providerRef without a name")]
    EmptyTemplateRefName(String),

    #[error("node taint {key} has unknown effect {effect:?}")]
    InvalidTaintEffect { key: String, effect: String },

    #[error("instance tag names an invalid Machine name {0:?}")]
    InvalidMachineName(String),

    #[error("failed to serialize legacy provider block: {0}")]
    Serialization(String),
}

/// Everything a Machine is derived from
#[derive(Debug, Clone, Copy)]
pub struct HydrationInput<'a> {
    pub node: &'a Node,
    pub template: &'a ResolvedTemplate,
    pub instance: &'a Instance,
    pub provider_id: &'a str,
    pub machine_name: &'a str,
}

/// Build the Machine for a node, status included.
///
/// The status is carried on the returned object but the API server ignores it
/// on create; callers write it through the status subresource afterwards.
pub fn hydrate(input: &HydrationInput<'_>) -> Result<Machine, DerivationError> {
    let HydrationInput { node, template, instance, provider_id, machine_name } = *input;
    let node_name = node.metadata.name.clone().unwrap_or_default();

    let mut labels = node.metadata.labels.clone().unwrap_or_default();
    labels.insert(TEMPLATE_NAME_LABEL.to_string(), template.name.clone());
    labels.insert(PROVIDER_ID_HASH_LABEL.to_string(), provider_id_hash(provider_id));

    let mut annotations = BTreeMap::new();
    annotations.insert(HYDRATED_FROM_NODE_ANNOTATION.to_string(), node_name);

    let machine_template_ref = match &template.source {
        TemplateSource::StructuredRef(reference) => reference.clone(),
        TemplateSource::LegacyInline(provider) => {
            let serialized = serde_json::to_string(provider)
                .map_err(|e| DerivationError::Serialization(e.to_string()))?;
            annotations.insert(PROVIDER_COMPATIBILITY_ANNOTATION.to_string(), serialized);
            MachineTemplateRef {
                api_version: Some(keys::api_version()),
                kind: Some(INLINE_PROVIDER_KIND.to_string()),
                name: template.name.clone(),
            }
        }
    };

    let spec = MachineSpec {
        taints: derive_taints(node, template)?,
        startup_taints: Vec::new(),
        requirements: derive_requirements(node, template, instance),
        kubelet: template.kubelet.clone(),
        machine_template_ref: Some(machine_template_ref),
    };

    Ok(Machine {
        metadata: ObjectMeta {
            name: Some(machine_name.to_string()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec,
        status: Some(hydrated_status(node, Some(instance), provider_id)),
    })
}

/// Status sub-object for a Machine hydrated from `node`
pub fn hydrated_status(node: &Node, instance: Option<&Instance>, provider_id: &str) -> MachineStatus {
    let node_status = node.status.as_ref();
    let private_dns_name = instance
        .and_then(|i| i.private_dns_name.clone())
        .filter(|n| !n.is_empty())
        .or_else(|| {
            node_status
                .and_then(|s| s.addresses.as_ref())
                .and_then(|addrs| addrs.iter().find(|a| a.type_ == "InternalDNS"))
                .map(|a| a.address.clone())
        });

    let mut status = MachineStatus {
        provider_id: Some(provider_id.to_string()),
        node_name: node.metadata.name.clone(),
        private_dns_name,
        capacity: quantities(node_status.and_then(|s| s.capacity.as_ref())),
        allocatable: quantities(node_status.and_then(|s| s.allocatable.as_ref())),
        conditions: Vec::new(),
    };
    status.set_condition_true(CONDITION_HYDRATED, HYDRATED_REASON);
    status
}

fn quantities(source: Option<&BTreeMap<String, Quantity>>) -> BTreeMap<String, String> {
    source
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.0.clone())).collect())
        .unwrap_or_default()
}

/// Template taints and node taints, deduplicated by key and effect, with
/// startup taints and controller-owned condition taints removed.
fn derive_taints(node: &Node, template: &ResolvedTemplate) -> Result<Vec<Taint>, DerivationError> {
    let mut node_taints = Vec::new();
    for taint in node.spec.as_ref().and_then(|s| s.taints.as_ref()).into_iter().flatten() {
        if taint.key.starts_with(NODE_CONDITION_TAINT_PREFIX) || taint.key == UNINITIALIZED_TAINT {
            continue;
        }
        let effect = TaintEffect::parse(&taint.effect).ok_or_else(|| DerivationError::InvalidTaintEffect {
            key: taint.key.clone(),
            effect: taint.effect.clone(),
        })?;
        node_taints.push(Taint::new(taint.key.clone(), taint.value.as_deref(), effect));
    }

    let mut taints: Vec<Taint> = Vec::new();
    for taint in template.taints.iter().cloned().chain(node_taints) {
        if template.startup_taints.iter().any(|s| s.matches(&taint)) {
            continue;
        }
        if taints.iter().any(|t| t.matches(&taint)) {
            continue;
        }
        taints.push(taint);
    }
    Ok(taints)
}

/// Template requirements, preceded by single-value requirements observed on
/// the node for keys the template leaves unconstrained. The template wins per
/// key so the result never carries two requirements on one key.
fn derive_requirements(
    node: &Node,
    template: &ResolvedTemplate,
    instance: &Instance,
) -> Vec<NodeSelectorRequirement> {
    let labels = node.metadata.labels.as_ref();
    let label = |key: &str| labels.and_then(|l| l.get(key)).cloned();
    let constrained = |key: &str| template.requirements.iter().any(|r| r.key == key);

    let observed = [
        (LABEL_TOPOLOGY_ZONE, label(LABEL_TOPOLOGY_ZONE).or_else(|| instance.zone.clone())),
        (LABEL_TOPOLOGY_REGION, label(LABEL_TOPOLOGY_REGION)),
        (LABEL_OS, label(LABEL_OS)),
        (LABEL_ARCH, label(LABEL_ARCH)),
        (LABEL_INSTANCE_TYPE, label(LABEL_INSTANCE_TYPE).or_else(|| instance.instance_type.clone())),
    ];

    let mut requirements: Vec<NodeSelectorRequirement> = Vec::new();
    let derived = observed
        .into_iter()
        .filter(|(key, _)| !constrained(key))
        .filter_map(|(key, value)| value.filter(|v| !v.is_empty()).map(|v| NodeSelectorRequirement::single(key, v)));
    for requirement in derived.chain(template.requirements.iter().cloned()) {
        if !requirements.contains(&requirement) {
            requirements.push(requirement);
        }
    }
    requirements
}

/// Machine name for an instance: its machine-name tag when present, otherwise
/// a name synthesized from the provider-ID. The tag value is used as-is.
pub fn machine_name(instance: &Instance, provider_id: &str) -> Result<String, DerivationError> {
    match instance.tag(MACHINE_NAME_TAG).filter(|n| !n.is_empty()) {
        Some(tagged) if is_dns1123_subdomain(tagged) => Ok(tagged.to_string()),
        Some(tagged) => Err(DerivationError::InvalidMachineName(tagged.to_string())),
        None => Ok(synthesize_name(provider_id)),
    }
}

/// `machine-<hash>`, a function of the provider-ID alone. Every creator for
/// one instance picks the same name whatever node or template it came from,
/// so the store's name uniqueness admits only one of them.
pub fn synthesize_name(provider_id: &str) -> String {
    format!("{}{}", SYNTHESIZED_NAME_PREFIX, provider_id_hash(provider_id))
}

/// RFC 1123 subdomain, as required for cluster-scoped object names
pub fn is_dns1123_subdomain(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    name.split('.').all(|label| {
        let bytes = label.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                alnum(first) && alnum(last) && bytes.iter().all(|b| alnum(b) || *b == b'-')
            }
            _ => false,
        }
    })
}

#[cfg(test)]
#[path = "hydrator_test.rs"]
mod tests;
