//! Template resolution.
//!
//! Fetches the `ProvisioningTemplate` named by a node's label and resolves its
//! two machine template forms into a single tagged variant, so the hydrator
//! never has to look at both fields.

use crate::error::ControllerError;
use crate::hydrator::DerivationError;
use crds::{
    KubeletConfiguration, MachineTemplateRef, NodeSelectorRequirement, ProvisioningTemplate, Taint,
};
use kube::{Api, ResourceExt};

/// Where a template's machine template comes from
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSource {
    /// `spec.providerRef`
    StructuredRef(MachineTemplateRef),
    /// Legacy `spec.provider` inline block
    LegacyInline(serde_json::Value),
}

/// A `ProvisioningTemplate` with its reference form resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTemplate {
    pub name: String,
    pub taints: Vec<Taint>,
    pub startup_taints: Vec<Taint>,
    pub requirements: Vec<NodeSelectorRequirement>,
    pub kubelet: Option<KubeletConfiguration>,
    pub source: TemplateSource,
}

impl ResolvedTemplate {
    /// Resolve a template resource. Fails when it names no machine template,
    /// names both forms, or carries a reference without a name.
    pub fn from_resource(template: &ProvisioningTemplate) -> Result<Self, DerivationError> {
        let name = template.name_any();
        let spec = &template.spec;

        let source = match (&spec.provider_ref, &spec.provider) {
            (Some(_), Some(_)) => return Err(DerivationError::AmbiguousMachineTemplate(name)),
            (Some(reference), None) => {
                if reference.name.trim().is_empty() {
                    return Err(DerivationError::EmptyTemplateRefName(name));
                }
                TemplateSource::StructuredRef(reference.clone())
            }
            (None, Some(provider)) => TemplateSource::LegacyInline(provider.clone()),
            (None, None) => return Err(DerivationError::MissingMachineTemplate(name)),
        };

        Ok(Self {
            name,
            taints: spec.taints.clone(),
            startup_taints: spec.startup_taints.clone(),
            requirements: spec.requirements.clone(),
            kubelet: spec.kubelet.clone(),
            source,
        })
    }
}

/// Fetches provisioning templates by name
#[async_trait::async_trait]
pub trait TemplateResolver: Send + Sync {
    /// `Ok(None)` when no template has that name; `Err(Derivation)` when it
    /// exists but cannot be resolved.
    async fn get_by_name(&self, name: &str) -> Result<Option<ResolvedTemplate>, ControllerError>;
}

/// `TemplateResolver` backed by the Kubernetes API
pub struct KubeTemplateResolver {
    api: Api<ProvisioningTemplate>,
}

impl KubeTemplateResolver {
    pub fn new(api: Api<ProvisioningTemplate>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl TemplateResolver for KubeTemplateResolver {
    async fn get_by_name(&self, name: &str) -> Result<Option<ResolvedTemplate>, ControllerError> {
        match self.api.get_opt(name).await? {
            Some(template) => Ok(Some(ResolvedTemplate::from_resource(&template)?)),
            None => Ok(None),
        }
    }
}
