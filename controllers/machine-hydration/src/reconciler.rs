//! Reconciliation logic for Machine hydration.
//!
//! Given a node name, decide whether the node needs a Machine, create it at
//! most once, and tag the backing cloud instance. Two gates keep creation
//! idempotent without any locking:
//!
//! 1. a consistent Record Index lookup by provider-ID before deriving anything;
//! 2. a create with a name that is deterministic for the instance, so a racing
//!    creator hits the store's name uniqueness and gets `AlreadyExists`.
//!
//! Tag completeness is tracked with the `InstanceTagged` condition, and every
//! pass that finds an existing Machine re-applies tags until it is set.

use crate::config::HydrationSettings;
use crate::error::ControllerError;
use crate::hydrator::{self, HydrationInput};
use crate::index::{CreateOutcome, MachineIndex};
use crate::nodes::NodeLookup;
use crate::provider_id::parse_instance_id;
use crate::template::TemplateResolver;
use cloud_client::{CloudClientTrait, Instance};
use crds::keys::{cluster_tag_key, CLUSTER_TAG_VALUE, MACHINE_NAME_TAG, NODE_INITIALIZED_LABEL, TEMPLATE_NAME_LABEL};
use crds::{Machine, CONDITION_INSTANCE_TAGGED};
use k8s_openapi::api::core::v1::Node;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Reason recorded on the `InstanceTagged` condition
const TAGGED_REASON: &str = "TagsApplied";

/// Result of one reconcile pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// This pass created the Machine
    Created { machine_name: String },
    /// Nothing was created; the reason says why
    Skipped(SkipReason),
}

/// Why a pass did not create a Machine. None of these are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NodeNotFound,
    NotManaged,
    NotInitialized,
    MissingProviderId,
    AlreadyHydrated,
    TemplateNotFound,
    InvalidTemplate,
    MalformedProviderId,
    InstanceNotFound,
    InstanceTerminated,
    DerivationFailed,
    NameConflict,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::NodeNotFound => "node not found",
            SkipReason::NotManaged => "node has no provisioning template label",
            SkipReason::NotInitialized => "node is not initialized",
            SkipReason::MissingProviderId => "node has no provider-ID",
            SkipReason::AlreadyHydrated => "Machine already exists",
            SkipReason::TemplateNotFound => "provisioning template not found",
            SkipReason::InvalidTemplate => "provisioning template is invalid",
            SkipReason::MalformedProviderId => "provider-ID is malformed",
            SkipReason::InstanceNotFound => "cloud instance not found",
            SkipReason::InstanceTerminated => "cloud instance is terminated",
            SkipReason::DerivationFailed => "Machine fields could not be derived",
            SkipReason::NameConflict => "Machine name is taken by another instance",
        };
        f.write_str(reason)
    }
}

/// Reconciler for node hydration
pub struct Reconciler {
    nodes: Box<dyn NodeLookup>,
    machines: Box<dyn MachineIndex>,
    templates: Box<dyn TemplateResolver>,
    cloud: Box<dyn CloudClientTrait>,
    settings: HydrationSettings,
}

impl Reconciler {
    /// Create a new reconciler
    pub fn new(
        nodes: Box<dyn NodeLookup>,
        machines: Box<dyn MachineIndex>,
        templates: Box<dyn TemplateResolver>,
        cloud: Box<dyn CloudClientTrait>,
        settings: HydrationSettings,
    ) -> Self {
        Self {
            nodes,
            machines,
            templates,
            cloud,
            settings,
        }
    }

    /// Reconcile one node by name.
    ///
    /// Everything is re-read on every pass; nothing from a previous attempt is
    /// reused. Errors are returned only for failed external calls and carry
    /// their retryability in `ControllerError::is_retryable`.
    pub async fn reconcile(&self, node_name: &str) -> Result<HydrationOutcome, ControllerError> {
        let Some(node) = self.nodes.get(node_name).await? else {
            return Ok(self.skip(node_name, SkipReason::NodeNotFound));
        };

        let labels = node.metadata.labels.as_ref();
        let Some(template_name) = labels.and_then(|l| l.get(TEMPLATE_NAME_LABEL)).cloned() else {
            return Ok(self.skip(node_name, SkipReason::NotManaged));
        };
        if labels.and_then(|l| l.get(NODE_INITIALIZED_LABEL)).map(String::as_str) != Some("true") {
            return Ok(self.skip(node_name, SkipReason::NotInitialized));
        }
        let Some(provider_id) = node
            .spec
            .as_ref()
            .and_then(|s| s.provider_id.clone())
            .filter(|p| !p.is_empty())
        else {
            return Ok(self.skip(node_name, SkipReason::MissingProviderId));
        };

        // Gate 1
        if let Some(existing) = self.machines.find_by_provider_id(&provider_id).await? {
            self.ensure_hydrated(existing, &node, None, &provider_id).await?;
            return Ok(self.skip(node_name, SkipReason::AlreadyHydrated));
        }

        let template = match self.templates.get_by_name(&template_name).await {
            Ok(Some(template)) => template,
            Ok(None) => return Ok(self.skip(node_name, SkipReason::TemplateNotFound)),
            Err(ControllerError::Derivation(e)) => {
                warn!("Template {} for node {} cannot be used: {}", template_name, node_name, e);
                return Ok(SkipReason::InvalidTemplate.into());
            }
            Err(e) => return Err(e),
        };

        let instance_id = match parse_instance_id(&provider_id) {
            Ok(id) => id,
            Err(e) => {
                warn!("Dropping node {}: {}", node_name, e);
                return Ok(SkipReason::MalformedProviderId.into());
            }
        };

        let instance = match self.cloud.describe_instance(instance_id).await {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => return Ok(self.skip(node_name, SkipReason::InstanceNotFound)),
            Err(e) => {
                error!("Failed to describe instance {} for node {}: {}", instance_id, node_name, e);
                return Err(e.into());
            }
        };
        if instance.state.is_terminal() {
            return Ok(self.skip(node_name, SkipReason::InstanceTerminated));
        }

        let desired = match hydrator::machine_name(&instance, &provider_id).and_then(|name| {
            hydrator::hydrate(&HydrationInput {
                node: &node,
                template: &template,
                instance: &instance,
                provider_id: &provider_id,
                machine_name: &name,
            })
        }) {
            Ok(machine) => machine,
            Err(e) => {
                warn!("Dropping node {}: {}", node_name, e);
                return Ok(SkipReason::DerivationFailed.into());
            }
        };
        let machine_name = desired.metadata.name.clone().unwrap_or_default();

        // Gate 2
        let (machine, created) = match self.machines.create(&desired).await? {
            CreateOutcome::Created(mut machine) => {
                info!("Created Machine {} for node {} ({})", machine_name, node_name, provider_id);
                // Status is ignored on create
                machine.status = None;
                (machine, true)
            }
            CreateOutcome::AlreadyExists => match self.machines.get(&machine_name).await? {
                Some(existing) if existing.belongs_to(&provider_id) => {
                    debug!("Machine {} already exists for {}, continuing with it", machine_name, provider_id);
                    (existing, false)
                }
                Some(_) => {
                    warn!(
                        "Machine {} exists for a different instance, not hydrating node {}",
                        machine_name, node_name
                    );
                    return Ok(SkipReason::NameConflict.into());
                }
                None => {
                    return Err(ControllerError::Conflict(format!(
                        "Machine {} reported as existing but could not be read",
                        machine_name
                    )));
                }
            },
        };

        self.ensure_hydrated(machine, &node, Some(&instance), &provider_id).await?;

        if created {
            Ok(HydrationOutcome::Created { machine_name })
        } else {
            Ok(self.skip(node_name, SkipReason::AlreadyHydrated))
        }
    }

    fn skip(&self, node_name: &str, reason: SkipReason) -> HydrationOutcome {
        debug!("Skipping node {}: {}", node_name, reason);
        HydrationOutcome::Skipped(reason)
    }

    /// Bring an existing Machine to the fully hydrated state: status written
    /// and instance tagged. Safe to repeat.
    async fn ensure_hydrated(
        &self,
        mut machine: Machine,
        node: &Node,
        instance: Option<&Instance>,
        provider_id: &str,
    ) -> Result<(), ControllerError> {
        let machine_name = machine.metadata.name.clone().unwrap_or_default();

        if machine.provider_id().is_none() {
            let mut status = hydrator::hydrated_status(node, instance, provider_id);
            // Keep whatever conditions the Machine already carries
            if let Some(previous) = machine.status.take() {
                for condition in previous.conditions {
                    if !status.conditions.iter().any(|c| c.type_ == condition.type_) {
                        status.conditions.push(condition);
                    }
                }
            }
            machine = self.machines.replace_status(&machine_name, &status).await?;
            debug!("Wrote status for Machine {}", machine_name);
        }

        if machine.is_instance_tagged() {
            return Ok(());
        }
        if !self.tag_instance(&machine_name, provider_id).await? {
            return Ok(());
        }

        let mut status = machine.status.clone().unwrap_or_default();
        status.set_condition_true(CONDITION_INSTANCE_TAGGED, TAGGED_REASON);
        self.machines.replace_status(&machine_name, &status).await?;
        info!("Tagged instance {} for Machine {}", provider_id, machine_name);
        Ok(())
    }

    /// Write both instance tags. `Ok(false)` when there is no live instance
    /// left to tag.
    async fn tag_instance(&self, machine_name: &str, provider_id: &str) -> Result<bool, ControllerError> {
        let instance_id = match parse_instance_id(provider_id) {
            Ok(id) => id,
            Err(e) => {
                warn!("Not tagging Machine {}: {}", machine_name, e);
                return Ok(false);
            }
        };

        let mut tags = BTreeMap::new();
        tags.insert(MACHINE_NAME_TAG.to_string(), machine_name.to_string());
        tags.insert(cluster_tag_key(&self.settings.cluster_name), CLUSTER_TAG_VALUE.to_string());

        match self.cloud.set_tags(instance_id, &tags).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => {
                debug!("Instance {} for Machine {} no longer exists", instance_id, machine_name);
                Ok(false)
            }
            Err(e) => {
                error!("Failed to tag instance {} for Machine {}: {}", instance_id, machine_name, e);
                Err(e.into())
            }
        }
    }
}

impl From<SkipReason> for HydrationOutcome {
    fn from(reason: SkipReason) -> Self {
        HydrationOutcome::Skipped(reason)
    }
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;
