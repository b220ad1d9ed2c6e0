//! Test utilities for unit testing the reconciler
//!
//! In-memory stand-ins for the node, template and Machine stores, plus
//! fixture builders for nodes, templates and instances.

use crate::error::ControllerError;
use crate::index::{CreateOutcome, MachineIndex};
use crate::nodes::NodeLookup;
use crate::template::{ResolvedTemplate, TemplateResolver, TemplateSource};
use cloud_client::{Instance, InstanceState};
use crds::keys::{NODE_INITIALIZED_LABEL, TEMPLATE_NAME_LABEL};
use crds::{Machine, MachineStatus, MachineTemplateRef, Taint, TaintEffect};
use k8s_openapi::api::core::v1::{Node, NodeSpec, NodeStatus, Taint as NodeTaint};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Provider-ID for an instance in `us-west-2a`
pub fn provider_id_for(instance_id: &str) -> String {
    format!("aws:///us-west-2a/{}", instance_id)
}

/// An initialized, template-managed node backed by `instance_id`
pub fn create_test_node(name: &str, template: &str, instance_id: &str) -> Node {
    let labels: BTreeMap<String, String> = [
        (TEMPLATE_NAME_LABEL, template),
        (NODE_INITIALIZED_LABEL, "true"),
        ("topology.kubernetes.io/zone", "us-west-2a"),
        ("topology.kubernetes.io/region", "us-west-2"),
        ("kubernetes.io/os", "linux"),
        ("kubernetes.io/arch", "amd64"),
        ("node.kubernetes.io/instance-type", "m5.large"),
        ("kubernetes.io/hostname", name),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let resources: BTreeMap<String, Quantity> = [("cpu", "2"), ("memory", "7934Mi"), ("pods", "29")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect();

    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: Some(provider_id_for(instance_id)),
            ..Default::default()
        }),
        status: Some(NodeStatus {
            capacity: Some(resources.clone()),
            allocatable: Some(resources),
            ..Default::default()
        }),
    }
}

/// Add a core/v1 taint to a node
pub fn add_node_taint(node: &mut Node, key: &str, value: Option<&str>, effect: &str) {
    let spec = node.spec.get_or_insert_with(NodeSpec::default);
    spec.taints.get_or_insert_with(Vec::new).push(NodeTaint {
        key: key.to_string(),
        value: value.map(str::to_string),
        effect: effect.to_string(),
        time_added: None,
    });
}

/// Remove a node label
pub fn remove_node_label(node: &mut Node, key: &str) {
    if let Some(labels) = node.metadata.labels.as_mut() {
        labels.remove(key);
    }
}

/// A template referencing a structured machine template of the same name
pub fn create_test_template(name: &str) -> ResolvedTemplate {
    ResolvedTemplate {
        name: name.to_string(),
        taints: Vec::new(),
        startup_taints: Vec::new(),
        requirements: Vec::new(),
        kubelet: None,
        source: TemplateSource::StructuredRef(MachineTemplateRef {
            api_version: Some("compute.microscaler.io/v1alpha1".to_string()),
            kind: Some("NodeTemplate".to_string()),
            name: name.to_string(),
        }),
    }
}

/// A template carrying a startup taint
pub fn create_test_template_with_startup_taint(name: &str, key: &str) -> ResolvedTemplate {
    ResolvedTemplate {
        startup_taints: vec![Taint::new(key, None, TaintEffect::NoSchedule)],
        ..create_test_template(name)
    }
}

/// A running instance with the given tags
pub fn create_test_instance(instance_id: &str, tags: &[(&str, &str)]) -> Instance {
    Instance {
        id: instance_id.to_string(),
        state: InstanceState::Running,
        tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        private_dns_name: Some(format!("ip-10-0-0-1.{}.internal", instance_id)),
        instance_type: Some("m5.large".to_string()),
        zone: Some("us-west-2a".to_string()),
        launch_time: None,
    }
}

/// In-memory nodes
#[derive(Clone, Default)]
pub struct InMemoryNodes {
    nodes: Arc<Mutex<HashMap<String, Node>>>,
}

impl InMemoryNodes {
    pub fn insert(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        lock(&self.nodes).insert(name, node);
    }
}

#[async_trait::async_trait]
impl NodeLookup for InMemoryNodes {
    async fn get(&self, name: &str) -> Result<Option<Node>, ControllerError> {
        Ok(lock(&self.nodes).get(name).cloned())
    }
}

/// In-memory templates
#[derive(Clone, Default)]
pub struct InMemoryTemplates {
    templates: Arc<Mutex<HashMap<String, ResolvedTemplate>>>,
}

impl InMemoryTemplates {
    pub fn insert(&self, template: ResolvedTemplate) {
        lock(&self.templates).insert(template.name.clone(), template);
    }
}

#[async_trait::async_trait]
impl TemplateResolver for InMemoryTemplates {
    async fn get_by_name(&self, name: &str) -> Result<Option<ResolvedTemplate>, ControllerError> {
        Ok(lock(&self.templates).get(name).cloned())
    }
}

/// In-memory Machine store with the API server's create semantics: names are
/// unique (checked and inserted under one lock) and status is dropped on
/// create.
#[derive(Clone, Default)]
pub struct InMemoryMachines {
    machines: Arc<Mutex<HashMap<String, Machine>>>,
    create_calls: Arc<AtomicUsize>,
}

impl InMemoryMachines {
    /// Seed a Machine as-is, status included
    pub fn insert(&self, machine: Machine) {
        let name = machine.metadata.name.clone().unwrap_or_default();
        lock(&self.machines).insert(name, machine);
    }

    pub fn all(&self) -> Vec<Machine> {
        lock(&self.machines).values().cloned().collect()
    }

    pub fn by_name(&self, name: &str) -> Option<Machine> {
        lock(&self.machines).get(name).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.machines).len()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MachineIndex for InMemoryMachines {
    async fn find_by_provider_id(&self, provider_id: &str) -> Result<Option<Machine>, ControllerError> {
        tokio::task::yield_now().await;
        Ok(lock(&self.machines)
            .values()
            .find(|m| m.belongs_to(provider_id))
            .cloned())
    }

    async fn get(&self, name: &str) -> Result<Option<Machine>, ControllerError> {
        Ok(lock(&self.machines).get(name).cloned())
    }

    async fn create(&self, machine: &Machine) -> Result<CreateOutcome, ControllerError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let name = machine.metadata.name.clone().unwrap_or_default();
        let mut machines = lock(&self.machines);
        if machines.contains_key(&name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let mut stored = machine.clone();
        stored.status = None;
        machines.insert(name, stored.clone());
        Ok(CreateOutcome::Created(stored))
    }

    async fn replace_status(&self, name: &str, status: &MachineStatus) -> Result<Machine, ControllerError> {
        tokio::task::yield_now().await;
        let mut machines = lock(&self.machines);
        let machine = machines
            .get_mut(name)
            .ok_or_else(|| ControllerError::Conflict(format!("Machine {} vanished before its status write", name)))?;
        machine.status = Some(status.clone());
        Ok(machine.clone())
    }
}
