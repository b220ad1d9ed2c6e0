//! Well-known label, annotation and tag keys
//!
//! These keys are shared between the CRDs, the hydration controller and the
//! cloud instance tags it writes.

/// API group for all compute CRDs
pub const GROUP: &str = "compute.microscaler.io";

/// API version for all compute CRDs
pub const VERSION: &str = "v1alpha1";

/// Node label naming the `ProvisioningTemplate` that launched the node
pub const TEMPLATE_NAME_LABEL: &str = "compute.microscaler.io/provisioning-template";

/// Node label set to `"true"` once the node completed its join sequence
pub const NODE_INITIALIZED_LABEL: &str = "compute.microscaler.io/initialized";

/// Machine label holding a hash of the provider-ID (label values cannot hold `://`)
pub const PROVIDER_ID_HASH_LABEL: &str = "compute.microscaler.io/provider-id-hash";

/// Cloud instance tag naming the Machine the instance belongs to
pub const MACHINE_NAME_TAG: &str = "compute.microscaler.io/machine-name";

/// Machine annotation carrying the serialized legacy inline provider block
pub const PROVIDER_COMPATIBILITY_ANNOTATION: &str = "compute.microscaler.io/provider-compatibility";

/// Machine annotation recording the node a Machine was hydrated from
pub const HYDRATED_FROM_NODE_ANNOTATION: &str = "compute.microscaler.io/hydrated-from-node";

/// Value written to the cluster ownership tag
pub const CLUSTER_TAG_VALUE: &str = "owned";

/// Kind used for synthesized machine template references of legacy templates
pub const INLINE_PROVIDER_KIND: &str = "InlineProvider";

/// Well-known node labels that become single-value requirements
pub const LABEL_TOPOLOGY_ZONE: &str = "topology.kubernetes.io/zone";
pub const LABEL_TOPOLOGY_REGION: &str = "topology.kubernetes.io/region";
pub const LABEL_OS: &str = "kubernetes.io/os";
pub const LABEL_ARCH: &str = "kubernetes.io/arch";
pub const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";

/// Cluster-scoped ownership tag key for `cluster_name`
pub fn cluster_tag_key(cluster_name: &str) -> String {
    format!("kubernetes.io/cluster/{}", cluster_name)
}

/// `apiVersion` string for this group
pub fn api_version() -> String {
    format!("{}/{}", GROUP, VERSION)
}
