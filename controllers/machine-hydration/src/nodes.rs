//! Node lookup.
//!
//! The reconciler is handed a node name and always re-reads the node, so a
//! stale cached copy never drives a creation.

use crate::error::ControllerError;
use k8s_openapi::api::core::v1::Node;
use kube::Api;

/// Fetches nodes by name
#[async_trait::async_trait]
pub trait NodeLookup: Send + Sync {
    /// `Ok(None)` when the node no longer exists
    async fn get(&self, name: &str) -> Result<Option<Node>, ControllerError>;
}

/// `NodeLookup` backed by the Kubernetes API
pub struct KubeNodeLookup {
    api: Api<Node>,
}

impl KubeNodeLookup {
    pub fn new(api: Api<Node>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl NodeLookup for KubeNodeLookup {
    async fn get(&self, name: &str) -> Result<Option<Node>, ControllerError> {
        Ok(self.api.get_opt(name).await?)
    }
}
