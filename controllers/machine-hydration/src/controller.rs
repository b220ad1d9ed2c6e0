//! Main controller implementation.
//!
//! Wires the Kubernetes and cloud clients into the reconciler and runs the
//! node watcher in a background task.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::index::KubeMachineIndex;
use crate::nodes::KubeNodeLookup;
use crate::reconciler::Reconciler;
use crate::template::KubeTemplateResolver;
use crate::watcher::Watcher;
use cloud_client::CloudClient;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for Machine hydration.
pub struct Controller {
    node_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    ///
    /// Fails fast when either API is unreachable or the cloud token is
    /// rejected, before any node is processed.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Machine Hydration Controller");

        let kube_client = Client::try_default().await?;

        let cloud_client = CloudClient::new(config.cloud_api_url.clone(), config.cloud_api_token.clone())?;
        cloud_client.validate_token().await?;
        info!("Cloud API reachable at {}", cloud_client.base_url());

        let reconciler = Reconciler::new(
            Box::new(KubeNodeLookup::new(Api::all(kube_client.clone()))),
            Box::new(KubeMachineIndex::new(Api::all(kube_client.clone()))),
            Box::new(KubeTemplateResolver::new(Api::all(kube_client.clone()))),
            Box::new(cloud_client),
            config.settings.clone(),
        );

        let watcher = Watcher::new(Arc::new(reconciler), kube_client, config.concurrency, config.debounce);
        let node_watcher = tokio::spawn(watcher.watch_nodes());

        Ok(Self { node_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Machine Hydration Controller running");

        self.node_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("Node watcher panicked: {}", e)))?
    }
}
