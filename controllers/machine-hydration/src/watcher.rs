//! Node watcher.
//!
//! Delivers node names to the reconciler using `kube_runtime::Controller`,
//! which gives at-least-once delivery, never runs two reconciles for the same
//! node at once, and reconnects on watch failures. Retry timing lives here;
//! the reconciler only classifies errors.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::reconciler::{HydrationOutcome, Reconciler};
use crds::keys::TEMPLATE_NAME_LABEL;
use crds::ProvisioningTemplate;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{self, Action, Config as ControllerConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const BACKOFF_MIN_SECS: u64 = 1;
const BACKOFF_MAX_SECS: u64 = 300;

/// Per-node retry delays. An entry lives only while its node is failing with
/// retryable errors.
#[derive(Default)]
struct NodeBackoffs {
    inner: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl NodeBackoffs {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, FibonacciBackoff>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next(&self, node_name: &str) -> Duration {
        self.lock()
            .entry(node_name.to_string())
            .or_insert_with(|| FibonacciBackoff::new(BACKOFF_MIN_SECS, BACKOFF_MAX_SECS))
            .next_backoff()
    }

    fn clear(&self, node_name: &str) {
        self.lock().remove(node_name);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Shared state handed to every reconcile and error-policy call
struct Context {
    reconciler: Arc<Reconciler>,
    backoffs: Arc<NodeBackoffs>,
}

type RunResult = Result<(ObjectRef<Node>, Action), controller::Error<ControllerError, watcher::Error>>;

/// Log one item of the controller's output stream. A node deleted while it
/// was waiting on a retry surfaces here as `ObjectNotFound` without ever
/// reaching `reconcile`, so its backoff entry is dropped here.
fn on_run_result(backoffs: &NodeBackoffs, res: RunResult) {
    match res {
        Ok((node, _)) => debug!("Reconciled node {}", node.name),
        Err(controller::Error::ObjectNotFound(node)) => {
            backoffs.clear(&node.name);
            debug!("Node {} is gone, dropping its retry state", node.name);
        }
        Err(e) => warn!("Node controller error: {}", e),
    }
}

async fn reconcile(node: Arc<Node>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let node_name = node.name_any();
    debug!("Reconciling node {}", node_name);

    let outcome = ctx.reconciler.reconcile(&node_name).await?;
    ctx.backoffs.clear(&node_name);
    if let HydrationOutcome::Created { machine_name } = outcome {
        info!("Node {} hydrated as Machine {}", node_name, machine_name);
    }
    Ok(Action::await_change())
}

fn error_policy(node: Arc<Node>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let node_name = node.name_any();
    if error.is_retryable() {
        let delay = ctx.backoffs.next(&node_name);
        warn!("Hydration of node {} failed, retrying in {:?}: {}", node_name, delay, error);
        Action::requeue(delay)
    } else {
        ctx.backoffs.clear(&node_name);
        error!("Hydration of node {} failed permanently: {}", node_name, error);
        Action::await_change()
    }
}

/// Watches nodes (and the templates they reference) and drives hydration.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    node_api: Api<Node>,
    template_api: Api<ProvisioningTemplate>,
    concurrency: u16,
    debounce: Duration,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>, client: Client, concurrency: u16, debounce: Duration) -> Self {
        Self {
            reconciler,
            node_api: Api::all(client.clone()),
            template_api: Api::all(client),
            concurrency,
            debounce,
        }
    }

    /// Runs until the process receives SIGTERM or SIGINT.
    ///
    /// Only nodes carrying the template label are watched. A change to a
    /// template re-enqueues every node that references it, which picks up
    /// nodes that were skipped while their template was missing or invalid.
    pub async fn watch_nodes(self) -> Result<(), ControllerError> {
        info!(
            "Starting node watcher (concurrency {}, debounce {:?})",
            self.concurrency, self.debounce
        );

        let controller = Controller::new(
            self.node_api,
            watcher::Config::default().labels(TEMPLATE_NAME_LABEL),
        );
        let nodes = controller.store();

        let backoffs = Arc::new(NodeBackoffs::default());
        let ctx = Arc::new(Context {
            reconciler: self.reconciler,
            backoffs: backoffs.clone(),
        });

        controller
            .watches(self.template_api, watcher::Config::default(), move |template: ProvisioningTemplate| {
                let template_name = template.name_any();
                nodes
                    .state()
                    .into_iter()
                    .filter(|node| node.labels().get(TEMPLATE_NAME_LABEL) == Some(&template_name))
                    .map(|node| ObjectRef::from_obj(&*node))
                    .collect::<Vec<_>>()
            })
            .with_config(
                ControllerConfig::default()
                    .debounce(self.debounce)
                    .concurrency(self.concurrency),
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(|res| {
                on_run_result(&backoffs, res);
                futures::future::ready(())
            })
            .await;

        info!("Node watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_per_node() {
        let backoffs = NodeBackoffs::default();
        assert_eq!(backoffs.next("node-a"), Duration::from_secs(1));
        assert_eq!(backoffs.next("node-a"), Duration::from_secs(1));
        assert_eq!(backoffs.next("node-a"), Duration::from_secs(2));
        assert_eq!(backoffs.next("node-b"), Duration::from_secs(1));
        assert_eq!(backoffs.len(), 2);

        backoffs.clear("node-a");
        assert_eq!(backoffs.len(), 1);
        assert_eq!(backoffs.next("node-a"), Duration::from_secs(1));
    }

    #[test]
    fn test_deleted_node_drops_retry_state() {
        let backoffs = NodeBackoffs::default();
        backoffs.next("node-a");
        backoffs.next("node-b");

        on_run_result(
            &backoffs,
            Err(controller::Error::ObjectNotFound(ObjectRef::<Node>::new("node-a").erase())),
        );

        assert_eq!(backoffs.len(), 1);
        assert_eq!(backoffs.next("node-b"), Duration::from_secs(1));
    }

    #[test]
    fn test_successful_run_keeps_other_nodes_retry_state() {
        let backoffs = NodeBackoffs::default();
        backoffs.next("node-b");

        on_run_result(&backoffs, Ok((ObjectRef::<Node>::new("node-a"), Action::await_change())));

        assert_eq!(backoffs.len(), 1);
    }
}
