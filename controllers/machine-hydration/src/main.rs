//! Machine Hydration Controller
//!
//! Backfills a `Machine` for every initialized, template-managed node that
//! predates the Machine resource kind, then tags the backing cloud instance
//! with the Machine name and the cluster ownership tag.
//!
//! Each node is hydrated at most once; afterwards the controller leaves the
//! Machine to the controllers that own its lifecycle.

mod backoff;
mod config;
mod controller;
mod error;
mod hydrator;
mod index;
mod nodes;
mod provider_id;
mod reconciler;
mod template;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube and reqwest both build rustls clients; pin ring as the provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    info!("Starting Machine Hydration Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Cluster: {}", config.settings.cluster_name);
    info!("  Cloud API URL: {}", config.cloud_api_url);
    info!("  Concurrency: {}", config.concurrency);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
