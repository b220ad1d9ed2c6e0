//! Controller configuration.
//!
//! Read once from the environment at startup. The reconciler only sees the
//! `HydrationSettings` slice of it, passed in explicitly at construction.

use crate::error::ControllerError;
use std::time::Duration;

const DEFAULT_CLOUD_API_URL: &str = "http://cloud-api.kube-system:8080";
const DEFAULT_CONCURRENCY: u16 = 50;
const DEFAULT_DEBOUNCE_SECS: u64 = 1;

/// Settings the reconciler needs on every invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HydrationSettings {
    /// Active cluster name, used for the `kubernetes.io/cluster/<name>` tag
    pub cluster_name: String,
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub settings: HydrationSettings,
    pub cloud_api_url: String,
    pub cloud_api_token: String,
    /// Maximum parallel node reconciles
    pub concurrency: u16,
    pub debounce: Duration,
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cluster_name = lookup("CLUSTER_NAME")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ControllerError::InvalidConfig(
                "CLUSTER_NAME environment variable is required".to_string()
            ))?;
        let cloud_api_token = lookup("CLOUD_API_TOKEN")
            .ok_or_else(|| ControllerError::InvalidConfig(
                "CLOUD_API_TOKEN environment variable is required".to_string()
            ))?;
        let cloud_api_url = lookup("CLOUD_API_URL")
            .unwrap_or_else(|| DEFAULT_CLOUD_API_URL.to_string());

        let concurrency = match lookup("HYDRATION_CONCURRENCY") {
            Some(raw) => raw.parse::<u16>().ok().filter(|n| *n > 0).ok_or_else(|| {
                ControllerError::InvalidConfig(format!(
                    "HYDRATION_CONCURRENCY must be a positive integer, got {:?}", raw
                ))
            })?,
            None => DEFAULT_CONCURRENCY,
        };
        let debounce_secs = match lookup("HYDRATION_DEBOUNCE_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| ControllerError::InvalidConfig(format!(
                "HYDRATION_DEBOUNCE_SECS must be an integer, got {:?}", raw
            )))?,
            None => DEFAULT_DEBOUNCE_SECS,
        };

        Ok(Self {
            settings: HydrationSettings {
                cluster_name: cluster_name.trim().to_string(),
            },
            cloud_api_url,
            cloud_api_token,
            concurrency,
            debounce: Duration::from_secs(debounce_secs),
        })
    }
}
