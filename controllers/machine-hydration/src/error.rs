//! Controller-specific error types.
//!
//! Every external-call failure is wrapped here and classified as retryable
//! or permanent before it reaches the delivery layer.

use cloud_client::CloudError;
use kube::Error as KubeError;
use thiserror::Error;

use crate::hydrator::DerivationError;

/// Errors that can occur in the Machine Hydration Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cloud instance API error
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// Template or node fields that cannot be mapped onto a Machine
    #[error("Derivation failed: {0}")]
    Derivation(#[from] DerivationError),

    /// A Machine changed underneath the reconciler between two calls
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether a later attempt can succeed without anything else changing.
    pub fn is_retryable(&self) -> bool {
        match self {
            ControllerError::Kube(KubeError::Api(ae)) => ae.code == 429 || ae.code >= 500,
            // Transport, TLS and auth-refresh failures against the API server
            ControllerError::Kube(_) => true,
            ControllerError::Cloud(e) => e.is_retryable(),
            ControllerError::Derivation(_) | ControllerError::InvalidConfig(_) => false,
            ControllerError::Conflict(_) | ControllerError::Watch(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_errors_keep_their_classification() {
        let throttled = ControllerError::from(CloudError::Throttled("describe".to_string()));
        assert!(throttled.is_retryable());

        let denied = ControllerError::from(CloudError::Authentication("403".to_string()));
        assert!(!denied.is_retryable());
    }

    #[test]
    fn test_derivation_errors_are_permanent() {
        let err = ControllerError::from(DerivationError::MissingMachineTemplate("default".to_string()));
        assert!(!err.is_retryable());
        assert!(!ControllerError::InvalidConfig("CLUSTER_NAME".to_string()).is_retryable());
    }
}
