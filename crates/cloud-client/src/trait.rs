//! CloudClient trait for mocking
//!
//! The concrete `CloudClient` implements this trait; tests use `MockCloudClient`.

use crate::error::CloudError;
use crate::models::Instance;
use std::collections::BTreeMap;

/// Trait for cloud instance API operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait CloudClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Validate the API token
    async fn validate_token(&self) -> Result<(), CloudError>;

    /// Describe a single instance. Returns `CloudError::NotFound` when the
    /// provider has no record of it.
    async fn describe_instance(&self, instance_id: &str) -> Result<Instance, CloudError>;

    /// Upsert tags on an instance. Keys not named in `tags` are left alone,
    /// so repeating the call with the same map is a no-op.
    async fn set_tags(&self, instance_id: &str, tags: &BTreeMap<String, String>) -> Result<(), CloudError>;
}
