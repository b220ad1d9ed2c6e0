//! Cloud instance API client
//!
//! Implements the two instance endpoints the hydration controller uses:
//! `GET /v1/instances/{id}` and `PATCH /v1/instances/{id}/tags`.

use crate::cloud_trait::CloudClientTrait;
use crate::error::CloudError;
use crate::models::*;
use reqwest::{Client, Response, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Cloud instance API client
pub struct CloudClient {
    client: Client,
    base_url: String,
    token: String,
}

impl CloudClient {
    /// Create a new cloud client
    ///
    /// # Arguments
    /// * `base_url` - API base URL (e.g., "http://cloud-api:8080")
    /// * `token` - Bearer token for authentication
    pub fn new(base_url: String, token: String) -> Result<Self, CloudError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn instance_url(&self, instance_id: &str) -> String {
        format!("{}/v1/instances/{}", self.base_url, urlencoding::encode(instance_id))
    }

    /// Map a non-success response onto a `CloudError`.
    async fn check_status(response: Response, what: &str) -> Result<Response, CloudError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(body);

        Err(match status {
            StatusCode::NOT_FOUND => CloudError::NotFound(format!("{}: {}", what, message)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                CloudError::Authentication(format!("{} - {}", status, message))
            }
            StatusCode::TOO_MANY_REQUESTS => CloudError::Throttled(format!("{}: {}", what, message)),
            _ => CloudError::Api {
                status: status.as_u16(),
                message: format!("{} failed: {}", what, message),
            },
        })
    }

    /// Validate the API token by calling the identity endpoint.
    ///
    /// # Returns
    /// * `Ok(())` - Token is valid and the API is reachable
    /// * `Err(CloudError)` - Token is invalid or the API is unreachable
    pub async fn validate_token(&self) -> Result<(), CloudError> {
        let url = format!("{}/v1/identity", self.base_url);
        debug!("Validating cloud API token and connectivity");

        let response = self.client
            .get(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .send()
            .await?;

        Self::check_status(response, "identity").await?;
        debug!("Token validated successfully");
        Ok(())
    }

    /// Describe a single instance by ID
    pub async fn describe_instance(&self, instance_id: &str) -> Result<Instance, CloudError> {
        if instance_id.is_empty() {
            return Err(CloudError::InvalidRequest("instance ID must not be empty".to_string()));
        }

        let url = self.instance_url(instance_id);
        debug!("GET {}", url);

        let response = self.client
            .get(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .send()
            .await?;

        let response = Self::check_status(response, &format!("describe instance {}", instance_id)).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Upsert tags on an instance
    pub async fn set_tags(&self, instance_id: &str, tags: &BTreeMap<String, String>) -> Result<(), CloudError> {
        if instance_id.is_empty() {
            return Err(CloudError::InvalidRequest("instance ID must not be empty".to_string()));
        }
        if tags.is_empty() {
            return Ok(());
        }

        let url = format!("{}/tags", self.instance_url(instance_id));
        debug!("PATCH {} with {} tag(s)", url, tags.len());

        let body = SetTagsRequest { tags: tags.clone() };
        let response = self.client
            .patch(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        Self::check_status(response, &format!("tag instance {}", instance_id)).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CloudClientTrait for CloudClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn validate_token(&self) -> Result<(), CloudError> {
        CloudClient::validate_token(self).await
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Instance, CloudError> {
        CloudClient::describe_instance(self, instance_id).await
    }

    async fn set_tags(&self, instance_id: &str, tags: &BTreeMap<String, String>) -> Result<(), CloudError> {
        CloudClient::set_tags(self, instance_id, tags).await
    }
}
