//! Cloud Instance API Client
//!
//! A small Rust client for the cloud provider's instance API. The hydration
//! controller only needs two calls: describing one instance and upserting
//! tags on it.
//!
//! # Example
//!
//! ```no_run
//! use cloud_client::CloudClient;
//! use std::collections::BTreeMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CloudClient::new(
//!     "http://cloud-api:8080".to_string(),
//!     "your-api-token".to_string(),
//! )?;
//!
//! let instance = client.describe_instance("i-0123456789abcdef0").await?;
//! println!("{} is {:?}", instance.id, instance.state);
//!
//! let mut tags = BTreeMap::new();
//! tags.insert("kubernetes.io/cluster/prod".to_string(), "owned".to_string());
//! client.set_tags(&instance.id, &tags).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Errors carry a retryability classification (`CloudError::is_retryable`) so
//! callers can decide between requeueing and dropping work.

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod cloud_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::CloudClient;
pub use cloud_trait::CloudClientTrait;
pub use error::CloudError;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::MockCloudClient;
