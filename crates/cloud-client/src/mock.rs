//! Mock CloudClient for unit testing
//!
//! Stores instances in memory and can be told to throttle or fail calls so
//! that retry paths can be exercised without a provider.

use crate::cloud_trait::CloudClientTrait;
use crate::error::CloudError;
use crate::models::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock CloudClient for testing
#[derive(Clone, Default)]
pub struct MockCloudClient {
    base_url: String,
    instances: Arc<Mutex<HashMap<String, Instance>>>,
    // Returned by describe instead of the stored instance; tags still land on the stored one
    describe_overrides: Arc<Mutex<HashMap<String, Instance>>>,
    throttled_describes: Arc<AtomicUsize>,
    failed_set_tags: Arc<AtomicUsize>,
    describe_calls: Arc<AtomicUsize>,
    set_tags_calls: Arc<AtomicUsize>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Take one unit from `counter` if it is non-zero
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MockCloudClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Add an instance to the mock store (for test setup)
    pub fn add_instance(&self, instance: Instance) {
        lock(&self.instances).insert(instance.id.clone(), instance);
    }

    /// Add a running, untagged instance (for test setup)
    pub fn add_running_instance(&self, instance_id: &str) {
        self.add_instance(Instance {
            id: instance_id.to_string(),
            state: InstanceState::Running,
            tags: BTreeMap::new(),
            private_dns_name: Some(format!("ip-{}.compute.internal", instance_id)),
            instance_type: None,
            zone: None,
            launch_time: None,
        });
    }

    /// Change the state of a stored instance
    pub fn set_state(&self, instance_id: &str, state: InstanceState) {
        if let Some(instance) = lock(&self.instances).get_mut(instance_id) {
            instance.state = state;
        }
    }

    /// Make describe return `instance` for its ID regardless of the stored copy
    pub fn set_describe_output(&self, instance: Instance) {
        lock(&self.describe_overrides).insert(instance.id.clone(), instance);
    }

    /// The next `n` describe calls fail with `CloudError::Throttled`
    pub fn throttle_next_describes(&self, n: usize) {
        self.throttled_describes.store(n, Ordering::SeqCst);
    }

    /// The next `n` set_tags calls fail with a 503 `CloudError::Api`
    pub fn fail_next_set_tags(&self, n: usize) {
        self.failed_set_tags.store(n, Ordering::SeqCst);
    }

    /// Snapshot of a stored instance
    pub fn instance(&self, instance_id: &str) -> Option<Instance> {
        lock(&self.instances).get(instance_id).cloned()
    }

    /// Number of describe calls made so far
    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    /// Number of set_tags calls made so far (including failed ones)
    pub fn set_tags_calls(&self) -> usize {
        self.set_tags_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CloudClientTrait for MockCloudClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn validate_token(&self) -> Result<(), CloudError> {
        Ok(())
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Instance, CloudError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        // Give other tasks a chance to interleave, as a network call would
        tokio::task::yield_now().await;

        if take_one(&self.throttled_describes) {
            return Err(CloudError::Throttled(format!("describe instance {}", instance_id)));
        }
        if let Some(instance) = lock(&self.describe_overrides).get(instance_id) {
            return Ok(instance.clone());
        }
        lock(&self.instances)
            .get(instance_id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("Instance {} not found", instance_id)))
    }

    async fn set_tags(&self, instance_id: &str, tags: &BTreeMap<String, String>) -> Result<(), CloudError> {
        self.set_tags_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if take_one(&self.failed_set_tags) {
            return Err(CloudError::Api {
                status: 503,
                message: format!("tag instance {} failed: service unavailable", instance_id),
            });
        }

        let mut instances = lock(&self.instances);
        let instance = instances
            .get_mut(instance_id)
            .ok_or_else(|| CloudError::NotFound(format!("Instance {} not found", instance_id)))?;
        for (key, value) in tags {
            instance.tags.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}
