//! Machine record index.
//!
//! Idempotency gate one: before anything is created, look up an existing
//! Machine for the node's provider-ID. Lookups are list calls without a
//! `resourceVersion`, which the API server serves as quorum reads from etcd,
//! so a Machine created by a previous attempt is always visible.
//!
//! Two lookups are made. The provider-ID hash label is set at creation time
//! and covers the window before the status subresource is written; the
//! `status.providerID` field selector finds Machines created by anything else.

use crate::error::ControllerError;
use crds::keys::PROVIDER_ID_HASH_LABEL;
use crds::{provider_id_hash, Machine, MachineStatus};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::Api;
use tracing::debug;

/// Result of a create call
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Machine),
    /// A Machine with the same name already exists (HTTP 409)
    AlreadyExists,
}

/// Store operations the reconciler needs on Machines
#[async_trait::async_trait]
pub trait MachineIndex: Send + Sync {
    /// Find the Machine for `provider_id`, if any
    async fn find_by_provider_id(&self, provider_id: &str) -> Result<Option<Machine>, ControllerError>;

    /// Fetch a Machine by name
    async fn get(&self, name: &str) -> Result<Option<Machine>, ControllerError>;

    /// Create a Machine. Name uniqueness is enforced by the store; losing that
    /// race is reported as `CreateOutcome::AlreadyExists`, not an error.
    async fn create(&self, machine: &Machine) -> Result<CreateOutcome, ControllerError>;

    /// Write the status subresource
    async fn replace_status(&self, name: &str, status: &MachineStatus) -> Result<Machine, ControllerError>;
}

/// Escape a value for use in a field selector
fn escape_field_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
}

/// `MachineIndex` backed by the Kubernetes API
pub struct KubeMachineIndex {
    api: Api<Machine>,
}

impl KubeMachineIndex {
    pub fn new(api: Api<Machine>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl MachineIndex for KubeMachineIndex {
    async fn find_by_provider_id(&self, provider_id: &str) -> Result<Option<Machine>, ControllerError> {
        let by_label = ListParams::default()
            .labels(&format!("{}={}", PROVIDER_ID_HASH_LABEL, provider_id_hash(provider_id)));
        let labelled = self.api.list(&by_label).await?;
        if let Some(machine) = labelled.items.into_iter().find(|m| m.belongs_to(provider_id)) {
            return Ok(Some(machine));
        }

        let by_field = ListParams::default()
            .fields(&format!("status.providerID={}", escape_field_value(provider_id)));
        let indexed = self.api.list(&by_field).await?;
        debug!("Field index returned {} Machine(s) for {}", indexed.items.len(), provider_id);
        Ok(indexed
            .items
            .into_iter()
            .find(|m| m.provider_id() == Some(provider_id)))
    }

    async fn get(&self, name: &str) -> Result<Option<Machine>, ControllerError> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn create(&self, machine: &Machine) -> Result<CreateOutcome, ControllerError> {
        match self.api.create(&PostParams::default(), machine).await {
            Ok(created) => Ok(CreateOutcome::Created(created)),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_status(&self, name: &str, status: &MachineStatus) -> Result<Machine, ControllerError> {
        let patch = serde_json::json!({ "status": status });
        let pp = PatchParams::default();
        Ok(self.api.patch_status(name, &pp, &Patch::Merge(&patch)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_field_value() {
        assert_eq!(escape_field_value("aws:///us-west-2a/i-1"), "aws:///us-west-2a/i-1");
        assert_eq!(escape_field_value("a,b=c\\d"), "a\\,b\\=c\\\\d");
    }
}
