//! Prints the compute CRDs as a multi-document YAML stream.
//!
//! `cargo run -p crds --bin crdgen > config/crds.yaml`

use crds::{Machine, ProvisioningTemplate};
use kube::CustomResourceExt;

/// Field paths served by the API server's field index for Machines
const MACHINE_SELECTABLE_FIELDS: &[&str] = &[".status.providerID"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut machine = serde_json::to_value(Machine::crd())?;
    if let Some(versions) = machine
        .pointer_mut("/spec/versions")
        .and_then(|v| v.as_array_mut())
    {
        let fields: Vec<serde_json::Value> = MACHINE_SELECTABLE_FIELDS
            .iter()
            .map(|path| serde_json::json!({ "jsonPath": path }))
            .collect();
        for version in versions {
            version["selectableFields"] = serde_json::Value::Array(fields.clone());
        }
    }

    let template = serde_json::to_value(ProvisioningTemplate::crd())?;

    print!("---\n{}", serde_yaml::to_string(&machine)?);
    print!("---\n{}", serde_yaml::to_string(&template)?);
    Ok(())
}
