//! Compute CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the machine hydration controller.

pub mod keys;
pub mod machine;
pub mod provisioning_template;
pub mod scheduling;

pub use machine::*;
pub use provisioning_template::*;
pub use scheduling::*;
