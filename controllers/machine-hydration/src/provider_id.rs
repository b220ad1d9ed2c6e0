//! Provider-ID parsing.
//!
//! Nodes carry `<scheme>://<zone>/<instance-id>` (the authority may be empty,
//! as in `aws:///us-west-2a/i-0abc`). Only the trailing instance ID is used.

use thiserror::Error;

/// Reasons a provider-ID cannot be parsed. Always permanent for a node.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderIdError {
    #[error("provider-ID {0:?} has no scheme")]
    MissingScheme(String),

    #[error("provider-ID {0:?} has no path")]
    MissingPath(String),

    #[error("provider-ID {0:?} has an empty or invalid instance ID")]
    InvalidInstanceId(String),
}

/// Extract the instance ID from a provider-ID string.
pub fn parse_instance_id(provider_id: &str) -> Result<&str, ProviderIdError> {
    let (scheme, rest) = provider_id
        .split_once("://")
        .ok_or_else(|| ProviderIdError::MissingScheme(provider_id.to_string()))?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
        return Err(ProviderIdError::MissingScheme(provider_id.to_string()));
    }

    let (_, instance_id) = rest
        .rsplit_once('/')
        .ok_or_else(|| ProviderIdError::MissingPath(provider_id.to_string()))?;
    if instance_id.is_empty() || instance_id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ProviderIdError::InvalidInstanceId(provider_id.to_string()));
    }

    Ok(instance_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_provider_ids() {
        assert_eq!(parse_instance_id("aws:///us-west-2a/i-0123456789abcdef0"), Ok("i-0123456789abcdef0"));
        assert_eq!(parse_instance_id("gce://project/us-central1-a/node-1"), Ok("node-1"));
        assert_eq!(parse_instance_id("fake://zone-1a/i-abc"), Ok("i-abc"));
    }

    #[test]
    fn test_parse_malformed_provider_ids() {
        assert!(matches!(parse_instance_id("i-0123"), Err(ProviderIdError::MissingScheme(_))));
        assert!(matches!(parse_instance_id("://zone/i-1"), Err(ProviderIdError::MissingScheme(_))));
        assert!(matches!(parse_instance_id("aws://i-0123"), Err(ProviderIdError::MissingPath(_))));
        assert!(matches!(parse_instance_id("aws:///us-west-2a/"), Err(ProviderIdError::InvalidInstanceId(_))));
        assert!(matches!(parse_instance_id("aws:///zone/i 1"), Err(ProviderIdError::InvalidInstanceId(_))));
    }
}
