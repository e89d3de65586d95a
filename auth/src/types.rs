use crate::credential::Environment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Outcome of asking the auth service whether a key is currently valid.
///
/// This is both the wire format of the auth service response and the value
/// stored in the validation cache.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub rate_limit_per_hour: Option<u32>,
    #[serde(default)]
    pub ip_allowlist: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn invalid(error: impl Into<String>) -> Self {
        ValidationResult {
            valid: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Identity attached to a request after successful authentication.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestContext {
    pub user_id: String,
    pub key_id: String,
    pub scopes: BTreeSet<String>,
    pub rate_limit_per_hour: u32,
    pub environment: Option<Environment>,
}

impl RequestContext {
    /// `resource:*` grants every `resource:<action>` scope.
    pub fn has_scope(&self, required: &str) -> bool {
        if self.scopes.contains(required) {
            return true;
        }

        match required.split_once(':') {
            Some((resource, _)) => self.scopes.contains(&format!("{resource}:*")),
            None => false,
        }
    }

    pub fn scopes_header_value(&self) -> String {
        self.scopes.iter().cloned().collect::<Vec<_>>().join(",")
    }
}
