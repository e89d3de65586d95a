use auth::config::{Config as AuthConfig, StoreConfig};
use auth::ip::IpRule;
use http::Method;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("listener port must be non-zero")]
    InvalidPort,
    #[error("at least one proxy target is required")]
    NoTargets,
    #[error("invalid target prefix: {0:?}")]
    InvalidPrefix(String),
    #[error("duplicate target prefix: {0}")]
    DuplicatePrefix(String),
    #[error("upstream {0} must be an http or https URL with a host")]
    InvalidUpstream(Url),
    #[error("auth service URL has no host")]
    InvalidAuthUrl,
    #[error("circuit breaker failure_threshold must be at least 1")]
    InvalidFailureThreshold,
    #[error("invalid scope rule for path {0:?}")]
    InvalidScopeRule(String),
    #[error("invalid header name: {0}")]
    InvalidHeaderName(String),
    #[error(transparent)]
    InvalidIpRule(#[from] auth::ip::InvalidIpRule),
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    60
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

/// How the gateway reaches an upstream. External upstreams are reached through
/// the public load balancer and speak the browser path dialect.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Internal,
    External,
}

fn default_dialect_from() -> String {
    "/api/2.0/mlflow".into()
}

fn default_dialect_to() -> String {
    "/ajax-api/2.0/mlflow".into()
}

/// Leading path segment rewrite applied for external upstreams.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct DialectConfig {
    #[serde(default = "default_dialect_from")]
    pub from: String,
    #[serde(default = "default_dialect_to")]
    pub to: String,
}

impl Default for DialectConfig {
    fn default() -> Self {
        DialectConfig {
            from: default_dialect_from(),
            to: default_dialect_to(),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct TargetConfig {
    /// Gateway path prefix, e.g. `/mlflow`.
    pub prefix: String,
    pub upstream: Url,
    /// Inferred from the upstream host when unset.
    #[serde(default)]
    pub network: Option<Network>,
    #[serde(default)]
    pub dialect: DialectConfig,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_header() -> String {
    "x-user-id".into()
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct ProxyConfig {
    /// Bounds the wait for the upstream's response headers. The response body
    /// is streamed afterwards without a deadline, so long downloads of large
    /// artifacts are not cut off.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Header carrying the authenticated user id to the upstream.
    #[serde(default = "default_user_header")]
    pub user_header: String,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            timeout_secs: default_timeout_secs(),
            user_header: default_user_header(),
            targets: Vec::new(),
        }
    }
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Scope required for requests matching `path` (and `methods`, if given).
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct ScopeRule {
    pub path: String,
    #[serde(default)]
    pub methods: Vec<String>,
    pub scope: String,
}

impl ScopeRule {
    pub fn parsed_methods(&self) -> Result<Vec<Method>, ValidationError> {
        self.methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .map_err(|_| ValidationError::InvalidScopeRule(self.path.clone()))
            })
            .collect()
    }
}

fn default_scopes() -> Vec<ScopeRule> {
    vec![
        ScopeRule {
            path: "*".into(),
            methods: vec!["GET".into(), "HEAD".into()],
            scope: "mlflow:read".into(),
        },
        ScopeRule {
            path: "*".into(),
            methods: Vec::new(),
            scope: "mlflow:write".into(),
        },
    ]
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    pub listener: Listener,
    /// Optional second listener serving only health endpoints.
    #[serde(default)]
    pub admin_listener: Option<Listener>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<ScopeRule>,
    /// Static IP allowlist applied to every key in addition to any per-key list.
    #[serde(default)]
    pub ip_allowlist: Vec<String>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.listener.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if let Some(admin) = &self.admin_listener
            && admin.port == 0
        {
            return Err(ValidationError::InvalidPort);
        }

        if self.auth.service_url.host_str().is_none() {
            return Err(ValidationError::InvalidAuthUrl);
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ValidationError::InvalidFailureThreshold);
        }

        if http::HeaderName::from_bytes(self.proxy.user_header.as_bytes()).is_err() {
            return Err(ValidationError::InvalidHeaderName(
                self.proxy.user_header.clone(),
            ));
        }

        if self.proxy.targets.is_empty() {
            return Err(ValidationError::NoTargets);
        }
        let mut seen = HashSet::new();
        for target in &self.proxy.targets {
            let prefix = target.prefix.trim_end_matches('/');
            if prefix.is_empty() || !prefix.starts_with('/') {
                return Err(ValidationError::InvalidPrefix(target.prefix.clone()));
            }
            if !seen.insert(prefix) {
                return Err(ValidationError::DuplicatePrefix(prefix.to_string()));
            }
            if !matches!(target.upstream.scheme(), "http" | "https")
                || target.upstream.host_str().is_none()
            {
                return Err(ValidationError::InvalidUpstream(target.upstream.clone()));
            }
        }

        for rule in &self.scopes {
            if rule.scope.trim().is_empty() || rule.path.trim().is_empty() {
                return Err(ValidationError::InvalidScopeRule(rule.path.clone()));
            }
            rule.parsed_methods()?;
        }

        for entry in &self.ip_allowlist {
            entry.parse::<IpRule>()?;
        }

        Ok(())
    }
}
