use serde::Deserialize;
use url::Url;

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_key_prefix() -> String {
    "hk".into()
}

fn default_exclude_paths() -> Vec<String> {
    ["/health", "/ready", "/version", "/metrics", "/docs/*", "/openapi.json"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_query_param() -> String {
    "api_key".into()
}

fn default_rate_limit_per_hour() -> u32 {
    1_000
}

fn default_rate_limit_window_secs() -> u64 {
    3_600
}

fn default_admin_scope() -> String {
    "admin".into()
}

fn default_true() -> bool {
    true
}

fn default_usage_queue_size() -> usize {
    1_024
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    /// Endpoint of the external key validation service.
    pub service_url: Url,
    /// Optional endpoint that receives usage records.
    #[serde(default)]
    pub usage_url: Option<Url>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Keys must look like `<key_prefix>_<live|test|dev>_<secret>`.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Path patterns that skip authentication entirely.
    #[serde(default = "default_exclude_paths")]
    pub exclude_paths: Vec<String>,
    #[serde(default = "default_true")]
    pub allow_query_param: bool,
    #[serde(default = "default_query_param")]
    pub query_param: String,
    /// Use the leftmost X-Forwarded-For entry as the client IP. Only enable
    /// behind a load balancer that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
    /// Applied when the auth service does not return a limit for a key.
    #[serde(default = "default_rate_limit_per_hour")]
    pub default_rate_limit_per_hour: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    /// Scope required for administrative endpoints.
    #[serde(default = "default_admin_scope")]
    pub admin_scope: String,
    #[serde(default = "default_usage_queue_size")]
    pub usage_queue_size: usize,
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreConfig {
    #[default]
    Memory,
    Redis {
        url: String,
    },
}
