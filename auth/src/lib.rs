//! Credential validation building blocks for the gateway: credential
//! extraction, the cached validate-key client, the shared store, rate limiting
//! and usage recording.

pub mod cache;
pub mod client;
pub mod config;
pub mod credential;
pub mod ip;
pub mod metrics_defs;
pub mod rate_limit;
pub mod store;
pub mod types;
pub mod usage;

#[cfg(test)]
mod testutils;

pub use cache::ValidationCache;
pub use client::{AuthError, AuthServiceClient, KeyValidator};
pub use credential::{Credential, CredentialExtractor, CredentialSource, Environment};
pub use rate_limit::{RateLimitStatus, RateLimiter};
pub use types::{RequestContext, ValidationResult};
pub use usage::{UsageRecord, UsageRecorder};
