//! Short-TTL cache in front of the auth service, so repeated requests with the
//! same credential avoid a network round trip.
//!
//! Entries are keyed by the SHA-256 digest of the credential; the raw key never
//! reaches the store. Only definitive answers are cached. Transport failures
//! are returned to the caller and the next request tries again.

use crate::client::{AuthError, KeyValidator};
use crate::credential::Credential;
use crate::metrics_defs::{
    AUTH_SERVICE_DURATION, AUTH_SERVICE_ERRORS, STORE_ERRORS, VALIDATION_CACHE_HIT,
    VALIDATION_CACHE_MISS,
};
use crate::store::Store;
use crate::types::ValidationResult;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};

const KEY_PREFIX: &str = "auth:validation:";

pub struct ValidationCache {
    validator: Arc<dyn KeyValidator>,
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl ValidationCache {
    pub fn new(validator: Arc<dyn KeyValidator>, store: Arc<dyn Store>, ttl: Duration) -> Self {
        ValidationCache {
            validator,
            store,
            ttl,
        }
    }

    pub async fn validate(&self, credential: &Credential) -> Result<ValidationResult, AuthError> {
        let key = cache_key(credential);

        if let Some(result) = self.lookup(&key, credential).await {
            counter!(VALIDATION_CACHE_HIT).increment(1);
            return Ok(result);
        }
        counter!(VALIDATION_CACHE_MISS).increment(1);

        let start = Instant::now();
        let result = self.validator.validate_key(credential).await;
        histogram!(AUTH_SERVICE_DURATION).record(start.elapsed().as_secs_f64());

        let result = result.inspect_err(|e| {
            counter!(AUTH_SERVICE_ERRORS, "kind" => e.kind()).increment(1);
        })?;

        match serde_json::to_string(&result) {
            Ok(encoded) => {
                if let Err(e) = self.store.set_with_ttl(&key, &encoded, self.ttl).await {
                    counter!(STORE_ERRORS, "op" => "set").increment(1);
                    tracing::warn!(error = %e, "failed to cache validation result");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to encode validation result"),
        }

        Ok(result)
    }

    async fn lookup(&self, key: &str, credential: &Credential) -> Option<ValidationResult> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                counter!(STORE_ERRORS, "op" => "get").increment(1);
                tracing::warn!(error = %e, "validation cache unavailable, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(
                    credential = %credential.masked(),
                    error = %e,
                    "discarding malformed cache entry"
                );
                None
            }
        }
    }
}

fn cache_key(credential: &Credential) -> String {
    format!("{KEY_PREFIX}{}", credential.digest())
}
