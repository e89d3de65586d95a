//! Credential extraction from inbound requests.
//!
//! Credentials are opaque API keys. The edge only checks the environment
//! prefix (`<prefix>_live_`, `<prefix>_test_`, `<prefix>_dev_`); the auth
//! service is authoritative for everything else.

use http::header::{AUTHORIZATION, HeaderMap};
use http::{HeaderName, Uri};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

pub static API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

const VISIBLE_CHARS: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Live,
    Test,
    Dev,
}

impl Environment {
    pub const ALL: [Environment; 3] = [Environment::Live, Environment::Test, Environment::Dev];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Environment::Live => "live",
            Environment::Test => "test",
            Environment::Dev => "dev",
        }
    }
}

/// An API key presented by a client. Formatting never reveals the full value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for empty or whitespace-only input.
    pub fn new(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(Credential(value.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn masked(&self) -> String {
        if self.0.chars().count() <= VISIBLE_CHARS + 4 {
            return "****".to_string();
        }
        let visible: String = self.0.chars().take(VISIBLE_CHARS).collect();
        format!("{visible}****")
    }

    /// Environment encoded in the key prefix, e.g. `hk_live_...` with prefix `hk`.
    pub fn environment(&self, key_prefix: &str) -> Option<Environment> {
        let rest = self.0.strip_prefix(key_prefix)?.strip_prefix('_')?;
        Environment::ALL.into_iter().find(|env| {
            rest.strip_prefix(env.as_str())
                .and_then(|r| r.strip_prefix('_'))
                .is_some_and(|secret| !secret.is_empty())
        })
    }

    /// Hex SHA-256 of the key, used wherever the key has to be stored.
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Where a credential was found. Variants are listed in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    Bearer,
    ApiKeyScheme,
    ApiKeyHeader,
    QueryParam,
}

impl CredentialSource {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Bearer => "bearer",
            CredentialSource::ApiKeyScheme => "api_key_scheme",
            CredentialSource::ApiKeyHeader => "api_key_header",
            CredentialSource::QueryParam => "query_param",
        }
    }

    fn extract(&self, headers: &HeaderMap, uri: &Uri, query_param: &str) -> Option<Credential> {
        match self {
            CredentialSource::Bearer => from_authorization(headers, "bearer"),
            CredentialSource::ApiKeyScheme => from_authorization(headers, "apikey"),
            CredentialSource::ApiKeyHeader => headers
                .get(&API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(Credential::new),
            CredentialSource::QueryParam => from_query(uri, query_param),
        }
    }
}

fn from_authorization(headers: &HeaderMap, scheme: &str) -> Option<Credential> {
    headers
        .get_all(AUTHORIZATION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|value| {
            let (request_scheme, token) = value.trim().split_once(' ')?;
            if request_scheme.eq_ignore_ascii_case(scheme) {
                Credential::new(token)
            } else {
                None
            }
        })
}

fn from_query(uri: &Uri, name: &str) -> Option<Credential> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| Credential::new(&value))
}

/// Ordered list of extraction strategies; the first one that finds a key wins.
#[derive(Clone, Debug)]
pub struct CredentialExtractor {
    strategies: Vec<CredentialSource>,
    query_param: String,
}

impl CredentialExtractor {
    pub fn new(allow_query_param: bool, query_param: impl Into<String>) -> Self {
        let mut strategies = vec![
            CredentialSource::Bearer,
            CredentialSource::ApiKeyScheme,
            CredentialSource::ApiKeyHeader,
        ];
        if allow_query_param {
            strategies.push(CredentialSource::QueryParam);
        }

        Self {
            strategies,
            query_param: query_param.into(),
        }
    }

    pub fn query_param(&self) -> &str {
        &self.query_param
    }

    pub fn extract(&self, headers: &HeaderMap, uri: &Uri) -> Option<(Credential, CredentialSource)> {
        self.strategies.iter().find_map(|source| {
            source
                .extract(headers, uri, &self.query_param)
                .map(|credential| (credential, *source))
        })
    }
}
