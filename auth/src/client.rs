use crate::credential::Credential;
use crate::types::ValidationResult;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use url::Url;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("auth service timed out")]
    ServiceTimeout,
    #[error("auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    pub const fn kind(&self) -> &'static str {
        match self {
            AuthError::ServiceTimeout => "timeout",
            AuthError::ServiceUnavailable(_) => "unavailable",
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AuthError::ServiceTimeout
        } else {
            AuthError::ServiceUnavailable(e.to_string())
        }
    }
}

/// The validate-key RPC of the external auth service.
#[async_trait]
pub trait KeyValidator: Send + Sync {
    async fn validate_key(&self, credential: &Credential) -> Result<ValidationResult, AuthError>;
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    api_key: &'a str,
}

/// HTTP client for the auth service.
#[derive(Clone)]
pub struct AuthServiceClient {
    client: reqwest::Client,
    url: Url,
}

impl AuthServiceClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(AuthServiceClient { client, url })
    }
}

#[async_trait]
impl KeyValidator for AuthServiceClient {
    async fn validate_key(&self, credential: &Credential) -> Result<ValidationResult, AuthError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&ValidateRequest {
                api_key: credential.expose(),
            })
            .send()
            .await?;

        let status = response.status();
        match status {
            s if s.is_success() => Ok(response.json::<ValidationResult>().await?),
            // The auth service answers definitive rejections with a client error,
            // usually with a ValidationResult body carrying the reason.
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                match response.json::<ValidationResult>().await {
                    Ok(result) if !result.valid => Ok(result),
                    Ok(_) | Err(_) => Ok(ValidationResult::invalid("Invalid API key")),
                }
            }
            _ => Err(AuthError::ServiceUnavailable(format!(
                "unexpected status {status}"
            ))),
        }
    }
}
