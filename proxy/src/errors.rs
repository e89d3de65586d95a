use bytes::Bytes;
use http::header::{HeaderValue, RETRY_AFTER, WWW_AUTHENTICATE};
use http_body_util::combinators::BoxBody;
use hyper::{Response, StatusCode};
use shared::http::detail_response;
use std::io;

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] crate::config::ValidationError),
    #[error("store error: {0}")]
    Store(#[from] auth::store::StoreError),
    #[error("auth client error: {0}")]
    AuthClient(#[from] reqwest::Error),
}

/// Errors answered to the client. Each maps to a fixed status code; the
/// message is safe to disclose.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Missing API key")]
    MissingCredential,
    #[error("{0}")]
    InvalidCredential(String),
    #[error("IP address not allowed")]
    IpNotAllowed,
    #[error("Insufficient scope: {0} required")]
    InsufficientScope(String),
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after_secs: u64 },
    #[error("Upstream service unavailable")]
    UpstreamUnavailable,
    #[error("Upstream request timed out")]
    UpstreamTimeout,
    #[error("Upstream unreachable")]
    UpstreamUnreachable,
    #[error("Not found")]
    NotFound,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingCredential | GatewayError::InvalidCredential(_) => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::IpNotAllowed | GatewayError::InsufficientScope(_) => {
                StatusCode::FORBIDDEN
            }
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnreachable => StatusCode::BAD_GATEWAY,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Short tag used in logs and metrics.
    pub const fn reason(&self) -> &'static str {
        match self {
            GatewayError::MissingCredential => "missing_credential",
            GatewayError::InvalidCredential(_) => "invalid_credential",
            GatewayError::IpNotAllowed => "ip_not_allowed",
            GatewayError::InsufficientScope(_) => "insufficient_scope",
            GatewayError::RateLimitExceeded { .. } => "rate_limited",
            GatewayError::UpstreamUnavailable => "upstream_unavailable",
            GatewayError::UpstreamTimeout => "upstream_timeout",
            GatewayError::UpstreamUnreachable => "upstream_unreachable",
            GatewayError::NotFound => "not_found",
        }
    }

    pub fn into_response<E: 'static>(self) -> Response<BoxBody<Bytes, E>> {
        let mut response = detail_response(self.status(), &self.to_string());
        let headers = response.headers_mut();
        match &self {
            GatewayError::MissingCredential | GatewayError::InvalidCredential(_) => {
                headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            GatewayError::RateLimitExceeded { retry_after_secs } => {
                headers.insert(RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            }
            _ => {}
        }
        response
    }
}
