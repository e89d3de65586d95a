//! The single authentication point of the gateway.
//!
//! Every request passes through [`Authenticator::authenticate`] before it is
//! routed. The checks run in a fixed order and the first failure wins:
//! credential extraction, key format, validation, IP allowlist, rate limit,
//! route scope.

use crate::config::{Config, ValidationError};
use crate::errors::GatewayError;
use crate::metrics_defs::AUTH_FAILURES;
use auth::ip;
use auth::{
    AuthError, CredentialExtractor, CredentialSource, RateLimitStatus, RateLimiter,
    RequestContext, ValidationCache,
};
use http::{Method, Request};
use routing::{PathPattern, Route, RouteTable};
use shared::counter;
use shared::http::ClientAddr;
use std::net::IpAddr;

static X_FORWARDED_FOR: http::HeaderName = http::HeaderName::from_static("x-forwarded-for");

pub const ADMIN_ROUTES: &str = "/admin/*";

/// Identity and rate-limit state for an authenticated request.
#[derive(Clone, Debug, PartialEq)]
pub struct Authenticated {
    pub context: RequestContext,
    pub rate_limit: RateLimitStatus,
    pub client_ip: Option<IpAddr>,
}

/// A refused request. Rejections raised after the request was counted against
/// the key's budget carry the resulting rate-limit state.
#[derive(Clone, Debug, PartialEq)]
pub struct Rejection {
    pub error: GatewayError,
    pub rate_limit: Option<RateLimitStatus>,
}

impl From<GatewayError> for Rejection {
    fn from(error: GatewayError) -> Self {
        Rejection {
            error,
            rate_limit: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AuthOutcome {
    /// CORS preflight or an excluded path.
    Public,
    Authenticated(Authenticated),
}

pub struct Authenticator {
    extractor: CredentialExtractor,
    cache: ValidationCache,
    rate_limiter: RateLimiter,
    exclusions: Vec<PathPattern>,
    scopes: RouteTable<String>,
    key_prefix: String,
    default_rate_limit: u32,
    trust_forwarded_for: bool,
    ip_allowlist: Vec<String>,
}

impl Authenticator {
    pub fn new(
        config: &Config,
        cache: ValidationCache,
        rate_limiter: RateLimiter,
    ) -> Result<Self, ValidationError> {
        let auth = &config.auth;

        // Admin routes always require the admin scope, ahead of any configured rule.
        let mut routes = vec![Route::new(ADMIN_ROUTES, None, auth.admin_scope.clone())];
        for rule in &config.scopes {
            routes.push(Route::new(
                &rule.path,
                Some(rule.parsed_methods()?),
                rule.scope.clone(),
            ));
        }

        Ok(Authenticator {
            extractor: CredentialExtractor::new(auth.allow_query_param, auth.query_param.clone()),
            cache,
            rate_limiter,
            exclusions: auth
                .exclude_paths
                .iter()
                .map(|p| PathPattern::parse(p))
                .collect(),
            scopes: RouteTable::new(routes),
            key_prefix: auth.key_prefix.clone(),
            default_rate_limit: auth.default_rate_limit_per_hour,
            trust_forwarded_for: auth.trust_forwarded_for,
            ip_allowlist: config.ip_allowlist.clone(),
        })
    }

    /// Query parameter that may carry a credential; never forwarded upstream.
    pub fn query_param(&self) -> &str {
        self.extractor.query_param()
    }

    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        method == Method::OPTIONS || self.exclusions.iter().any(|p| p.matches(path).is_some())
    }

    pub fn required_scope(&self, method: &Method, path: &str) -> Option<String> {
        self.scopes
            .resolve(method, path)
            .map(|route| route.action.clone())
    }

    pub async fn authenticate<B>(
        &self,
        req: &Request<B>,
        request_id: &str,
    ) -> Result<AuthOutcome, Rejection> {
        let method = req.method();
        let path = req.uri().path();

        if self.is_public(method, path) {
            return Ok(AuthOutcome::Public);
        }

        let result = self.check(req, request_id).await;
        if let Err(rejection) = &result {
            let reason = rejection.error.reason();
            counter!(AUTH_FAILURES, "reason" => reason).increment(1);
            tracing::info!(
                request_id,
                method = %method,
                path,
                reason,
                "request rejected"
            );
        }
        result.map(AuthOutcome::Authenticated)
    }

    async fn check<B>(
        &self,
        req: &Request<B>,
        request_id: &str,
    ) -> Result<Authenticated, Rejection> {
        let (credential, source) = self
            .extractor
            .extract(req.headers(), req.uri())
            .ok_or(GatewayError::MissingCredential)?;

        if source == CredentialSource::QueryParam {
            tracing::warn!(
                request_id,
                credential = %credential.masked(),
                "API key passed as a query parameter; use the Authorization header instead"
            );
        }

        let environment = credential.environment(&self.key_prefix).ok_or_else(|| {
            tracing::debug!(request_id, credential = %credential.masked(), "malformed API key");
            GatewayError::InvalidCredential("Invalid API key format".into())
        })?;

        let result = match self.cache.validate(&credential).await {
            Ok(result) => result,
            Err(e) => {
                // Fail closed, but keep outages distinguishable in the logs.
                tracing::warn!(
                    request_id,
                    credential = %credential.masked(),
                    kind = e.kind(),
                    error = %e,
                    "auth service call failed"
                );
                let detail = match e {
                    AuthError::ServiceTimeout => "Authentication service timed out",
                    AuthError::ServiceUnavailable(_) => "Authentication service unavailable",
                };
                return Err(GatewayError::InvalidCredential(detail.into()).into());
            }
        };

        if !result.valid {
            return Err(GatewayError::InvalidCredential(
                result.error.unwrap_or_else(|| "Invalid API key".into()),
            )
            .into());
        }
        let Some(user_id) = result.user_id else {
            tracing::warn!(request_id, "auth service returned a valid key without a user id");
            return Err(GatewayError::InvalidCredential("Invalid API key".into()).into());
        };
        let key_id = result
            .key_id
            .unwrap_or_else(|| credential.digest()[..16].to_string());

        let client_ip = self.client_ip(req);
        let key_allowlist = result.ip_allowlist.unwrap_or_default();
        for allowlist in [&self.ip_allowlist, &key_allowlist] {
            if allowlist.is_empty() {
                continue;
            }
            match client_ip {
                Some(addr) if ip::is_allowed(allowlist, addr) => {}
                _ => return Err(GatewayError::IpNotAllowed.into()),
            }
        }

        let limit = result.rate_limit_per_hour.unwrap_or(self.default_rate_limit);
        let rate_limit = self.rate_limiter.check(&key_id, limit).await;
        if rate_limit.exceeded {
            return Err(Rejection {
                error: GatewayError::RateLimitExceeded {
                    retry_after_secs: rate_limit.retry_after_secs(),
                },
                rate_limit: Some(rate_limit),
            });
        }

        let context = RequestContext {
            user_id,
            key_id,
            scopes: result.scopes,
            rate_limit_per_hour: limit,
            environment: Some(environment),
        };

        if let Some(required) = self.required_scope(req.method(), req.uri().path())
            && !context.has_scope(&required)
        {
            return Err(Rejection {
                error: GatewayError::InsufficientScope(required),
                rate_limit: Some(rate_limit),
            });
        }

        tracing::debug!(
            request_id,
            user_id = %context.user_id,
            key_id = %context.key_id,
            "request authenticated"
        );

        Ok(Authenticated {
            context,
            rate_limit,
            client_ip,
        })
    }

    fn client_ip<B>(&self, req: &Request<B>) -> Option<IpAddr> {
        if self.trust_forwarded_for
            && let Some(ip) = req
                .headers()
                .get(&X_FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|v| v.trim().parse().ok())
        {
            return Some(ip);
        }

        req.extensions().get::<ClientAddr>().map(|addr| addr.0.ip())
    }
}
