// Identity headers between the gateway and the upstream. The upstream trusts
// these headers, so anything a client sent under the same names is removed
// before the gateway's own values are added.

use auth::credential::API_KEY_HEADER;
use auth::types::RequestContext;
use http::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, PROXY_AUTHORIZATION};
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
pub static KEY_ID_HEADER: HeaderName = HeaderName::from_static("x-api-key-id");
pub static SCOPES_HEADER: HeaderName = HeaderName::from_static("x-user-scopes");

#[derive(Clone, Debug)]
pub struct IdentityHeaders {
    user: HeaderName,
}

impl IdentityHeaders {
    pub fn new(user_header: &str) -> Result<Self, http::header::InvalidHeaderName> {
        Ok(IdentityHeaders {
            user: HeaderName::from_bytes(user_header.as_bytes())?,
        })
    }

    /// Drops gateway credentials and any client-supplied identity headers.
    pub fn strip(&self, headers: &mut HeaderMap) {
        for name in [
            &AUTHORIZATION,
            &API_KEY_HEADER,
            &PROXY_AUTHORIZATION,
            &self.user,
            &KEY_ID_HEADER,
            &SCOPES_HEADER,
        ] {
            headers.remove(name);
        }
    }

    pub fn inject(&self, headers: &mut HeaderMap, ctx: &RequestContext) {
        // Values come from the auth service; skip anything not header-safe.
        let values = [
            (&self.user, ctx.user_id.clone()),
            (&KEY_ID_HEADER, ctx.key_id.clone()),
            (&SCOPES_HEADER, ctx.scopes_header_value()),
        ];
        for (name, value) in values {
            match HeaderValue::try_from(value) {
                Ok(value) => {
                    headers.insert(name.clone(), value);
                }
                Err(_) => tracing::warn!(header = %name, "dropping invalid identity header value"),
            }
        }
    }
}

/// Returns the client's request id, or assigns a new one.
pub fn ensure_request_id(headers: &mut HeaderMap) -> String {
    if let Some(id) = headers
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return id.to_string();
    }

    let id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&id) {
        headers.insert(REQUEST_ID_HEADER.clone(), value);
    }
    id
}
