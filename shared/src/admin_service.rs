use crate::http::{json_response, make_error_response};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Status code and JSON body of a health probe.
#[derive(Clone, Debug, PartialEq)]
pub struct HealthReport {
    pub status_code: StatusCode,
    pub body: serde_json::Value,
}

/// Source of the liveness and readiness signals served to load balancers.
pub trait HealthSource: Send + Sync + 'static {
    fn liveness(&self) -> HealthReport;
    fn readiness(&self) -> HealthReport;
}

/// Serves `/health` and `/ready` on a dedicated admin listener.
pub struct AdminService<H> {
    health: Arc<H>,
}

impl<H: HealthSource> AdminService<H> {
    pub fn new(health: Arc<H>) -> Self {
        Self { health }
    }
}

impl<H: HealthSource> Service<Request<Incoming>> for AdminService<H> {
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let res = route(self.health.as_ref(), req.method(), req.uri().path());
        Box::pin(async move { Ok(res) })
    }
}

fn route<H: HealthSource>(
    health: &H,
    method: &Method,
    path: &str,
) -> Response<BoxBody<Bytes, Infallible>> {
    if method != Method::GET && method != Method::HEAD {
        return make_error_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    let report = match path {
        "/health" => health.liveness(),
        "/ready" => health.readiness(),
        _ => return make_error_response(StatusCode::NOT_FOUND),
    };

    json_response(report.status_code, &report.body)
}
