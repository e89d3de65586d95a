use crate::circuit_breaker::CircuitBreaker;
use crate::errors::GatewayError;
use crate::metrics_defs::{BREAKER_REJECTIONS, UPSTREAM_DURATION, UPSTREAM_FAILURES};
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};

type HttpsClient = Client<HttpsConnector<HttpConnector>, Incoming>;

/// Sends requests to the upstream behind the circuit breaker.
pub struct Forwarder {
    client: HttpsClient,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(breaker: Arc<CircuitBreaker>, timeout: Duration) -> Self {
        let builder = match HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                tracing::warn!(error = %e, "no native root certificates, using bundled roots");
                HttpsConnectorBuilder::new().with_webpki_roots()
            }
        };
        let connector = builder.https_or_http().enable_http1().build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Forwarder {
            client,
            breaker,
            timeout,
        }
    }

    /// Sends `req`, which must already carry the upstream URI and headers.
    ///
    /// The timeout covers the wait for response headers only; the body is
    /// streamed back to the client unbounded.
    ///
    /// Any HTTP response counts as a success for the breaker; only timeouts
    /// and transport errors count as failures. If the returned future is
    /// dropped before the upstream answers, no outcome is recorded.
    pub async fn forward(&self, req: Request<Incoming>) -> Result<Response<Incoming>, GatewayError> {
        if !self.breaker.allow() {
            counter!(BREAKER_REJECTIONS).increment(1);
            return Err(GatewayError::UpstreamUnavailable);
        }

        let mut pending = PendingCall {
            breaker: &self.breaker,
            settled: false,
        };

        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.client.request(req)).await;
        histogram!(UPSTREAM_DURATION).record(start.elapsed().as_secs_f64());

        match result {
            Ok(Ok(response)) => {
                pending.settle(Outcome::Success);
                Ok(response)
            }
            Ok(Err(e)) => {
                pending.settle(Outcome::Failure);
                let kind = if e.is_connect() { "connect" } else { "request" };
                counter!(UPSTREAM_FAILURES, "kind" => kind).increment(1);
                tracing::warn!(error = %e, kind, "upstream request failed");
                Err(GatewayError::UpstreamUnreachable)
            }
            Err(_) => {
                pending.settle(Outcome::Failure);
                counter!(UPSTREAM_FAILURES, "kind" => "timeout").increment(1);
                tracing::warn!(timeout_secs = self.timeout.as_secs_f64(), "upstream request timed out");
                Err(GatewayError::UpstreamTimeout)
            }
        }
    }
}

enum Outcome {
    Success,
    Failure,
}

/// Reports the outcome of an admitted call. Dropped unsettled means the client
/// went away, which says nothing about upstream health.
struct PendingCall<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl PendingCall<'_> {
    fn settle(&mut self, outcome: Outcome) {
        self.settled = true;
        match outcome {
            Outcome::Success => self.breaker.record_success(),
            Outcome::Failure => self.breaker.record_failure(),
        }
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!("upstream call cancelled by client");
            self.breaker.release_trial();
        }
    }
}
