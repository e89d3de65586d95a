use crate::config::{Config, TargetConfig};
use crate::gateway_service::{Gateway, GatewayService};
use async_trait::async_trait;
use auth::store::MemoryStore;
use auth::{AuthError, Credential, KeyValidator, UsageRecord, UsageRecorder, ValidationResult};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use parking_lot::Mutex;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use url::Url;

pub const TEST_CONFIG: &str = r#"
listener:
    host: 127.0.0.1
    port: 8000
auth:
    service_url: http://auth.internal/api/v1/keys/validate
proxy:
    timeout_secs: 30
    targets:
        - prefix: /mlflow
          upstream: http://mlflow.internal:5000
        - prefix: /api/v1/mlflow
          upstream: http://mlflow.internal:5000
"#;

pub fn test_config() -> Config {
    serde_yaml::from_str(TEST_CONFIG).unwrap()
}

/// Validator with a scripted outcome and a call counter.
pub struct FakeValidator {
    outcome: Mutex<Result<ValidationResult, AuthError>>,
    calls: AtomicUsize,
}

impl FakeValidator {
    pub fn new(outcome: Result<ValidationResult, AuthError>) -> Arc<Self> {
        Arc::new(FakeValidator {
            outcome: Mutex::new(outcome),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, outcome: Result<ValidationResult, AuthError>) {
        *self.outcome.lock() = outcome;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValidator for FakeValidator {
    async fn validate_key(&self, _: &Credential) -> Result<ValidationResult, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.lock().clone()
    }
}

/// Loopback upstream that echoes the request it received as JSON.
pub struct MockUpstream {
    addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    delay: Arc<Mutex<Duration>>,
}

impl MockUpstream {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let delay = Arc::new(Mutex::new(Duration::ZERO));

        let server_calls = calls.clone();
        let server_delay = delay.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let calls = server_calls.clone();
                let delay = server_delay.clone();

                tokio::spawn(async move {
                    let svc = service_fn(move |req: Request<Incoming>| {
                        let calls = calls.clone();
                        let delay = *delay.lock();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(delay).await;
                            Ok::<_, Infallible>(echo(req).await)
                        }
                    });
                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), svc)
                        .await;
                });
            }
        });

        MockUpstream { addr, calls, delay }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

async fn echo(req: Request<Incoming>) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();

    let headers: serde_json::Map<String, serde_json::Value> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                json!(value.to_str().unwrap_or_default()),
            )
        })
        .collect();

    let payload = json!({
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    });

    let mut response = Response::new(Full::new(Bytes::from(payload.to_string())));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert("content-type", "application/json".parse().unwrap());
    response
        .headers_mut()
        .insert("x-upstream", "mock".parse().unwrap());
    response
}

/// A running gateway on a loopback port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    pub usage: mpsc::Receiver<UsageRecord>,
}

impl TestGateway {
    /// Starts a gateway whose targets all point at `upstream`.
    pub async fn spawn(mut config: Config, validator: Arc<FakeValidator>, upstream: Url) -> Self {
        for target in &mut config.proxy.targets {
            *target = TargetConfig {
                upstream: upstream.clone(),
                ..target.clone()
            };
        }

        let (usage_recorder, usage) = UsageRecorder::channel(1024);
        let gateway = Arc::new(
            Gateway::new(
                &config,
                Arc::new(MemoryStore::new()),
                validator,
                usage_recorder,
            )
            .unwrap(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = GatewayService::new(gateway.clone());
        tokio::spawn(shared::http::serve(listener, service));

        TestGateway {
            addr,
            gateway,
            usage,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}
