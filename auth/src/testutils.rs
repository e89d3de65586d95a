use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

pub struct MockReply {
    status: u16,
    body: String,
    delay: Duration,
}

impl MockReply {
    pub fn json(status: u16, body: &str) -> Self {
        MockReply {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Loopback HTTP server standing in for the auth service. Replies are chosen
/// by the `api_key` field of the request body; every request is counted.
pub struct MockAuthServer {
    port: u16,
    calls: Arc<AtomicUsize>,
    bodies: Arc<parking_lot::Mutex<Vec<serde_json::Value>>>,
}

impl MockAuthServer {
    pub async fn spawn<F>(reply: F) -> Self
    where
        F: Fn(&str) -> MockReply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let calls = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let reply = Arc::new(reply);

        let server_calls = calls.clone();
        let server_bodies = bodies.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let io = TokioIo::new(stream);
                let reply = reply.clone();
                let calls = server_calls.clone();
                let bodies = server_bodies.clone();

                tokio::spawn(async move {
                    let svc = service_fn(move |req: Request<Incoming>| {
                        let reply = reply.clone();
                        let calls = calls.clone();
                        let bodies = bodies.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            let bytes = req
                                .into_body()
                                .collect()
                                .await
                                .map(|c| c.to_bytes())
                                .unwrap_or_default();
                            let json: serde_json::Value =
                                serde_json::from_slice(&bytes).unwrap_or_default();
                            let key = json["api_key"].as_str().unwrap_or_default().to_string();
                            bodies.lock().push(json);

                            let MockReply {
                                status,
                                body,
                                delay,
                            } = reply(&key);
                            tokio::time::sleep(delay).await;

                            let mut response = Response::new(Full::new(Bytes::from(body)));
                            *response.status_mut() =
                                hyper::StatusCode::from_u16(status).unwrap();
                            response
                                .headers_mut()
                                .insert("content-type", "application/json".parse().unwrap());
                            Ok::<_, Infallible>(response)
                        }
                    });

                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await;
                });
            }
        });

        MockAuthServer {
            port,
            calls,
            bodies,
        }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://127.0.0.1:{}/api/v1/keys/validate", self.port)).unwrap()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.bodies.lock().clone()
    }
}
