pub mod circuit_breaker;
pub mod config;
pub mod errors;
mod forward;
pub mod gateway_service;
pub mod headers;
pub mod health;
pub mod metrics_defs;
pub mod middleware;
pub mod upstreams;

#[cfg(test)]
mod testutils;

use auth::{AuthServiceClient, UsageRecorder};
use gateway_service::{Gateway, GatewayService};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use shared::metrics_defs::describe_all;
use std::sync::Arc;
use std::time::Duration;

pub use errors::{GatewayError, ProxyError};

pub async fn run(config: config::Config) -> Result<(), ProxyError> {
    config.validate()?;
    describe_all(metrics_defs::ALL_METRICS);
    describe_all(auth::metrics_defs::ALL_METRICS);

    let store = auth::store::from_config(&config.store).await?;
    let auth_timeout = Duration::from_millis(config.auth.timeout_ms);
    let validator = Arc::new(AuthServiceClient::new(
        config.auth.service_url.clone(),
        auth_timeout,
    )?);
    let usage = UsageRecorder::spawn(
        config.auth.usage_url.clone(),
        auth_timeout,
        config.auth.usage_queue_size,
    )?;

    let gateway = Arc::new(Gateway::new(&config, store, validator, usage)?);

    let gateway_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        GatewayService::new(gateway.clone()),
    );

    match &config.admin_listener {
        Some(admin) => {
            let admin_task =
                run_http_service(&admin.host, admin.port, AdminService::new(gateway.health()));
            tokio::try_join!(gateway_task, admin_task)?;
        }
        None => gateway_task.await?,
    }

    Ok(())
}
