use crate::config::{CommonConfig, LoggingConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const METRICS_PREFIX: &str = "mlgate";

#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("statsd exporter error: {0}")]
    Statsd(#[from] metrics_exporter_statsd::StatsdError),
    #[error("invalid sentry DSN: {0}")]
    InvalidDsn(#[from] sentry::types::ParseDsnError),
    #[error("a metrics recorder is already installed")]
    RecorderInstalled,
}

/// Keeps the sentry client alive; dropping it flushes pending events.
pub struct Guard {
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Installs logging, error reporting and metrics. Must run before the tokio
/// runtime is started so that no events are lost.
pub fn init(common: &CommonConfig) -> Result<Guard, ObservabilityError> {
    let logging = common.logging.clone().unwrap_or_default();

    let sentry = match logging.sentry_dsn.as_deref() {
        Some(dsn) => Some(sentry::init(sentry::ClientOptions {
            dsn: Some(dsn.parse()?),
            release: sentry::release_name!(),
            ..Default::default()
        })),
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter(&logging))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    if let Some(metrics) = &common.metrics {
        let recorder = metrics_exporter_statsd::StatsdBuilder::from(
            metrics.statsd_host.as_str(),
            metrics.statsd_port,
        )
        .build(Some(METRICS_PREFIX))?;
        metrics::set_global_recorder(recorder).map_err(|_| ObservabilityError::RecorderInstalled)?;
        tracing::info!(
            host = %metrics.statsd_host,
            port = metrics.statsd_port,
            "statsd metrics enabled"
        );
    }

    Ok(Guard { _sentry: sentry })
}

fn env_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
