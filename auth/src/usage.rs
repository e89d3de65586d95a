//! Non-blocking usage/audit recording.
//!
//! Request handlers hand records to a bounded queue and move on. A single
//! background worker drains it, logs each record on the `audit` target, and
//! optionally forwards it to the usage endpoint of the auth service.

use crate::metrics_defs::USAGE_RECORDS_DROPPED;
use serde::Serialize;
use shared::counter;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use url::Url;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UsageRecord {
    pub timestamp: u64,
    pub request_id: String,
    pub key_id: String,
    pub user_id: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub client_ip: Option<String>,
    pub duration_ms: u64,
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct UsageRecorder {
    tx: mpsc::Sender<UsageRecord>,
}

impl UsageRecorder {
    /// Starts the background worker. Must be called from within a tokio runtime.
    pub fn spawn(
        usage_url: Option<Url>,
        timeout: Duration,
        queue_size: usize,
    ) -> Result<Self, reqwest::Error> {
        let sink = match usage_url {
            Some(url) => Some((reqwest::Client::builder().timeout(timeout).build()?, url)),
            None => None,
        };

        let (recorder, rx) = Self::channel(queue_size);
        tokio::spawn(run_worker(rx, sink));
        Ok(recorder)
    }

    /// A recorder whose records are delivered to the returned receiver.
    pub fn channel(queue_size: usize) -> (Self, mpsc::Receiver<UsageRecord>) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        (UsageRecorder { tx }, rx)
    }

    pub fn record(&self, record: UsageRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                counter!(USAGE_RECORDS_DROPPED).increment(1);
                tracing::warn!(key_id = %record.key_id, "usage queue full, dropping record");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::error!("usage worker is not running");
            }
        }
    }
}

async fn run_worker(mut rx: mpsc::Receiver<UsageRecord>, sink: Option<(reqwest::Client, Url)>) {
    while let Some(record) = rx.recv().await {
        tracing::info!(
            target: "audit",
            request_id = %record.request_id,
            key_id = %record.key_id,
            user_id = %record.user_id,
            method = %record.method,
            path = %record.path,
            status = record.status,
            client_ip = record.client_ip.as_deref().unwrap_or("-"),
            duration_ms = record.duration_ms,
            "request completed"
        );

        if let Some((client, url)) = &sink {
            let result = client
                .post(url.clone())
                .json(&record)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to forward usage record");
            }
        }
    }
    tracing::debug!("usage worker stopped");
}
