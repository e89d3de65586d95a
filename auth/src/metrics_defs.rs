//! Metrics definitions for authentication.

use shared::metrics_defs::{MetricDef, MetricType};

pub const VALIDATION_CACHE_HIT: MetricDef = MetricDef {
    name: "auth.validation_cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of credential validations answered from the cache",
};

pub const VALIDATION_CACHE_MISS: MetricDef = MetricDef {
    name: "auth.validation_cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of credential validations that required the auth service",
};

pub const AUTH_SERVICE_DURATION: MetricDef = MetricDef {
    name: "auth.service.duration",
    metric_type: MetricType::Histogram,
    description: "Time taken by the auth service to validate a key in seconds",
};

pub const AUTH_SERVICE_ERRORS: MetricDef = MetricDef {
    name: "auth.service.errors",
    metric_type: MetricType::Counter,
    description: "Number of failed calls to the auth service, tagged by kind",
};

pub const STORE_ERRORS: MetricDef = MetricDef {
    name: "auth.store.errors",
    metric_type: MetricType::Counter,
    description: "Number of failed cache or counter store operations",
};

pub const RATE_LIMIT_EXCEEDED: MetricDef = MetricDef {
    name: "auth.rate_limit.exceeded",
    metric_type: MetricType::Counter,
    description: "Number of requests rejected by the rate limiter",
};

pub const USAGE_RECORDS_DROPPED: MetricDef = MetricDef {
    name: "auth.usage.dropped",
    metric_type: MetricType::Counter,
    description: "Number of usage records dropped because the queue was full",
};

pub const ALL_METRICS: &[MetricDef] = &[
    VALIDATION_CACHE_HIT,
    VALIDATION_CACHE_MISS,
    AUTH_SERVICE_DURATION,
    AUTH_SERVICE_ERRORS,
    STORE_ERRORS,
    RATE_LIMIT_EXCEEDED,
    USAGE_RECORDS_DROPPED,
];
