use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "gateway.request.duration",
    metric_type: MetricType::Histogram,
    description: "Gateway request duration in seconds. Tagged with status.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "gateway.requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of requests currently being processed",
};

pub const AUTH_FAILURES: MetricDef = MetricDef {
    name: "gateway.auth.failures",
    metric_type: MetricType::Counter,
    description: "Number of rejected requests, tagged by reason",
};

pub const UPSTREAM_DURATION: MetricDef = MetricDef {
    name: "gateway.upstream.duration",
    metric_type: MetricType::Histogram,
    description: "Time until upstream response headers in seconds",
};

pub const UPSTREAM_FAILURES: MetricDef = MetricDef {
    name: "gateway.upstream.failures",
    metric_type: MetricType::Counter,
    description: "Number of failed upstream calls, tagged by kind",
};

pub const BREAKER_TRANSITIONS: MetricDef = MetricDef {
    name: "gateway.circuit_breaker.transitions",
    metric_type: MetricType::Counter,
    description: "Number of circuit breaker state changes, tagged by target state",
};

pub const BREAKER_REJECTIONS: MetricDef = MetricDef {
    name: "gateway.circuit_breaker.rejected",
    metric_type: MetricType::Counter,
    description: "Number of upstream calls short-circuited by the breaker",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    REQUESTS_INFLIGHT,
    AUTH_FAILURES,
    UPSTREAM_DURATION,
    UPSTREAM_FAILURES,
    BREAKER_TRANSITIONS,
    BREAKER_REJECTIONS,
];
