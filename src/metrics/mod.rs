/// Prometheus metrics for the kiosk search subsystem.
///
/// Collectors are process-wide statics registered once through [`init_metrics`]:
/// - Search requests and latency by path (ranked, browse, fallback, cached, short-circuit)
/// - Per-kind degradations and recovery attempts
/// - Connection pool occupancy and acquire latency
/// - Result cache hits and misses
/// - Index maintenance operations
///
/// Circuit breaker collectors live in [`crate::circuit_breaker`] and are
/// registered here as well.
///
/// # Example
/// ```no_run
/// use kiosk_search::metrics::SEARCH_REQUESTS_TOTAL;
///
/// SEARCH_REQUESTS_TOTAL
///     .with_label_values(&["ranked", "success"])
///     .inc();
/// ```
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter, Opts,
    Registry,
};

const NAMESPACE: &str = "kiosk_search";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Search Metrics
    // ============================================================================

    /// Total number of search requests
    ///
    /// Labels: path, outcome
    pub static ref SEARCH_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("search_requests_total", "Total number of search requests")
            .namespace(NAMESPACE),
        &["path", "outcome"]
    ).expect("Failed to create SEARCH_REQUESTS_TOTAL metric");

    /// Search duration in seconds
    ///
    /// Labels: path
    pub static ref SEARCH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("search_duration_seconds", "Search duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["path"]
    ).expect("Failed to create SEARCH_DURATION_SECONDS metric");

    /// Kinds answered by the substring scan inside a ranked search
    ///
    /// Labels: kind
    pub static ref SEARCH_KIND_DEGRADATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "search_kind_degradations_total",
            "Per-kind ranked queries that degraded to a substring scan"
        )
        .namespace(NAMESPACE),
        &["kind"]
    ).expect("Failed to create SEARCH_KIND_DEGRADATIONS_TOTAL metric");

    /// Recovery attempts by classified error kind and chosen strategy
    ///
    /// Labels: error_kind, strategy, outcome
    pub static ref RECOVERY_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("recovery_attempts_total", "Total number of recovery attempts")
            .namespace(NAMESPACE),
        &["error_kind", "strategy", "outcome"]
    ).expect("Failed to create RECOVERY_ATTEMPTS_TOTAL metric");

    // ============================================================================
    // Connection Pool Metrics
    // ============================================================================

    /// Pool connections by state
    ///
    /// Labels: state (active, idle, waiting)
    pub static ref POOL_CONNECTIONS: GaugeVec = GaugeVec::new(
        Opts::new("pool_connections", "Connection pool occupancy")
            .namespace(NAMESPACE),
        &["state"]
    ).expect("Failed to create POOL_CONNECTIONS metric");

    /// Time spent waiting for a pooled connection
    pub static ref POOL_ACQUIRE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "pool_acquire_duration_seconds",
            "Time spent acquiring a pooled connection"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).expect("Failed to create POOL_ACQUIRE_DURATION_SECONDS metric");

    /// Acquire calls that gave up waiting
    pub static ref POOL_ACQUIRE_TIMEOUTS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("pool_acquire_timeouts_total", "Acquire calls that timed out")
            .namespace(NAMESPACE)
    ).expect("Failed to create POOL_ACQUIRE_TIMEOUTS_TOTAL metric");

    // ============================================================================
    // Cache Metrics
    // ============================================================================

    /// Cache lookups
    ///
    /// Labels: cache, result (hit, miss)
    pub static ref CACHE_LOOKUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("cache_lookups_total", "Result cache lookups")
            .namespace(NAMESPACE),
        &["cache", "result"]
    ).expect("Failed to create CACHE_LOOKUPS_TOTAL metric");

    // ============================================================================
    // Index Metrics
    // ============================================================================

    /// Index maintenance operations
    ///
    /// Labels: operation (rebuild, repair, optimize, verify), kind, outcome
    pub static ref INDEX_OPERATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("index_operations_total", "Index maintenance operations")
            .namespace(NAMESPACE),
        &["operation", "kind", "outcome"]
    ).expect("Failed to create INDEX_OPERATIONS_TOTAL metric");

    /// Unhealthy kinds found by the last integrity check
    pub static ref INDEX_UNHEALTHY_KINDS: Gauge = Gauge::with_opts(
        Opts::new("index_unhealthy_kinds", "Kinds that failed the last integrity check")
            .namespace(NAMESPACE)
    ).expect("Failed to create INDEX_UNHEALTHY_KINDS metric");

    // ============================================================================
    // System Metrics
    // ============================================================================

    /// Build information
    ///
    /// Labels: version
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("build_info", "Build information")
            .namespace(NAMESPACE),
        &["version"]
    ).expect("Failed to create BUILD_INFO metric");
}

/// Initialize all metrics
///
/// Registers every collector with [`PROMETHEUS_REGISTRY`]. Call once at
/// startup; a second call fails with `AlreadyReg`.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    // Search
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_KIND_DEGRADATIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(RECOVERY_ATTEMPTS_TOTAL.clone()))?;

    // Pool
    PROMETHEUS_REGISTRY.register(Box::new(POOL_CONNECTIONS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(POOL_ACQUIRE_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(POOL_ACQUIRE_TIMEOUTS_TOTAL.clone()))?;

    // Cache and index
    PROMETHEUS_REGISTRY.register(Box::new(CACHE_LOOKUPS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(INDEX_OPERATIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(INDEX_UNHEALTHY_KINDS.clone()))?;

    crate::circuit_breaker::init_circuit_breaker_metrics(&PROMETHEUS_REGISTRY)?;

    PROMETHEUS_REGISTRY.register(Box::new(BUILD_INFO.clone()))?;
    BUILD_INFO
        .with_label_values(&[env!("CARGO_PKG_VERSION")])
        .set(1.0);

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Render all registered metrics in the Prometheus text exposition format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

/// Record the outcome and latency of one search request
pub fn record_search(path: &str, outcome: &str, elapsed: std::time::Duration) {
    SEARCH_REQUESTS_TOTAL
        .with_label_values(&[path, outcome])
        .inc();
    SEARCH_DURATION_SECONDS
        .with_label_values(&[path])
        .observe(elapsed.as_secs_f64());
}
