/// Prometheus metrics for the trust services
///
/// Covers HTTP traffic, login and refresh outcomes, challenge codes, review
/// transitions and background jobs. Rendered at `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter_vec, Encoder, Gauge,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========== Session Metrics ==========

    /// Login attempts by outcome
    pub static ref LOGIN_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "login_attempts_total",
        "Total number of login attempts",
        &["outcome"]
    )
    .unwrap();

    /// Refresh token redemptions by outcome
    pub static ref TOKEN_REFRESHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "token_refreshes_total",
        "Total number of refresh token redemptions",
        &["outcome"]
    )
    .unwrap();

    // ========== Challenge Metrics ==========

    /// Challenge codes issued by channel
    pub static ref CHALLENGE_CODES_ISSUED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "challenge_codes_issued_total",
        "Total number of contact challenge codes issued",
        &["channel", "delivered"]
    )
    .unwrap();

    /// Challenge code verifications by channel and outcome
    pub static ref CHALLENGE_VERIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "challenge_verifications_total",
        "Total number of contact challenge verification attempts",
        &["channel", "outcome"]
    )
    .unwrap();

    // ========== Review Metrics ==========

    /// Verification submissions
    pub static ref VERIFICATION_SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "verification_submissions_total",
        "Total number of document verification submissions",
        &["verification_type"]
    )
    .unwrap();

    /// Review transitions by derived action
    pub static ref REVIEW_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "review_transitions_total",
        "Total number of verification review transitions",
        &["action"]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0]
    )
    .unwrap();

    // ========== System Metrics ==========

    /// Application uptime in seconds
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "uptime_seconds",
        "Application uptime in seconds"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a login attempt
pub fn record_login(outcome: &str) {
    LOGIN_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a refresh token redemption
pub fn record_refresh(outcome: &str) {
    TOKEN_REFRESHES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record an issued challenge code
pub fn record_code_issued(channel: &str, delivered: bool) {
    CHALLENGE_CODES_ISSUED_TOTAL
        .with_label_values(&[channel, if delivered { "yes" } else { "no" }])
        .inc();
}

/// Record a challenge verification attempt
pub fn record_code_verification(channel: &str, outcome: &str) {
    CHALLENGE_VERIFICATIONS_TOTAL
        .with_label_values(&[channel, outcome])
        .inc();
}

/// Record a verification submission
pub fn record_submission(verification_type: &str) {
    VERIFICATION_SUBMISSIONS_TOTAL
        .with_label_values(&[verification_type])
        .inc();
}

/// Record a review transition
pub fn record_review_transition(action: &str) {
    REVIEW_TRANSITIONS_TOTAL.with_label_values(&[action]).inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}
