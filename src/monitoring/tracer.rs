/*!
 * Call Tracing
 * Structured tracing for worker calls using the tracing crate
 *
 * Features:
 * - Trace ID per call for correlating controller and worker logs
 * - JSON-formatted output for structured parsing
 * - Slow-call warnings
 */

use crate::core::limits::SLOW_CALL_THRESHOLD;
use crate::core::types::WorkerId;
use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Environment variable enabling JSON output
pub const TRACE_JSON_ENV: &str = "SUBWORKER_TRACE_JSON";

/// Install a global subscriber
///
/// Environment variables:
/// - RUST_LOG: log level (default: info)
/// - SUBWORKER_TRACE_JSON: JSON output when `1` or `true`
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(TRACE_JSON_ENV)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "tracing initialized");
    }
    installed
}

pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one dispatched call, from encoding to trigger return
pub struct CallSpan {
    span: tracing::Span,
    start: Instant,
    callable: String,
    trace_id: String,
    threshold: Duration,
}

impl CallSpan {
    pub fn new(worker: WorkerId, callable: &str) -> Self {
        let trace_id = generate_trace_id();
        let span = span!(
            Level::DEBUG,
            "call",
            trace_id = %trace_id,
            worker = worker,
            callable = callable,
            payload_bytes = tracing::field::Empty,
            outcome = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            callable: callable.to_string(),
            trace_id,
            threshold: SLOW_CALL_THRESHOLD,
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn record_payload(&self, bytes: usize) {
        self.span.record("payload_bytes", bytes as u64);
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.span.record("outcome", outcome);
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for CallSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        if duration > self.threshold {
            warn!(
                trace_id = %self.trace_id,
                callable = %self.callable,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow call detected"
            );
        } else {
            debug!(
                trace_id = %self.trace_id,
                callable = %self.callable,
                duration_us = duration.as_micros() as u64,
                "call dispatched"
            );
        }
    }
}
