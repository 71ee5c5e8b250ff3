/*!
 * Monitoring
 * Tracing setup and per-call spans
 */

pub mod tracer;

// Re-export public API
pub use tracer::{generate_trace_id, init_tracing, CallSpan, TRACE_JSON_ENV};
