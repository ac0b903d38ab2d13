/*!
 * Monitoring
 * Structured tracing for contexts, channels and copies
 */

mod tracer;

pub use tracer::{init_tracing, span_copy, CopySpan, SLOW_COPY_THRESHOLD};
