/*!
 * Tracing
 * Structured logging setup and spans around cross-memory copies
 *
 * Environment variables:
 * - RUST_LOG: log level (default: info)
 * - CMA_TRACE_JSON: JSON output when `1` or `true`
 */

use crate::core::types::{Pid, Size};
use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Copies slower than this are reported at warn level
pub const SLOW_COPY_THRESHOLD: Duration = Duration::from_millis(10);

/// Install the global subscriber
///
/// Returns false when a subscriber was already installed, so calling it
/// more than once is harmless.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("CMA_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true),
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
        info!(json = use_json, "Tracing initialized");
    }
    installed
}

/// Span covering one `process_vm_readv`
pub struct CopySpan {
    span: tracing::Span,
    start: Instant,
    pid: Pid,
    len: Size,
}

impl CopySpan {
    pub fn new(pid: Pid, len: Size) -> Self {
        let span = span!(
            Level::DEBUG,
            "copy",
            pid = pid,
            len = len,
            duration_us = tracing::field::Empty,
            result = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            pid,
            len,
        }
    }

    pub fn record_result(&self, success: bool) {
        self.span
            .record("result", if success { "success" } else { "error" });
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for CopySpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        if duration > SLOW_COPY_THRESHOLD {
            warn!(
                pid = self.pid,
                len = self.len,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow copy detected"
            );
        } else {
            debug!(
                pid = self.pid,
                len = self.len,
                duration_us = duration.as_micros() as u64,
                "copy completed"
            );
        }
    }
}

#[inline]
pub fn span_copy(pid: Pid, len: Size) -> CopySpan {
    CopySpan::new(pid, len)
}
