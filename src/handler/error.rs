//! Mapping of counter failures onto the response envelope.

use tracing::{error, warn};

use super::envelope::ResponseEnvelope;
use crate::counter::CounterError;

/// Seconds a caller should wait before retrying a contended increment.
const RETRY_AFTER_SECS: &str = "1";

/// HTTP-style status for a counter failure.
pub fn status_code(err: &CounterError) -> u16 {
    match err {
        CounterError::NotFound { .. } => 404,
        CounterError::ConcurrencyConflict { .. } => 503,
        CounterError::StorageUnavailable { .. } => 500,
    }
}

/// Message shown to callers. Never includes backend detail.
pub fn public_message(err: &CounterError) -> &'static str {
    match err {
        CounterError::NotFound { .. } => "counter not initialized",
        CounterError::ConcurrencyConflict { .. } => "counter busy, retry later",
        CounterError::StorageUnavailable { .. } => "storage unavailable",
    }
}

/// Log the full error and build the generic envelope for it.
pub fn error_envelope(err: &CounterError) -> ResponseEnvelope {
    match err {
        CounterError::StorageUnavailable { .. } => error!(error = %err, "increment failed"),
        _ => warn!(error = %err, "increment rejected"),
    }

    let envelope = ResponseEnvelope::error(status_code(err), public_message(err));
    if err.is_retryable() {
        envelope.with_header("Retry-After", RETRY_AFTER_SECS)
    } else {
        envelope
    }
}
