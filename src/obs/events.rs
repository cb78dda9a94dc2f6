//! Structured log events emitted by the keeper; no-ops without the `tracing` feature.
//!
//! Secrets never reach these helpers: callers pass instants, counts and reason strings only.

// self
use crate::_prelude::*;

/// A refresh replaced the record.
pub fn refresh_succeeded(expires_at: OffsetDateTime, rotated: bool) {
	#[cfg(feature = "tracing")]
	tracing::info!(%expires_at, rotated, "token refreshed");
	#[cfg(not(feature = "tracing"))]
	let _ = (expires_at, rotated);
}

/// A refresh failed; `permanent` failures require a new authorization.
pub fn refresh_failed(reason: &str, permanent: bool) {
	#[cfg(feature = "tracing")]
	if permanent {
		tracing::error!(reason, "refresh token rejected, re-authorization required");
	} else {
		tracing::warn!(reason, "token refresh failed, will retry later");
	}
	#[cfg(not(feature = "tracing"))]
	let _ = (reason, permanent);
}

/// The in-memory record diverged from durable state.
pub fn persist_failed(error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::error!(error = %error, "failed to persist token record, in-memory state now diverges");
	#[cfg(not(feature = "tracing"))]
	let _ = error;
}

/// A caller received the current token even though its refresh failed.
pub fn stale_token_served(expires_at: OffsetDateTime, reason: &str) {
	#[cfg(feature = "tracing")]
	tracing::warn!(%expires_at, reason, "serving current token after failed refresh");
	#[cfg(not(feature = "tracing"))]
	let _ = (expires_at, reason);
}

/// A brand-new record was installed from outside the refresh path.
pub fn record_installed(expires_at: OffsetDateTime) {
	#[cfg(feature = "tracing")]
	tracing::info!(%expires_at, "token record installed");
	#[cfg(not(feature = "tracing"))]
	let _ = expires_at;
}

/// The protected API rejected the bearer credential.
pub fn unauthorized_response(status: u16, will_retry: bool) {
	#[cfg(feature = "tracing")]
	if will_retry {
		tracing::info!(status, "protected API rejected token, forcing refresh and retrying once");
	} else {
		tracing::warn!(status, "protected API rejected refreshed token, giving up");
	}
	#[cfg(not(feature = "tracing"))]
	let _ = (status, will_retry);
}

/// A scheduler tick did not run.
pub fn tick_skipped(reason: &'static str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(reason, "scheduler tick skipped");
	#[cfg(not(feature = "tracing"))]
	let _ = reason;
}

/// A scheduler tick finished with the provided outcome label.
pub fn tick_completed(outcome: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(outcome, "scheduler tick completed");
	#[cfg(not(feature = "tracing"))]
	let _ = outcome;
}
