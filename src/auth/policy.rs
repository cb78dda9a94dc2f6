//! Pure expiration checks and the refresh policy they consult.
//!
//! Nothing here touches a clock on its own; every check takes `now` so the timing rules stay
//! testable without a scheduler.

// self
use crate::{_prelude::*, auth::TokenRecord, error::ConfigError};

/// Default window before `expires_at` in which a token counts as expiring soon.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::minutes(5);

/// Process-wide refresh toggle and buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshPolicy {
	/// Whether the background scheduler may refresh proactively.
	pub auto_refresh_enabled: bool,
	/// Window before expiry in which a token is eligible for proactive refresh.
	pub buffer: Duration,
}
impl RefreshPolicy {
	/// Creates a policy with the provided toggle and buffer.
	pub fn new(auto_refresh_enabled: bool, buffer: Duration) -> Self {
		Self { auto_refresh_enabled, buffer }
	}

	/// Overrides the auto-refresh toggle.
	pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
		self.auto_refresh_enabled = enabled;

		self
	}

	/// Overrides the refresh buffer.
	pub fn with_buffer(mut self, buffer: Duration) -> Self {
		self.buffer = buffer;

		self
	}

	/// Buffer expressed in whole minutes, the unit used by persisted documents.
	pub fn buffer_minutes(&self) -> i64 {
		self.buffer.whole_minutes()
	}

	/// Rejects negative buffers.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.buffer.is_negative() {
			return Err(ConfigError::InvalidSetting {
				field: "refresh_buffer",
				reason: "must not be negative",
			});
		}

		Ok(())
	}
}
impl Default for RefreshPolicy {
	fn default() -> Self {
		Self { auto_refresh_enabled: true, buffer: DEFAULT_REFRESH_BUFFER }
	}
}

/// Converts whole minutes into a refresh buffer.
///
/// Returns `None` for negative values and for values past the range of [`Duration`].
pub fn buffer_from_minutes(minutes: i64) -> Option<Duration> {
	if minutes < 0 {
		return None;
	}

	minutes.checked_mul(60).map(Duration::seconds)
}

/// Returns `true` once `now` reaches the record's hard expiry (boundary inclusive).
pub fn is_expired(record: &TokenRecord, now: OffsetDateTime) -> bool {
	now >= record.expires_at
}

/// Returns `true` once `now` enters the policy buffer preceding the record's expiry.
///
/// A buffer reaching past the earliest representable instant covers every `now`.
pub fn is_expiring_soon(record: &TokenRecord, policy: &RefreshPolicy, now: OffsetDateTime) -> bool {
	record.expires_at.checked_sub(policy.buffer).is_none_or(|window_start| now >= window_start)
}
