//! Value types the keeper hands to callers.

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenSecret},
};

/// Result of one shared refresh attempt; every waiter receives the same value.
#[derive(Clone, Debug)]
pub enum RefreshOutcome {
	/// Provider issued a new token; the record was replaced as a whole.
	Success(TokenRecord),
	/// Refresh token is dead; a new authorization is required.
	PermanentFailure(String),
	/// Network, provider 5xx or timeout; the next caller or scheduler tick tries again.
	TransientFailure(String),
}

/// Lifecycle state of the kept record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeeperState {
	/// No record has been installed yet.
	Unconfigured,
	/// Record is outside the refresh buffer.
	Valid,
	/// Record is inside the refresh buffer (or past expiry after failed refreshes).
	ExpiringSoon,
	/// A refresh is in flight.
	Refreshing,
	/// Provider permanently rejected the refresh token; only `install` recovers.
	Invalid,
}

/// Health/diagnostics view of the keeper.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeeperStatus {
	/// A record is present, not invalidated, and not past its hard expiry.
	pub valid: bool,
	/// Current lifecycle state.
	pub state: KeeperState,
	/// Expiry of the current record, if any.
	#[serde(with = "time::serde::rfc3339::option")]
	pub expires_at: Option<OffsetDateTime>,
	/// Whether the background scheduler may refresh proactively.
	pub auto_refresh_enabled: bool,
	/// Set when the in-memory record could not be written to the store.
	pub persist_diverged: bool,
}

/// Stable copy of the credential taken when `ensure_valid` returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSnapshot {
	/// Access token to attach as a bearer credential.
	pub access_token: TokenSecret,
	/// Expiry of `access_token`.
	pub expires_at: OffsetDateTime,
}
impl From<&TokenRecord> for TokenSnapshot {
	fn from(record: &TokenRecord) -> Self {
		Self { access_token: record.access_token.clone(), expires_at: record.expires_at }
	}
}
