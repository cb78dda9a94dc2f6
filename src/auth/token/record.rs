//! Immutable token record structs, lifecycle helpers, and builders.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret, error::ConfigError};

/// Current lifecycle status for a token record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
	/// Token is currently valid.
	Active,
	/// Token reached its expiry instant.
	Expired,
	/// Provider rejected the refresh token; the record is kept for diagnostics only.
	Invalidated,
}

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when `issued_at + expires_in` falls outside the representable date range.
	#[error("Expiry is outside the supported date range.")]
	ExpiryOutOfRange,
}

/// Access/refresh token pair plus the absolute instants bounding its validity.
///
/// Records are replaced wholesale; a refreshed access token is never paired with a stale expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRecord {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the provider response was received.
	pub issued_at: OffsetDateTime,
	/// Expiry instant derived from issued_at plus the provider's expires_in.
	pub expires_at: OffsetDateTime,
	/// Instant the provider permanently rejected this record, if it did.
	pub invalidated_at: Option<OffsetDateTime>,
	/// Provider reason recorded alongside `invalidated_at`.
	pub invalid_reason: Option<String>,
}
impl TokenRecord {
	/// Returns a builder for constructing records.
	pub fn builder() -> TokenRecordBuilder {
		TokenRecordBuilder::default()
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if self.is_invalidated() {
			return TokenStatus::Invalidated;
		}
		if crate::auth::policy::is_expired(self, instant) {
			return TokenStatus::Expired;
		}

		TokenStatus::Active
	}

	/// Returns `true` once the provider has permanently rejected the record.
	pub fn is_invalidated(&self) -> bool {
		self.invalidated_at.is_some()
	}

	/// Returns the refresh secret or a configuration error when none was ever issued.
	pub fn require_refresh_token(&self) -> Result<&TokenSecret> {
		self.refresh_token.as_ref().ok_or_else(|| ConfigError::MissingRefreshToken.into())
	}

	/// Marks the record as permanently rejected, keeping every other field intact.
	pub fn invalidate(&mut self, instant: OffsetDateTime, reason: impl Into<String>) {
		self.invalidated_at = Some(instant);
		self.invalid_reason = Some(reason.into());
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("invalidated_at", &self.invalidated_at)
			.field("invalid_reason", &self.invalid_reason)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug, Default)]
pub struct TokenRecordBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenRecordBuilder {
	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides an optional, already wrapped refresh secret.
	pub fn refresh_secret(mut self, secret: Option<TokenSecret>) -> Self {
		self.refresh_token = secret;

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) =>
				issued_at.checked_add(delta).ok_or(TokenRecordBuilderError::ExpiryOutOfRange)?,
			(None, None) => return Err(TokenRecordBuilderError::MissingExpiry),
		};

		Ok(TokenRecord {
			access_token,
			refresh_token: self.refresh_token,
			issued_at,
			expires_at,
			invalidated_at: None,
			invalid_reason: None,
		})
	}
}
