//! Redacting wrapper for access and refresh token material.

// self
use crate::_prelude::*;

/// Token secret that never prints its contents through `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Renders the `Authorization` header value for this secret used as a bearer credential.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}
}
impl From<oauth2::AccessToken> for TokenSecret {
	fn from(token: oauth2::AccessToken) -> Self {
		Self(token.into_secret())
	}
}
impl From<oauth2::RefreshToken> for TokenSecret {
	fn from(token: oauth2::RefreshToken) -> Self {
		Self(token.into_secret())
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenSecret(<redacted>)")
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
