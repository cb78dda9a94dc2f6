//! Keeper-level error types shared across the coordinator, transports, and stores.

// self
use crate::_prelude::*;

/// Keeper-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical keeper error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; try again later.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// No token record has been installed yet.
	#[error("No token record has been installed; complete an authorization first.")]
	NotConfigured,
	/// Provider rejected the grant (e.g., bad code or dead refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or keeper-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or keeper-supplied reason string.
		reason: String,
	},
	/// The held token record is terminally invalid; a new authorization is required.
	#[error("Token record is invalid and requires re-authorization: {reason}")]
	Reauthorize {
		/// Reason recorded when the record was invalidated.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when retrying cannot help and a human must re-authorize.
	///
	/// Everything else (network, provider 5xx, timeouts, local persistence) is worth another
	/// attempt on the next scheduler tick or caller.
	pub fn is_permanent(&self) -> bool {
		matches!(
			self,
			Self::NotConfigured
				| Self::InvalidGrant { .. }
				| Self::InvalidClient { .. }
				| Self::Reauthorize { .. }
				| Self::Config(ConfigError::MissingRefreshToken)
		)
	}
}

/// Configuration and validation failures raised by the keeper.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Bearer credential cannot be encoded as a header value.
	#[error("Access token cannot be encoded as an Authorization header.")]
	InvalidBearer {
		/// Underlying header encoding failure.
		#[source]
		source: oauth2::http::header::InvalidHeaderValue,
	},
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Configuration document could not be read.
	#[error("Failed to read configuration from {path}.")]
	Read {
		/// Path that failed to load.
		path: String,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration is malformed at `{}`.", .source.path())]
	Parse {
		/// Structured parsing failure including the offending field path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A configuration value is out of range.
	#[error("Setting `{field}` is invalid: {reason}.")]
	InvalidSetting {
		/// Offending field name.
		field: &'static str,
		/// Why the value was rejected.
		reason: &'static str,
	},

	/// Cached record is missing a refresh secret.
	#[error("Cached token record is missing a refresh token.")]
	MissingRefreshToken,
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or keeper-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The refresh attempt did not finish within its budget.
	#[error("Token refresh did not complete within {after}.")]
	RefreshTimedOut {
		/// Timeout that elapsed.
		after: Duration,
	},
	/// A shared refresh attempt failed; the current token could not be renewed.
	#[error("Token refresh failed: {reason}")]
	Refresh {
		/// Failure summary published to every waiter.
		reason: String,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the {target}.")]
	Network {
		/// Endpoint being called when the failure happened.
		target: crate::http::RequestTarget,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during an upstream call.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		target: crate::http::RequestTarget,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { target, source: Box::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn permanence_separates_reauthorize_from_retry_later() {
		assert!(Error::InvalidGrant { reason: "revoked".into() }.is_permanent());
		assert!(Error::Reauthorize { reason: "revoked".into() }.is_permanent());
		assert!(Error::from(ConfigError::MissingRefreshToken).is_permanent());
		assert!(Error::NotConfigured.is_permanent());
		assert!(
			!Error::from(TransientError::RefreshTimedOut { after: Duration::seconds(30) })
				.is_permanent()
		);
		assert!(!Error::from(ConfigError::NonPositiveExpiresIn).is_permanent());
	}
}
