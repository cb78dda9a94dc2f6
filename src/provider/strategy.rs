//! Provider strategy hooks that classify failures.
//!
//! The keeper never retries a permanent failure, so the split between "reauthorize now" and "try
//! again later" lives here, away from any particular HTTP client.

// self
use crate::{_prelude::*, provider::descriptor::GrantType};

/// Strategy hook that allows providers to tune error classification.
///
/// Implementors are required to be `Send + Sync`; the hooks take crate-owned data so downstream
/// crates never depend on transport-specific structures.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed token endpoint call into a canonical category.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Returns `true` when a protected API status means the bearer credential was rejected.
	///
	/// Defaults to HTTP 401.
	fn is_authorization_failure(&self, status: u16) -> bool {
		status == 401
	}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the grant (bad code, dead or revoked refresh token).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Failure is temporary and should be retried on a later attempt.
	Transient,
}
impl ProviderErrorKind {
	/// Returns `true` when retrying cannot succeed without a new authorization.
	pub fn is_permanent(self) -> bool {
		!matches!(self, Self::Transient)
	}
}

/// Context passed to provider strategies when classifying token errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant type associated with the failing request.
	pub grant_type: GrantType,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
	/// Indicates whether the failure originated from the network/transport layer.
	pub network_error: bool,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided grant type.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
			network_error: false,
		}
	}

	/// Convenience constructor for transport-level/network failures.
	pub fn network_failure(grant_type: GrantType) -> Self {
		Self { network_error: true, ..Self::new(grant_type) }
	}

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview, truncated to a bounded number of characters.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		let mut body = body.into();

		if let Some((cut, _)) = body.char_indices().nth(Self::BODY_PREVIEW_LIMIT) {
			body.truncate(cut);
			body.push('…');
		}

		self.body_preview = Some(body);

		self
	}

	/// Short human-readable summary used as the failure reason.
	pub fn summary(&self) -> String {
		match (&self.oauth_error, &self.error_description, self.http_status) {
			(Some(error), Some(description), _) => format!("{error}: {description}"),
			(Some(error), None, _) => error.clone(),
			(None, Some(description), _) => description.clone(),
			(None, None, Some(status)) => format!("HTTP {status}"),
			(None, None, None) if self.network_error => "network failure".into(),
			(None, None, None) => "unknown token endpoint failure".into(),
		}
	}
}

/// OAuth `error` codes with a fixed meaning.
const OAUTH_ERROR_KINDS: &[(&str, ProviderErrorKind)] = &[
	("invalid_grant", ProviderErrorKind::InvalidGrant),
	("access_denied", ProviderErrorKind::InvalidGrant),
	("invalid_scope", ProviderErrorKind::InvalidGrant),
	("invalid_client", ProviderErrorKind::InvalidClient),
	("unauthorized_client", ProviderErrorKind::InvalidClient),
	("temporarily_unavailable", ProviderErrorKind::Transient),
	("server_error", ProviderErrorKind::Transient),
];

/// Default strategy that applies RFC 6749 heuristics.
///
/// Structured OAuth fields win, then codes embedded in the body text, then the HTTP status.
/// Network failures are always transient.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}

		[ctx.oauth_error.as_deref(), ctx.error_description.as_deref()]
			.into_iter()
			.flatten()
			.find_map(exact_kind)
			.or_else(|| ctx.error_description.as_deref().and_then(embedded_kind))
			.or_else(|| ctx.body_preview.as_deref().and_then(embedded_kind))
			.unwrap_or_else(|| status_kind(ctx.http_status))
	}
}

fn exact_kind(value: &str) -> Option<ProviderErrorKind> {
	OAUTH_ERROR_KINDS
		.iter()
		.find(|(code, _)| value.trim().eq_ignore_ascii_case(code))
		.map(|(_, kind)| *kind)
}

fn embedded_kind(text: &str) -> Option<ProviderErrorKind> {
	let lowered = text.to_ascii_lowercase();

	OAUTH_ERROR_KINDS.iter().find(|(code, _)| lowered.contains(code)).map(|(_, kind)| *kind)
}

fn status_kind(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400) => ProviderErrorKind::InvalidGrant,
		Some(401 | 403) => ProviderErrorKind::InvalidClient,
		_ => ProviderErrorKind::Transient,
	}
}
