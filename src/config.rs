//! Deployment configuration for a keeper and its provider.
//!
//! Everything is optional in the JSON document; omitted keys fall back to the defaults below, so
//! `{"client_id": "..."}` is a complete configuration for the default provider.

// std
use std::{fs, path::{Path, PathBuf}};
// self
use crate::{
	_prelude::*,
	auth::{DEFAULT_REFRESH_BUFFER, RefreshPolicy, policy},
	error::ConfigError,
	keeper::{DEFAULT_REFRESH_TIMEOUT, KeeperOptions},
	provider::{ClientAuthMethod, DEFAULT_EXPIRES_IN, ProviderDescriptor, ProviderQuirks},
	scheduler::DEFAULT_REFRESH_INTERVAL,
};
#[cfg(feature = "reqwest")]
use crate::{oauth::ReqwestRefresher, provider::ProviderStrategy};

/// Provider base URL used when none is configured.
pub const DEFAULT_OAUTH_BASE_URL: &str = "https://oauth.u-tec.com";
/// Protected API base URL used when none is configured.
pub const DEFAULT_API_BASE_URL: &str = "https://api.u-tec.com";

/// Serializable keeper configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeeperConfig {
	/// Provider base URL; `/authorize` and `/token` are resolved against it.
	pub oauth_base_url: String,
	/// Protected API base URL.
	pub api_base_url: String,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// OAuth 2.0 client secret for confidential clients.
	pub client_secret: Option<String>,
	/// How client credentials are presented to the token endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Space-delimited scope string requested during authorization.
	pub scope: String,
	/// Redirect URI registered with the provider, required for authorization.
	pub redirect_uri: Option<String>,
	/// Location of the JSON token document.
	pub store_path: PathBuf,
	/// Seconds between scheduler ticks.
	pub refresh_interval_secs: u64,
	/// Seconds a single refresh call may take.
	pub refresh_timeout_secs: u64,
	/// Initial auto-refresh toggle; a persisted policy takes precedence.
	pub auto_refresh_enabled: bool,
	/// Initial refresh buffer in minutes; a persisted policy takes precedence.
	pub refresh_buffer_minutes: i64,
	/// Lifetime assumed when the token endpoint omits `expires_in`.
	pub default_expires_in_secs: u64,
}
impl KeeperConfig {
	/// Parses and validates a JSON document.
	pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
		let mut de = serde_json::Deserializer::from_slice(bytes);
		let config: Self = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Reads, parses and validates a JSON document from disk.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let bytes = fs::read(path)
			.map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;

		Self::from_json_slice(&bytes)
	}

	/// Rejects values the keeper cannot run with.
	pub fn validate(&self) -> Result<()> {
		let invalid = |field: &'static str, reason: &'static str| -> Result<()> {
			Err(ConfigError::InvalidSetting { field, reason }.into())
		};

		if self.client_id.trim().is_empty() {
			return invalid("client_id", "must not be empty");
		}
		if self.refresh_interval_secs == 0 {
			return invalid("refresh_interval_secs", "must be positive");
		}
		if self.refresh_timeout_secs == 0 {
			return invalid("refresh_timeout_secs", "must be positive");
		}
		if self.refresh_buffer_minutes < 0 {
			return invalid("refresh_buffer_minutes", "must not be negative");
		}
		if policy::buffer_from_minutes(self.refresh_buffer_minutes).is_none() {
			return invalid("refresh_buffer_minutes", "exceeds the supported range");
		}
		if self.default_expires_in_secs == 0 {
			return invalid("default_expires_in_secs", "must be positive");
		}
		if i64::try_from(self.refresh_interval_secs).is_err()
			|| i64::try_from(self.refresh_timeout_secs).is_err()
			|| i64::try_from(self.default_expires_in_secs).is_err()
		{
			return invalid("duration", "exceeds the supported range");
		}

		Ok(())
	}

	/// Builds the provider descriptor for `oauth_base_url`.
	pub fn descriptor(&self) -> Result<ProviderDescriptor> {
		let base = Url::parse(&self.oauth_base_url)
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let join = |path: &str| {
			base.join(path).map_err(|source| ConfigError::InvalidDescriptor { source })
		};
		let quirks = ProviderQuirks {
			default_expires_in: seconds(self.default_expires_in_secs),
			..Default::default()
		};
		let descriptor = ProviderDescriptor::builder(base.host_str().unwrap_or("provider"))
			.authorization_endpoint(join("authorize")?)
			.token_endpoint(join("token")?)
			.preferred_client_auth_method(self.client_auth_method)
			.quirks(quirks)
			.build()
			.map_err(ConfigError::from)?;

		Ok(descriptor)
	}

	/// Parsed redirect URI, if configured.
	pub fn redirect_url(&self) -> Result<Option<Url>> {
		self.redirect_uri
			.as_deref()
			.filter(|raw| !raw.trim().is_empty())
			.map(|raw| Url::parse(raw).map_err(|source| ConfigError::InvalidRedirect { source }.into()))
			.transpose()
	}

	/// Individual scopes from the space-delimited `scope` string.
	pub fn scopes(&self) -> Vec<String> {
		self.scope.split_whitespace().map(str::to_owned).collect()
	}

	/// Refresh policy used when the store has none persisted.
	///
	/// A buffer that [`validate`](Self::validate) would reject falls back to the default buffer.
	pub fn refresh_policy(&self) -> RefreshPolicy {
		let buffer =
			policy::buffer_from_minutes(self.refresh_buffer_minutes).unwrap_or(DEFAULT_REFRESH_BUFFER);

		RefreshPolicy::new(self.auto_refresh_enabled, buffer)
	}

	/// Options for [`TokenKeeper::open`](crate::keeper::TokenKeeper::open).
	pub fn keeper_options(&self) -> KeeperOptions {
		KeeperOptions::default()
			.with_policy(self.refresh_policy())
			.with_refresh_timeout(seconds(self.refresh_timeout_secs))
	}

	/// Scheduler tick interval.
	pub fn refresh_interval(&self) -> Duration {
		seconds(self.refresh_interval_secs)
	}

	/// Builds the reqwest-backed refresher for this provider.
	#[cfg(feature = "reqwest")]
	pub fn refresher(&self, strategy: Arc<dyn ProviderStrategy>) -> Result<ReqwestRefresher> {
		let refresher = ReqwestRefresher::new(self.descriptor()?, strategy, self.client_id.clone())?;

		Ok(match &self.client_secret {
			Some(secret) => refresher.with_client_secret(secret.clone()),
			None => refresher,
		})
	}
}
impl Default for KeeperConfig {
	fn default() -> Self {
		Self {
			oauth_base_url: DEFAULT_OAUTH_BASE_URL.into(),
			api_base_url: DEFAULT_API_BASE_URL.into(),
			client_id: String::new(),
			client_secret: None,
			client_auth_method: ClientAuthMethod::ClientSecretPost,
			scope: "openapi".into(),
			redirect_uri: None,
			store_path: PathBuf::from("oauth2-keeper.json"),
			refresh_interval_secs: DEFAULT_REFRESH_INTERVAL.whole_seconds().unsigned_abs(),
			refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT.whole_seconds().unsigned_abs(),
			auto_refresh_enabled: true,
			refresh_buffer_minutes: DEFAULT_REFRESH_BUFFER.whole_minutes(),
			default_expires_in_secs: DEFAULT_EXPIRES_IN.whole_seconds().unsigned_abs(),
		}
	}
}
impl Debug for KeeperConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeeperConfig")
			.field("oauth_base_url", &self.oauth_base_url)
			.field("api_base_url", &self.api_base_url)
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
			.field("client_auth_method", &self.client_auth_method)
			.field("scope", &self.scope)
			.field("redirect_uri", &self.redirect_uri)
			.field("store_path", &self.store_path)
			.field("refresh_interval_secs", &self.refresh_interval_secs)
			.field("refresh_timeout_secs", &self.refresh_timeout_secs)
			.field("auto_refresh_enabled", &self.auto_refresh_enabled)
			.field("refresh_buffer_minutes", &self.refresh_buffer_minutes)
			.field("default_expires_in_secs", &self.default_expires_in_secs)
			.finish()
	}
}

// Callers validate first, so the value always fits.
fn seconds(secs: u64) -> Duration {
	Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn minimal_document_uses_defaults() {
		let config = KeeperConfig::from_json_slice(br#"{"client_id":"client-1"}"#)
			.expect("Minimal configuration should parse.");

		assert_eq!(config.oauth_base_url, DEFAULT_OAUTH_BASE_URL);
		assert_eq!(config.scopes(), vec!["openapi".to_owned()]);
		assert_eq!(config.refresh_interval(), Duration::minutes(5));
		assert_eq!(config.keeper_options(), KeeperOptions::default());
		assert_eq!(config.redirect_url().expect("Missing redirect should be fine."), None);
	}

	#[test]
	fn descriptor_resolves_endpoints_against_base() {
		let config = KeeperConfig {
			client_id: "client-1".into(),
			default_expires_in_secs: 900,
			..Default::default()
		};
		let descriptor = config.descriptor().expect("Default provider should build.");

		assert_eq!(descriptor.name, "oauth.u-tec.com");
		assert_eq!(descriptor.endpoints.authorization.as_str(), "https://oauth.u-tec.com/authorize");
		assert_eq!(descriptor.endpoints.token.as_str(), "https://oauth.u-tec.com/token");
		assert_eq!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost);
		assert_eq!(descriptor.quirks.default_expires_in, Duration::minutes(15));
	}

	#[test]
	fn insecure_provider_is_rejected() {
		let config = KeeperConfig {
			client_id: "client-1".into(),
			oauth_base_url: "http://oauth.example.com".into(),
			..Default::default()
		};
		let err = config.descriptor().expect_err("Plain HTTP provider should be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::Descriptor(_))));
	}

	#[test]
	fn parse_errors_carry_the_field_path() {
		let err = KeeperConfig::from_json_slice(br#"{"client_id":"c","refresh_interval_secs":"soon"}"#)
			.expect_err("String interval should be rejected.");

		match err {
			Error::Config(ConfigError::Parse { source }) =>
				assert_eq!(source.path().to_string(), "refresh_interval_secs"),
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[test]
	fn invalid_settings_are_rejected() {
		for (document, field) in [
			(r#"{}"#, "client_id"),
			(r#"{"client_id":"c","refresh_interval_secs":0}"#, "refresh_interval_secs"),
			(r#"{"client_id":"c","refresh_timeout_secs":0}"#, "refresh_timeout_secs"),
			(r#"{"client_id":"c","refresh_buffer_minutes":-1}"#, "refresh_buffer_minutes"),
			(
				r#"{"client_id":"c","refresh_buffer_minutes":9223372036854775807}"#,
				"refresh_buffer_minutes",
			),
		] {
			let err = KeeperConfig::from_json_slice(document.as_bytes())
				.expect_err("Invalid configuration should be rejected.");

			assert!(
				matches!(err, Error::Config(ConfigError::InvalidSetting { field: f, .. }) if f == field),
				"Expected `{field}` to be rejected."
			);
		}
	}

	#[test]
	fn debug_output_redacts_client_secret() {
		let config = KeeperConfig {
			client_id: "client-1".into(),
			client_secret: Some("super-secret".into()),
			..Default::default()
		};
		let rendered = format!("{config:?}");

		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains("super-secret"));
	}

	#[test]
	fn policy_and_redirect_follow_settings() {
		let config = KeeperConfig::from_json_slice(
			br#"{
				"client_id": "c",
				"auto_refresh_enabled": false,
				"refresh_buffer_minutes": 10,
				"redirect_uri": "https://gateway.local/callback",
				"scope": "openapi devices"
			}"#,
		)
		.expect("Configuration should parse.");

		assert_eq!(config.refresh_policy(), RefreshPolicy::new(false, Duration::minutes(10)));
		assert_eq!(config.scopes(), vec!["openapi".to_owned(), "devices".to_owned()]);
		assert_eq!(
			config.redirect_url().expect("Redirect should parse.").map(|url| url.to_string()),
			Some("https://gateway.local/callback".into())
		);
	}
}
