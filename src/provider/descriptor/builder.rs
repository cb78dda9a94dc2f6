// std
use std::net::IpAddr;
// self
use crate::{
	_prelude::*,
	provider::{ClientAuthMethod, ProviderDescriptor, ProviderEndpoints, ProviderQuirks},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ProviderDescriptorError {
	/// Authorization endpoint is required for the bootstrap exchange.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is mandatory.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Endpoints must use HTTPS unless they point at the local machine.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Reject scope delimiters that are control characters.
	#[error("Scope delimiter must be a printable character.")]
	InvalidScopeDelimiter {
		/// Invalid delimiter that was supplied.
		delimiter: char,
	},
	/// The fallback lifetime must be positive.
	#[error("Default expires_in must be positive.")]
	NonPositiveDefaultExpiry,
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	name: String,
	authorization_endpoint: Option<Url>,
	token_endpoint: Option<Url>,
	preferred_client_auth_method: ClientAuthMethod,
	quirks: ProviderQuirks,
}
impl ProviderDescriptorBuilder {
	/// Creates a new builder seeded with the provided name.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			authorization_endpoint: None,
			token_endpoint: None,
			preferred_client_auth_method: ClientAuthMethod::default(),
			quirks: ProviderQuirks::default(),
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Overrides the preferred client authentication method.
	pub fn preferred_client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.preferred_client_auth_method = method;

		self
	}

	/// Overrides the provider quirks.
	pub fn quirks(mut self, quirks: ProviderQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let authorization = self
			.authorization_endpoint
			.ok_or(ProviderDescriptorError::MissingAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(ProviderDescriptorError::MissingTokenEndpoint)?;

		validate_endpoint("authorization", &authorization)?;
		validate_endpoint("token", &token)?;

		if self.quirks.scope_delimiter.is_control() {
			return Err(ProviderDescriptorError::InvalidScopeDelimiter {
				delimiter: self.quirks.scope_delimiter,
			});
		}
		if !self.quirks.default_expires_in.is_positive() {
			return Err(ProviderDescriptorError::NonPositiveDefaultExpiry);
		}

		Ok(ProviderDescriptor {
			name: self.name,
			endpoints: ProviderEndpoints { authorization, token },
			preferred_client_auth_method: self.preferred_client_auth_method,
			quirks: self.quirks,
		})
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host_str() {
		Some("localhost") => true,
		Some(host) => host
			.trim_start_matches('[')
			.trim_end_matches(']')
			.parse::<IpAddr>()
			.is_ok_and(|ip| ip.is_loopback()),
		None => false,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("Endpoint fixture should parse.")
	}

	#[test]
	fn loopback_http_is_allowed_but_remote_http_is_not() {
		for raw in ["http://127.0.0.1:8080/token", "http://localhost/token", "http://[::1]/token"] {
			ProviderDescriptor::builder("local")
				.authorization_endpoint(url("https://example.com/authorize"))
				.token_endpoint(url(raw))
				.build()
				.unwrap_or_else(|e| panic!("Loopback endpoint {raw} should be accepted: {e}"));
		}

		let err = ProviderDescriptor::builder("remote")
			.authorization_endpoint(url("https://example.com/authorize"))
			.token_endpoint(url("http://example.com/token"))
			.build()
			.expect_err("Remote plain-HTTP token endpoint should be rejected.");

		assert!(matches!(err, ProviderDescriptorError::InsecureEndpoint { endpoint: "token", .. }));
	}

	#[test]
	fn quirks_are_validated() {
		let err = ProviderDescriptor::builder("bad")
			.authorization_endpoint(url("https://example.com/authorize"))
			.token_endpoint(url("https://example.com/token"))
			.quirks(ProviderQuirks { default_expires_in: Duration::ZERO, ..Default::default() })
			.build()
			.expect_err("Zero default lifetime should be rejected.");

		assert_eq!(err, ProviderDescriptorError::NonPositiveDefaultExpiry);
	}
}
