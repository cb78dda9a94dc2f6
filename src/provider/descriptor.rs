//! Provider descriptor data structures shared by the refresher and the authorization bootstrap.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Grant identifiers used on the token endpoint.
pub mod grant;
/// Provider-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use grant::*;
pub use quirks::*;

// self
use crate::_prelude::*;

/// Client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	#[default]
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// Public clients that prove possession via PKCE.
	NoneWithPkce,
}

/// Endpoint pair declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint the user is sent to during bootstrap.
	pub authorization: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token: Url,
}

/// Immutable provider descriptor consumed by the refresher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Human-readable provider name used in logs.
	pub name: String,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Preferred client authentication mechanism.
	pub preferred_client_auth_method: ClientAuthMethod,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided provider name.
	pub fn builder(name: impl Into<String>) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(name)
	}
}
