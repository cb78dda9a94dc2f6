// self
use crate::_prelude::*;

/// Lifetime assumed when a token response omits `expires_in`.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::hours(1);

/// Provider-specific quirks that influence requests and token bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Indicates whether PKCE must be supplied even for confidential clients.
	pub pkce_required: bool,
	/// Character used to join scopes when constructing `scope` parameters.
	pub scope_delimiter: char,
	/// Token lifetime used when the provider leaves `expires_in` out of a response.
	pub default_expires_in: Duration,
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { pkce_required: false, scope_delimiter: ' ', default_expires_in: DEFAULT_EXPIRES_IN }
	}
}
