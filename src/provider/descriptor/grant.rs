// self
use crate::_prelude::*;

/// OAuth 2.0 grants the keeper sends to the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// One-time exchange of an authorization code for the initial token pair.
	AuthorizationCode,
	/// Renewal of the access token with the long-lived refresh token.
	RefreshToken,
}
impl GrantType {
	/// Returns the RFC 6749 identifier for the grant type.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::AuthorizationCode => "authorization_code",
			Self::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
