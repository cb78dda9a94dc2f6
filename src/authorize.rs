//! Authorization-code bootstrap that produces the first token record.
//!
//! The keeper only ever refreshes. The very first record comes from a user visiting
//! [`AuthorizationSession::authorize_url`] and the redirect handler passing the returned `code`
//! and `state` to [`OAuthRefresher::exchange_code`](crate::oauth::OAuthRefresher::exchange_code).

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	provider::{ClientAuthMethod, ProviderDescriptor},
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Pending authorization handshake.
#[derive(Clone)]
pub struct AuthorizationSession {
	/// Opaque state value that must round-trip via the redirect handler.
	pub state: String,
	/// Redirect URI supplied when constructing the authorize URL.
	pub redirect_uri: Url,
	/// Authorize URL the user should be sent to.
	pub authorize_url: Url,
	/// Scopes requested in the authorize URL.
	pub scopes: Vec<String>,
	pkce: Option<PkcePair>,
}
impl AuthorizationSession {
	/// Generates a fresh state (and PKCE pair when the provider needs one) and builds the
	/// authorize URL.
	pub fn start(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		redirect_uri: Url,
		scopes: &[String],
	) -> Self {
		let needs_pkce = descriptor.quirks.pkce_required
			|| matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::NoneWithPkce);
		let pkce = needs_pkce.then(PkcePair::generate);
		let state = random_string(STATE_LEN);
		let mut authorize_url = descriptor.endpoints.authorization.clone();

		{
			let mut pairs = authorize_url.query_pairs_mut();

			pairs.append_pair("response_type", "code");
			pairs.append_pair("client_id", client_id);
			pairs.append_pair("redirect_uri", redirect_uri.as_str());

			if !scopes.is_empty() {
				let delimiter = descriptor.quirks.scope_delimiter.to_string();

				pairs.append_pair("scope", &scopes.join(&delimiter));
			}

			pairs.append_pair("state", &state);

			if let Some(pkce) = &pkce {
				pairs.append_pair("code_challenge", &pkce.challenge);
				pairs.append_pair("code_challenge_method", "S256");
			}
		}

		Self { state, redirect_uri, authorize_url, scopes: scopes.to_vec(), pkce }
	}

	/// PKCE S256 code challenge, when PKCE is in use.
	pub fn code_challenge(&self) -> Option<&str> {
		self.pkce.as_ref().map(|pkce| pkce.challenge.as_str())
	}

	/// Validates the returned `state` parameter after the authorization redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(Error::InvalidGrant { reason: "Authorization state mismatch".into() })
		}
	}

	pub(crate) fn pkce_verifier(&self) -> Option<&str> {
		self.pkce.as_ref().map(|pkce| pkce.verifier.as_str())
	}
}
impl Debug for AuthorizationSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationSession")
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("authorize_url", &self.authorize_url)
			.field("scopes", &self.scopes)
			.field("code_challenge", &self.code_challenge())
			.finish()
	}
}

#[derive(Clone)]
struct PkcePair {
	verifier: String,
	challenge: String,
}
impl PkcePair {
	fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

		Self { verifier, challenge }
	}
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}
