//! Token endpoint access: the refresher contract consumed by the keeper and its `oauth2`-backed
//! implementation.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenSecret},
	authorize::AuthorizationSession,
	error::{ConfigError, TransientError, TransportError},
	http::{RequestTarget, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy,
	},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Boxed future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenGrant>> + 'a + Send>>;

/// Performs exactly one refresh call against the provider.
///
/// Implementations never retry internally; the keeper decides what a failure means and when to
/// try again. Permanent rejections must surface as [`Error::InvalidGrant`] or
/// [`Error::InvalidClient`].
pub trait TokenRefresher
where
	Self: Send + Sync,
{
	/// Trades `refresh_token` for a new access token.
	fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a>;
}

/// Successful token endpoint response, before it becomes a [`TokenRecord`].
#[derive(Clone, Debug)]
pub struct TokenGrant {
	/// Newly minted access token.
	pub access_token: TokenSecret,
	/// Rotated refresh token, when the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime reported by the provider (or the descriptor fallback).
	pub expires_in: Duration,
	/// Instant the response was received; the expiry is anchored here.
	pub received_at: OffsetDateTime,
}
impl TokenGrant {
	/// Builds the replacement record.
	///
	/// A response without a rotated refresh token keeps `previous_refresh`.
	pub fn into_record(self, previous_refresh: Option<TokenSecret>) -> Result<TokenRecord> {
		TokenRecord::builder()
			.access_token(self.access_token.expose())
			.refresh_secret(self.refresh_token.or(previous_refresh))
			.issued_at(self.received_at)
			.expires_in(self.expires_in)
			.build()
			.map_err(|e| ConfigError::from(e).into())
	}

	/// Returns `true` if the provider rotated the refresh token.
	pub fn rotated(&self) -> bool {
		self.refresh_token.is_some()
	}
}

/// Maps HTTP transport failures into keeper [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a keeper error.
	fn map_transport_error(
		&self,
		strategy: &dyn ProviderStrategy,
		target: RequestTarget,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_strategy: &dyn ProviderStrategy,
		target: RequestTarget,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() => ConfigError::from(*inner).into(),
			HttpClientError::Reqwest(inner)
				if inner.is_timeout() && matches!(target, RequestTarget::TokenEndpoint(_)) =>
				TransientError::TokenEndpoint {
					message: format!("Request timed out while calling the {target}"),
					status: meta_status(meta).or_else(|| inner.status().map(|code| code.as_u16())),
					retry_after: meta_retry_after(meta),
				}
				.into(),
			HttpClientError::Reqwest(inner) => TransportError::network(target, *inner).into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransientError::TokenEndpoint {
				message: format!("HTTP client error while calling the {target}: {message}"),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
			_ => TransientError::TokenEndpoint {
				message: format!("HTTP client error while calling the {target}"),
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
		}
	}
}

#[cfg(feature = "reqwest")]
/// Refresher specialized for the crate's default reqwest transport stack.
pub type ReqwestRefresher = OAuthRefresher<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// [`TokenRefresher`] that talks to a real token endpoint through the `oauth2` crate.
///
/// Sends `grant_type=refresh_token` with the client credentials attached the way the descriptor
/// prefers; classification of provider errors is delegated to the [`ProviderStrategy`].
pub struct OAuthRefresher<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client used for every token endpoint request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Provider descriptor that defines endpoints and quirks.
	pub descriptor: ProviderDescriptor,
	/// Strategy classifying provider failures.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	client_secret: Option<String>,
}
impl<C, M> OAuthRefresher<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a refresher that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			descriptor,
			strategy,
			client_id: client_id.into(),
			client_secret: None,
		}
	}

	/// Sets or replaces the client secret used for confidential client auth modes.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Starts an authorization handshake whose code can later be passed to
	/// [`exchange_code`](Self::exchange_code).
	pub fn start_authorization(
		&self,
		redirect_uri: Url,
		scopes: &[String],
	) -> AuthorizationSession {
		AuthorizationSession::start(&self.descriptor, &self.client_id, redirect_uri, scopes)
	}

	/// Exchanges an authorization code for the initial token record.
	///
	/// Validates `returned_state` against the session first. Hand the result to
	/// [`TokenKeeper::install`](crate::keeper::TokenKeeper::install).
	pub async fn exchange_code(
		&self,
		session: &AuthorizationSession,
		returned_state: &str,
		code: &str,
	) -> Result<TokenRecord> {
		let span = FlowSpan::new(FlowKind::AuthorizationCode, "exchange_code");

		obs::record_flow_outcome(FlowKind::AuthorizationCode, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				session.validate_state(returned_state)?;

				let grant = self.exchange_code_grant(session, code).await?;

				grant.into_record(None)
			})
			.await;

		obs::record_flow_outcome(
			FlowKind::AuthorizationCode,
			if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		result
	}

	async fn exchange_code_grant(
		&self,
		session: &AuthorizationSession,
		code: &str,
	) -> Result<TokenGrant> {
		let grant = GrantType::AuthorizationCode;
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let oauth_client = self.oauth_client()?;
		let redirect_url = RedirectUrl::new(session.redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidRedirect { source })?;
		let mut request = oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.set_redirect_uri(Cow::Owned(redirect_url));

		if let Some(verifier) = session.pkce_verifier() {
			request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_owned()));
		}

		let response = request
			.request_async(&instrumented)
			.await
			.map_err(|err| self.map_request_error(grant, meta.take(), err))?;

		self.grant_from_response(response)
	}

	async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant> {
		let grant = GrantType::RefreshToken;
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let oauth_client = self.oauth_client()?;
		let refresh_secret = RefreshToken::new(refresh_token.to_owned());
		let response = oauth_client
			.exchange_refresh_token(&refresh_secret)
			.request_async(&instrumented)
			.await
			.map_err(|err| self.map_request_error(grant, meta.take(), err))?;

		self.grant_from_response(response)
	}

	fn oauth_client(&self) -> Result<ConfiguredBasicClient> {
		let endpoints = &self.descriptor.endpoints;
		let auth_url = AuthUrl::new(endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let token_url = TokenUrl::new(endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(self.client_id.clone()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		match self.descriptor.preferred_client_auth_method {
			ClientAuthMethod::NoneWithPkce => {},
			ClientAuthMethod::ClientSecretBasic =>
				if let Some(secret) = &self.client_secret {
					oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.clone()));
				},
			ClientAuthMethod::ClientSecretPost => {
				if let Some(secret) = &self.client_secret {
					oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.clone()));
				}

				oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
			},
		}

		Ok(oauth_client)
	}

	fn grant_from_response(&self, response: BasicTokenResponse) -> Result<TokenGrant> {
		let received_at = OffsetDateTime::now_utc();
		let expires_in = match response.expires_in() {
			Some(lifetime) => {
				let secs = i64::try_from(lifetime.as_secs())
					.map_err(|_| ConfigError::ExpiresInOutOfRange)?;

				if secs <= 0 {
					return Err(ConfigError::NonPositiveExpiresIn.into());
				}

				Duration::seconds(secs)
			},
			None => self.descriptor.quirks.default_expires_in,
		};

		Ok(TokenGrant {
			access_token: response.access_token().clone().into(),
			refresh_token: response.refresh_token().cloned().map(TokenSecret::from),
			expires_in,
			received_at,
		})
	}

	fn map_request_error(
		&self,
		grant: GrantType,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		let meta = meta.as_ref();
		let strategy = self.strategy.as_ref();

		match err {
			RequestTokenError::ServerResponse(response) =>
				map_server_response(strategy, grant, response, meta),
			RequestTokenError::Request(error) => self.transport_mapper.map_transport_error(
				strategy,
				RequestTarget::TokenEndpoint(grant),
				meta,
				error,
			),
			RequestTokenError::Parse(source, body) =>
				map_unparsable_response(strategy, grant, source, &body, meta),
			RequestTokenError::Other(message) => TransientError::TokenEndpoint {
				message,
				status: meta_status(meta),
				retry_after: meta_retry_after(meta),
			}
			.into(),
		}
	}
}
#[cfg(feature = "reqwest")]
impl OAuthRefresher<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a refresher backed by a reqwest client that does not follow redirects.
	pub fn new(
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
	) -> Result<Self> {
		Ok(Self::with_http_client(
			descriptor,
			strategy,
			client_id,
			ReqwestHttpClient::without_redirects()?,
			ReqwestTransportErrorMapper,
		))
	}
}
impl<C, M> TokenRefresher for OAuthRefresher<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a> {
		Box::pin(self.refresh_grant(refresh_token))
	}
}
impl<C, M> Debug for OAuthRefresher<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthRefresher")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.finish()
	}
}

fn map_server_response(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let mut ctx =
		ProviderErrorContext::new(grant).with_oauth_error(response.error().as_ref().to_owned());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	classified_error(strategy.classify_token_error(&ctx), ctx.summary(), meta)
}

fn map_unparsable_response(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	source: serde_path_to_error::Error<serde_json::Error>,
	body: &[u8],
	meta: Option<&ResponseMetadata>,
) -> Error {
	let status = meta_status(meta);

	// A 2xx that fails to parse is a broken response, never a verdict on the grant.
	if status.is_some_and(|code| (400..500).contains(&code)) {
		let mut ctx =
			ProviderErrorContext::new(grant).with_body_preview(String::from_utf8_lossy(body));

		if let Some(status) = status {
			ctx = ctx.with_http_status(status);
		}

		let kind = strategy.classify_token_error(&ctx);

		if kind.is_permanent() {
			return classified_error(kind, ctx.summary(), meta);
		}
	}

	TransientError::TokenResponseParse { source, status }.into()
}

fn classified_error(kind: ProviderErrorKind, reason: String, meta: Option<&ResponseMetadata>) -> Error {
	match kind {
		ProviderErrorKind::InvalidGrant => Error::InvalidGrant { reason },
		ProviderErrorKind::InvalidClient => Error::InvalidClient { reason },
		ProviderErrorKind::Transient => TransientError::TokenEndpoint {
			message: reason,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{auth::TokenRecordBuilderError, provider::DefaultProviderStrategy};

	fn grant(refresh: Option<&str>) -> TokenGrant {
		TokenGrant {
			access_token: TokenSecret::new("a-2"),
			refresh_token: refresh.map(TokenSecret::new),
			expires_in: Duration::seconds(3600),
			received_at: time::macros::datetime!(2025-06-01 10:00 UTC),
		}
	}

	#[test]
	fn missing_rotated_refresh_token_keeps_previous() {
		let record = grant(None)
			.into_record(Some(TokenSecret::new("r-1")))
			.expect("Grant should convert into a record.");

		assert_eq!(record.access_token.expose(), "a-2");
		assert_eq!(record.refresh_token.as_ref().map(TokenSecret::expose), Some("r-1"));
		assert_eq!(record.issued_at, time::macros::datetime!(2025-06-01 10:00 UTC));
		assert_eq!(record.expires_at, time::macros::datetime!(2025-06-01 11:00 UTC));
	}

	#[test]
	fn rotated_refresh_token_replaces_previous() {
		let grant = grant(Some("r-2"));

		assert!(grant.rotated());

		let record =
			grant.into_record(Some(TokenSecret::new("r-1"))).expect("Grant should convert.");

		assert_eq!(record.refresh_token.as_ref().map(TokenSecret::expose), Some("r-2"));
	}

	#[test]
	fn expiry_past_the_calendar_is_a_config_error() {
		let grant = TokenGrant { expires_in: Duration::seconds(1_000_000_000_000), ..grant(None) };
		let err = grant.into_record(None).expect_err("Unrepresentable expiry should be rejected.");

		assert!(matches!(
			err,
			Error::Config(ConfigError::TokenBuild(TokenRecordBuilderError::ExpiryOutOfRange))
		));
		assert!(!err.is_permanent());
	}

	#[test]
	fn classified_errors_follow_permanence() {
		let meta = ResponseMetadata { status: Some(503), retry_after: Some(Duration::seconds(7)) };
		let err = classified_error(ProviderErrorKind::Transient, "server_error".into(), Some(&meta));

		assert!(matches!(
			err,
			Error::Transient(TransientError::TokenEndpoint { status: Some(503), retry_after: Some(_), .. })
		));
		assert!(classified_error(ProviderErrorKind::InvalidGrant, "x".into(), None).is_permanent());
	}

	#[test]
	fn unparsable_client_error_with_grant_hint_is_permanent() {
		let strategy = DefaultProviderStrategy;
		let source = serde_path_to_error::deserialize::<_, serde_json::Value>(
			&mut serde_json::Deserializer::from_str("not json"),
		)
		.expect_err("Fixture body should fail to parse.");
		let meta = ResponseMetadata { status: Some(400), retry_after: None };
		let err = map_unparsable_response(
			&strategy,
			GrantType::RefreshToken,
			source,
			b"invalid_grant: token revoked",
			Some(&meta),
		);

		assert!(matches!(err, Error::InvalidGrant { .. }));
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn builds_refresher_for_each_auth_method() {
		for method in [
			ClientAuthMethod::ClientSecretBasic,
			ClientAuthMethod::ClientSecretPost,
			ClientAuthMethod::NoneWithPkce,
		] {
			let descriptor = ProviderDescriptor::builder("test")
				.authorization_endpoint(
					Url::parse("https://example.com/authorize")
						.expect("Authorization endpoint fixture should parse."),
				)
				.token_endpoint(
					Url::parse("https://example.com/token")
						.expect("Token endpoint fixture should parse."),
				)
				.preferred_client_auth_method(method)
				.build()
				.expect("Descriptor fixture should build.");
			let refresher = ReqwestRefresher::new(descriptor, Arc::new(DefaultProviderStrategy), "id")
				.expect("Refresher should build.")
				.with_client_secret("secret");

			assert!(refresher.oauth_client().is_ok());
		}
	}
}
