//! Outbound calls to the protected API with retry-once on authorization failure.
//!
//! Every request gets the keeper's current access token as a bearer credential. When the API
//! rejects it, the keeper is asked for a token newer than the rejected one (which refreshes
//! through the same single flight as everyone else) and the request is replayed exactly once.
//! Per logical call that is at most two attempts and at most one refresh.

// crates.io
use oauth2::{
	AsyncHttpClient, HttpRequest, HttpResponse,
	http::header::{AUTHORIZATION, HeaderValue},
};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::{RequestTarget, ResponseMetadataSlot, TokenHttpClient},
	keeper::{TokenKeeper, TokenSnapshot},
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan, events},
	provider::ProviderStrategy,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Authenticated client on the crate's default reqwest transport.
pub type ReqwestAuthenticatedClient =
	AuthenticatedClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Executes protected API requests on behalf of a [`TokenKeeper`].
pub struct AuthenticatedClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	keeper: TokenKeeper,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	strategy: Arc<dyn ProviderStrategy>,
}
impl<C, M> AuthenticatedClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds a client over the provided transport.
	///
	/// `strategy` decides which statuses count as a rejected credential.
	pub fn with_http_client(
		keeper: TokenKeeper,
		strategy: Arc<dyn ProviderStrategy>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self { keeper, http_client: http_client.into(), transport_mapper: mapper.into(), strategy }
	}

	/// Keeper backing this client.
	pub fn keeper(&self) -> &TokenKeeper {
		&self.keeper
	}

	/// Sends `request` with a bearer credential, replaying it once after an authorization
	/// failure.
	///
	/// Any existing `Authorization` header is replaced. A response that still fails authorization
	/// after the replay is returned as is. Transport errors are never retried.
	pub async fn call(&self, request: HttpRequest) -> Result<HttpResponse> {
		let span = FlowSpan::new(FlowKind::ApiCall, "call");

		obs::record_flow_outcome(FlowKind::ApiCall, FlowOutcome::Attempt);

		let result = span.instrument(self.call_with_retry(request)).await;
		let outcome = match &result {
			Ok(response) if !self.strategy.is_authorization_failure(response.status().as_u16()) =>
				FlowOutcome::Success,
			_ => FlowOutcome::Failure,
		};

		obs::record_flow_outcome(FlowKind::ApiCall, outcome);

		result
	}

	async fn call_with_retry(&self, request: HttpRequest) -> Result<HttpResponse> {
		let (snapshot, refreshed) = self.keeper.acquire(false).await?;
		let replay = clone_request(&request);
		let response = self.send(request, &snapshot).await?;
		let status = response.status().as_u16();

		if !self.strategy.is_authorization_failure(status) {
			return Ok(response);
		}
		// This call already paid for a refresh; another one would break the one-refresh budget.
		if refreshed {
			events::unauthorized_response(status, false);

			return Ok(response);
		}

		events::unauthorized_response(status, true);

		let renewed = self.keeper.ensure_valid_after(&snapshot).await?;
		let response = self.send(replay, &renewed).await?;
		let status = response.status().as_u16();

		if self.strategy.is_authorization_failure(status) {
			events::unauthorized_response(status, false);
		}

		Ok(response)
	}

	async fn send(&self, mut request: HttpRequest, snapshot: &TokenSnapshot) -> Result<HttpResponse> {
		let mut bearer = HeaderValue::from_str(&snapshot.access_token.bearer())
			.map_err(|source| ConfigError::InvalidBearer { source })?;

		bearer.set_sensitive(true);
		request.headers_mut().insert(AUTHORIZATION, bearer);

		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());

		handle.call(request).await.map_err(|e| {
			self.transport_mapper.map_transport_error(
				self.strategy.as_ref(),
				RequestTarget::ProtectedApi,
				meta.take().as_ref(),
				e,
			)
		})
	}
}
#[cfg(feature = "reqwest")]
impl AuthenticatedClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds a client on a fresh reqwest transport.
	pub fn new(keeper: TokenKeeper, strategy: Arc<dyn ProviderStrategy>) -> Result<Self> {
		let client = ReqwestClient::builder().build().map_err(ConfigError::from)?;

		Ok(Self::with_http_client(
			keeper,
			strategy,
			ReqwestHttpClient::with_client(client),
			ReqwestTransportErrorMapper,
		))
	}
}
impl<C, M> Clone for AuthenticatedClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			keeper: self.keeper.clone(),
			http_client: Arc::clone(&self.http_client),
			transport_mapper: Arc::clone(&self.transport_mapper),
			strategy: Arc::clone(&self.strategy),
		}
	}
}
impl<C, M> Debug for AuthenticatedClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticatedClient").field("keeper", &self.keeper).finish()
	}
}

fn clone_request(request: &HttpRequest) -> HttpRequest {
	let mut copy = HttpRequest::new(request.body().clone());

	*copy.method_mut() = request.method().clone();
	*copy.uri_mut() = request.uri().clone();
	*copy.version_mut() = request.version();
	*copy.headers_mut() = request.headers().clone();

	copy
}
