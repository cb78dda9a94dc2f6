//! Plugs a non-reqwest transport into both the refresher and the authenticated client.
//!
//! 1. Implement [`TokenHttpClient`] so the transport records [`ResponseMetadata`] in the provided
//!    [`ResponseMetadataSlot`].
//! 2. Provide a [`TransportErrorMapper`] that understands the transport's error type.
//! 3. Hand both to [`OAuthRefresher::with_http_client`] and
//!    [`AuthenticatedClient::with_http_client`].

// std
use std::{
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
	sync::Arc,
};
// crates.io
use color_eyre::Result;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use oauth2_keeper::{
	auth::TokenRecord,
	client::AuthenticatedClient,
	error::{Error, TransientError, TransportError},
	http::{RequestTarget, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	keeper::{KeeperOptions, TokenKeeper},
	oauth::{
		OAuthRefresher, TransportErrorMapper,
		oauth2::{
			AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
			http::{
				HeaderValue, StatusCode,
				header::{AUTHORIZATION, CONTENT_TYPE},
			},
		},
	},
	provider::{DefaultProviderStrategy, ProviderDescriptor, ProviderStrategy},
	store::MemoryStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
	let descriptor = ProviderDescriptor::builder("mock-provider")
		.authorization_endpoint(Url::parse("https://provider.example.com/authorize")?)
		.token_endpoint(Url::parse("https://provider.example.com/token")?)
		.build()?;
	let transport = Arc::new(MockHttpClient);
	let mapper = Arc::new(MockTransportErrorMapper);
	let refresher: OAuthRefresher<MockHttpClient, MockTransportErrorMapper> =
		OAuthRefresher::with_http_client(
			descriptor,
			Arc::clone(&strategy),
			"demo-client",
			Arc::clone(&transport),
			Arc::clone(&mapper),
		)
		.with_client_secret("demo-secret");
	let now = OffsetDateTime::now_utc();
	let seed = TokenRecord::builder()
		.access_token("mock-stale")
		.refresh_token("mock-refresh")
		.issued_at(now - Duration::hours(1))
		.expires_at(now + Duration::minutes(1))
		.build()?;
	let keeper = TokenKeeper::open(
		Arc::new(MemoryStore::with_record(seed)),
		Arc::new(refresher),
		KeeperOptions::default(),
	)
	.await?;
	let client: AuthenticatedClient<MockHttpClient, MockTransportErrorMapper> =
		AuthenticatedClient::with_http_client(keeper.clone(), strategy, transport, mapper);
	let mut request = HttpRequest::new(Vec::new());

	*request.uri_mut() = "https://api.example.com/devices".parse()?;

	let response = client.call(request).await?;

	println!(
		"Protected API answered {} using {}.",
		response.status(),
		String::from_utf8_lossy(response.body())
	);
	println!("Keeper status after the call: {:?}.", keeper.status());

	Ok(())
}

#[derive(Debug)]
enum MockTransportError {
	UnknownHost(String),
}
impl Display for MockTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::UnknownHost(host) => write!(f, "DNS lookup failed for {host}"),
		}
	}
}
impl StdError for MockTransportError {}

/// Answers the token endpoint with a fresh token and the API with the bearer it received.
#[derive(Clone, Copy, Debug)]
struct MockHttpClient;
impl TokenHttpClient for MockHttpClient {
	type Handle = MockHttpHandle;
	type TransportError = MockTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		MockHttpHandle { slot }
	}
}

struct MockHttpHandle {
	slot: ResponseMetadataSlot,
}
impl<'a> AsyncHttpClient<'a> for MockHttpHandle {
	type Error = HttpClientError<MockTransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'a + Send + Sync>>;

	fn call(&'a self, request: HttpRequest) -> Self::Future {
		let slot = self.slot.clone();

		Box::pin(async move {
			slot.take();

			let body = match request.uri().host() {
				Some("provider.example.com") =>
					b"{\"access_token\":\"mock-fresh\",\"token_type\":\"bearer\",\"expires_in\":900}"
						.to_vec(),
				Some("api.example.com") => request
					.headers()
					.get(AUTHORIZATION)
					.map(|value| value.as_bytes().to_vec())
					.unwrap_or_default(),
				host =>
					return Err(HttpClientError::Reqwest(Box::new(MockTransportError::UnknownHost(
						host.unwrap_or_default().to_owned(),
					)))),
			};
			let mut response = HttpResponse::new(body);

			*response.status_mut() = StatusCode::OK;
			response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
			slot.store(ResponseMetadata { status: Some(200), retry_after: None });

			Ok(response)
		})
	}
}

#[derive(Clone, Copy, Debug)]
struct MockTransportErrorMapper;
impl TransportErrorMapper<MockTransportError> for MockTransportErrorMapper {
	fn map_transport_error(
		&self,
		_strategy: &dyn ProviderStrategy,
		target: RequestTarget,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<MockTransportError>,
	) -> Error {
		match error {
			HttpClientError::Reqwest(inner) => TransportError::network(target, *inner).into(),
			other => TransientError::TokenEndpoint {
				message: format!("Mock transport error while calling the {target}: {other}"),
				status: metadata.and_then(|meta| meta.status),
				retry_after: metadata.and_then(|meta| meta.retry_after),
			}
			.into(),
		}
	}
}
