//! Transport primitives shared by token endpoint calls and protected API calls.
//!
//! [`TokenHttpClient`] is the keeper's only dependency on an HTTP stack. Each request gets a
//! fresh [`ResponseMetadataSlot`]; transports [`take`](ResponseMetadataSlot::take) it before
//! dispatching and [`store`](ResponseMetadataSlot::store) the status and retry hint once a
//! response arrives, so error mapping sees the same metadata regardless of transport.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
#[cfg(feature = "reqwest")] use reqwest::header::{HeaderMap, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, provider::GrantType};

/// Abstraction over HTTP transports used for both the token endpoint and the protected API.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the
/// refresher and the authenticated client, and the handles they return must own whatever state
/// they need so request futures stay `Send` while a refresh runs on a spawned task.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// # Metadata Contract
	///
	/// - Call [`ResponseMetadataSlot::take`] before submitting the HTTP request so stale
	///   information never leaks across retries.
	/// - Once a response provides status headers, save them with [`ResponseMetadataSlot::store`].
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Which upstream endpoint a request was addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestTarget {
	/// OAuth token endpoint, carrying the grant being exchanged.
	TokenEndpoint(GrantType),
	/// Protected resource API called with the bearer credential.
	ProtectedApi,
}
impl Display for RequestTarget {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::TokenEndpoint(grant) => write!(f, "token endpoint ({grant})"),
			Self::ProtectedApi => f.write_str("protected API"),
		}
	}
}

/// Metadata captured from the most recent HTTP response.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token endpoints answer directly, so clients passed in here should not follow redirects;
/// [`ReqwestHttpClient::without_redirects`] builds one that doesn't.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that never follows redirects.
	pub fn without_redirects() -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(crate::error::ConfigError::from)?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle(Arc::new((self.0.clone(), slot)))
	}
}

/// Handle returned by [`ReqwestHttpClient`] that records response metadata.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<(ReqwestClient, ResponseMetadataSlot)>);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let inner = Arc::clone(&self.0);

		Box::pin(async move {
			let (client, slot) = &*inner;

			slot.take();

			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			slot.store(ResponseMetadata {
				status: Some(status.as_u16()),
				retry_after: parse_retry_after(&headers),
			});

			let mut converted = HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<i64>() {
		return Some(Duration::seconds(secs));
	}

	let delta = OffsetDateTime::parse(raw, &Rfc2822).ok()? - OffsetDateTime::now_utc();

	delta.is_positive().then_some(delta)
}
