//! Keeps a single OAuth 2.0 access/refresh token pair alive indefinitely: singleflight refreshes,
//! proactive background scheduling, and retry-once authenticated calls behind a narrow contract.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod authorize;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod keeper;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod scheduler;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
		time::Duration as StdDuration,
	};
	// self
	use crate::{
		auth::{TokenRecord, TokenSecret},
		error::TransientError,
		oauth::{RefreshFuture, TokenGrant, TokenRefresher},
	};

	/// Scripted reply handed out by [`StubRefresher`].
	#[derive(Clone, Debug)]
	pub enum StubResponse {
		/// Successful refresh returning the provided secrets.
		Grant {
			/// New access token.
			access: String,
			/// Rotated refresh token, if any.
			refresh: Option<String>,
			/// Lifetime reported by the provider.
			expires_in: Duration,
		},
		/// Provider rejected the refresh token.
		InvalidGrant,
		/// Provider answered with a retryable failure.
		Unavailable,
		/// Provider never answers.
		Hang,
	}
	impl StubResponse {
		/// Shorthand for a one-hour grant that keeps the previous refresh token.
		pub fn grant(access: &str) -> Self {
			Self::Grant { access: access.into(), refresh: None, expires_in: Duration::hours(1) }
		}
	}

	/// In-process [`TokenRefresher`] that replays a script and counts provider calls.
	#[derive(Debug, Default)]
	pub struct StubRefresher {
		script: Mutex<VecDeque<StubResponse>>,
		calls: AtomicUsize,
		latency: Option<StdDuration>,
	}
	impl StubRefresher {
		/// Creates a stub that answers with the provided responses in order.
		pub fn new(script: impl IntoIterator<Item = StubResponse>) -> Self {
			Self {
				script: Mutex::new(script.into_iter().collect()),
				calls: AtomicUsize::new(0),
				latency: None,
			}
		}

		/// Delays every answer by the provided latency.
		pub fn with_latency(mut self, latency: StdDuration) -> Self {
			self.latency = Some(latency);

			self
		}

		/// Number of refresh calls observed so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl TokenRefresher for StubRefresher {
		fn refresh<'a>(&'a self, _refresh_token: &'a str) -> RefreshFuture<'a> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let next = self.script.lock().pop_front().unwrap_or(StubResponse::Unavailable);
			let latency = self.latency;

			Box::pin(async move {
				if let Some(latency) = latency {
					tokio::time::sleep(latency).await;
				}

				match next {
					StubResponse::Grant { access, refresh, expires_in } => Ok(TokenGrant {
						access_token: TokenSecret::new(access),
						refresh_token: refresh.map(TokenSecret::new),
						expires_in,
						received_at: OffsetDateTime::now_utc(),
					}),
					StubResponse::InvalidGrant =>
						Err(Error::InvalidGrant { reason: "refresh token revoked".into() }),
					StubResponse::Unavailable => Err(TransientError::TokenEndpoint {
						message: "stub provider unavailable".into(),
						status: Some(503),
						retry_after: None,
					}
					.into()),
					StubResponse::Hang => std::future::pending().await,
				}
			})
		}
	}

	/// Builds a record issued five minutes ago that expires `expires_in` from now.
	pub fn record_expiring_in(access: &str, refresh: &str, expires_in: Duration) -> TokenRecord {
		let now = OffsetDateTime::now_utc();

		TokenRecord::builder()
			.access_token(access)
			.refresh_token(refresh)
			.issued_at(now - Duration::minutes(5))
			.expires_at(now + expires_in)
			.build()
			.expect("Token record fixture should build successfully.")
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> crate::http::ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		crate::http::ReqwestHttpClient::with_client(client)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
