#![cfg(feature = "reqwest")]

mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use time::Duration;
// self
use common::*;
use oauth2_keeper::{
	client::ReqwestAuthenticatedClient,
	oauth::oauth2::{
		HttpRequest,
		http::{Method, StatusCode},
	},
	provider::{DefaultProviderStrategy, ProviderErrorContext, ProviderErrorKind, ProviderStrategy},
	store::MemoryStore,
};

fn api_request(server: &MockServer) -> HttpRequest {
	let mut request = HttpRequest::new(Vec::new());

	*request.method_mut() = Method::GET;
	*request.uri_mut() = server.url("/devices").parse().expect("Mock API URL should parse.");

	request
}

async fn client(server: &MockServer, access: &str) -> ReqwestAuthenticatedClient {
	let store = MemoryStore::with_record(record(access, "refresh-old", Duration::hours(1)));

	ReqwestAuthenticatedClient::new(keeper(Arc::new(store), server).await, strategy())
		.expect("Authenticated client should build.")
}

#[tokio::test]
async fn rejected_token_is_refreshed_and_request_replayed_once() {
	let server = MockServer::start_async().await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/devices").header("authorization", "Bearer access-stale");
			then.status(401);
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/devices").header("authorization", "Bearer access-fresh");
			then.status(200).header("content-type", "application/json").body("{\"devices\":[]}");
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-fresh", Some("refresh-new"), Some(3600)));
		})
		.await;
	let client = client(&server, "access-stale").await;
	let response = client.call(api_request(&server)).await.expect("Replayed call should succeed.");

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(response.body().as_slice(), b"{\"devices\":[]}");

	stale.assert_hits_async(1).await;
	fresh.assert_hits_async(1).await;
	token.assert_hits_async(1).await;
}

#[tokio::test]
async fn persistent_rejection_stops_after_two_attempts() {
	let server = MockServer::start_async().await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/devices");
			then.status(401);
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-fresh", None, Some(3600)));
		})
		.await;
	let client = client(&server, "access-stale").await;
	let response = client.call(api_request(&server)).await.expect("Final response should be returned.");

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	api.assert_hits_async(2).await;
	token.assert_hits_async(1).await;
}

#[tokio::test]
async fn successful_call_never_touches_token_endpoint() {
	let server = MockServer::start_async().await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/devices").header("authorization", "Bearer access-valid");
			then.status(204);
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(500);
		})
		.await;
	let client = client(&server, "access-valid").await;
	let response = client.call(api_request(&server)).await.expect("Call should succeed.");

	assert_eq!(response.status(), StatusCode::NO_CONTENT);

	api.assert_async().await;
	token.assert_hits_async(0).await;
}

#[tokio::test]
async fn provider_strategy_decides_what_counts_as_rejected() {
	struct ForbiddenMeansExpired;
	impl ProviderStrategy for ForbiddenMeansExpired {
		fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
			DefaultProviderStrategy.classify_token_error(ctx)
		}

		fn is_authorization_failure(&self, status: u16) -> bool {
			matches!(status, 401 | 403)
		}
	}

	let server = MockServer::start_async().await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/devices").header("authorization", "Bearer access-stale");
			then.status(403);
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/devices").header("authorization", "Bearer access-fresh");
			then.status(200);
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-fresh", None, Some(3600)));
		})
		.await;
	let store = MemoryStore::with_record(record("access-stale", "refresh-old", Duration::hours(1)));
	let client = ReqwestAuthenticatedClient::new(
		keeper(Arc::new(store), &server).await,
		Arc::new(ForbiddenMeansExpired),
	)
	.expect("Authenticated client should build.");
	let response = client.call(api_request(&server)).await.expect("Replayed call should succeed.");

	assert_eq!(response.status(), StatusCode::OK);

	stale.assert_hits_async(1).await;
	fresh.assert_hits_async(1).await;
	token.assert_hits_async(1).await;
}
