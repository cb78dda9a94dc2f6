#![cfg(feature = "reqwest")]

mod common;

// std
use std::{collections::HashMap, sync::Arc};
// crates.io
use httpmock::prelude::*;
use time::Duration;
use url::Url;
// self
use common::*;
use oauth2_keeper::{
	error::Error,
	keeper::{KeeperState, TokenKeeper},
	store::MemoryStore,
};

fn redirect_uri() -> Url {
	Url::parse("https://gateway.example.com/callback").expect("Redirect URI should parse successfully.")
}

#[tokio::test]
async fn authorization_code_exchange_installs_initial_record() {
	let server = MockServer::start_async().await;
	let refresher = refresher(&server);
	let session = refresher.start_authorization(redirect_uri(), &["openapi".to_owned()]);
	let pairs: HashMap<_, _> = session.authorize_url.query_pairs().into_owned().collect();

	assert!(session.authorize_url.as_str().starts_with(&server.url("/authorize")));
	assert_eq!(pairs.get("response_type"), Some(&"code".into()));
	assert_eq!(pairs.get("client_id"), Some(&CLIENT_ID.into()));
	assert_eq!(pairs.get("redirect_uri"), Some(&redirect_uri().as_str().into()));
	assert_eq!(pairs.get("scope"), Some(&"openapi".into()));
	assert_eq!(pairs.get("state"), Some(&session.state));

	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("access-initial", Some("refresh-initial"), Some(3600)));
		})
		.await;
	let record = refresher
		.exchange_code(&session, &session.state, "code-123")
		.await
		.expect("Authorization code exchange should succeed.");

	mock.assert_async().await;

	assert_eq!(record.access_token.expose(), "access-initial");
	assert_eq!(record.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-initial"));

	let store = MemoryStore::default();
	let keeper = keeper(Arc::new(store.clone()), &server).await;

	assert_eq!(keeper.status().state, KeeperState::Unconfigured);

	keeper.install(record.clone()).await.expect("Installing the record should succeed.");

	assert_eq!(keeper.status().state, KeeperState::Valid);
	assert_eq!(store.record(), Some(record));
	assert_eq!(
		keeper.ensure_valid().await.expect("Installed record should be usable.").access_token.expose(),
		"access-initial"
	);
}

#[tokio::test]
async fn state_mismatch_is_rejected_before_contacting_provider() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(500);
		})
		.await;
	let refresher = refresher(&server);
	let session = refresher.start_authorization(redirect_uri(), &[]);
	let err = refresher
		.exchange_code(&session, "forged-state", "code-123")
		.await
		.expect_err("Mismatched state should be rejected.");

	assert!(matches!(err, Error::InvalidGrant { .. }));

	mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn install_recovers_keeper_after_revocation() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let store = MemoryStore::with_record(record("access-old", "refresh-old", Duration::minutes(1)));
	let keeper: TokenKeeper = keeper(Arc::new(store.clone()), &server).await;

	assert!(keeper.ensure_valid().await.is_err());
	assert_eq!(keeper.status().state, KeeperState::Invalid);

	keeper
		.install(record("access-new", "refresh-new", Duration::hours(1)))
		.await
		.expect("Installing the record should succeed.");

	assert!(keeper.status().valid);
	assert_eq!(
		keeper.ensure_valid().await.expect("Installed record should be usable.").access_token.expose(),
		"access-new"
	);
	assert!(store.record().is_some_and(|stored| !stored.is_invalidated()));

	mock.assert_hits_async(1).await;
}
