#![allow(dead_code)]

// std
use std::{
	env, fs,
	path::{Path, PathBuf},
	process,
	sync::Arc,
};
// crates.io
use httpmock::MockServer;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use oauth2_keeper::{
	auth::TokenRecord,
	keeper::{KeeperOptions, TokenKeeper},
	oauth::ReqwestRefresher,
	provider::{ClientAuthMethod, DefaultProviderStrategy, ProviderDescriptor, ProviderStrategy},
	store::TokenStore,
};

pub const CLIENT_ID: &str = "client-keeper";
pub const CLIENT_SECRET: &str = "secret-keeper";

pub fn descriptor(server: &MockServer) -> ProviderDescriptor {
	ProviderDescriptor::builder("mock-provider")
		.authorization_endpoint(
			Url::parse(&server.url("/authorize"))
				.expect("Mock authorize endpoint should parse successfully."),
		)
		.token_endpoint(
			Url::parse(&server.url("/token")).expect("Mock token endpoint should parse successfully."),
		)
		.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
		.build()
		.expect("Provider descriptor should build successfully.")
}

pub fn strategy() -> Arc<dyn ProviderStrategy> {
	Arc::new(DefaultProviderStrategy)
}

pub fn refresher(server: &MockServer) -> ReqwestRefresher {
	ReqwestRefresher::new(descriptor(server), strategy(), CLIENT_ID)
		.expect("Reqwest refresher should build.")
		.with_client_secret(CLIENT_SECRET)
}

/// Record issued five minutes ago that expires `expires_in` from now.
pub fn record(access: &str, refresh: &str, expires_in: Duration) -> TokenRecord {
	let now = OffsetDateTime::now_utc();

	TokenRecord::builder()
		.access_token(access)
		.refresh_token(refresh)
		.issued_at(now - Duration::minutes(5))
		.expires_at(now + expires_in)
		.build()
		.expect("Token record fixture should build successfully.")
}

pub async fn keeper(store: Arc<dyn TokenStore>, server: &MockServer) -> TokenKeeper {
	TokenKeeper::open(store, Arc::new(refresher(server)), KeeperOptions::default())
		.await
		.expect("Keeper should open successfully.")
}

pub fn token_body(access: &str, refresh: Option<&str>, expires_in: Option<u64>) -> String {
	let mut body = serde_json::json!({ "access_token": access, "token_type": "bearer" });

	if let Some(refresh) = refresh {
		body["refresh_token"] = refresh.into();
	}
	if let Some(expires_in) = expires_in {
		body["expires_in"] = expires_in.into();
	}

	body.to_string()
}

pub fn temp_path(label: &str) -> PathBuf {
	env::temp_dir().join(format!(
		"oauth2_keeper_it_{label}_{}_{}.json",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	))
}

pub fn cleanup(path: &Path) {
	let _ = fs::remove_file(path);
}
