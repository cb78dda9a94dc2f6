//! Runs a keeper with its background scheduler against a file-backed store and makes one
//! authenticated call to the protected API.
//!
//! Pass a JSON configuration path as the first argument; `store_path` must point at a token
//! document produced by a previous authorization.

// std
use std::{env, sync::Arc};
// crates.io
use color_eyre::Result;
// self
use oauth2_keeper::{
	client::ReqwestAuthenticatedClient,
	config::KeeperConfig,
	keeper::TokenKeeper,
	oauth::oauth2::{HttpRequest, http::Method},
	provider::{DefaultProviderStrategy, ProviderStrategy},
	scheduler::RefreshScheduler,
	store::FileStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = match env::args().nth(1) {
		Some(path) => KeeperConfig::from_path(path)?,
		None => KeeperConfig::from_json_slice(br#"{"client_id":"demo-client"}"#)?,
	};
	let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
	let store = FileStore::open(&config.store_path)?;
	let keeper = TokenKeeper::open(
		Arc::new(store),
		Arc::new(config.refresher(strategy.clone())?),
		config.keeper_options(),
	)
	.await?;

	println!("Keeper status: {}.", serde_json::to_string(&keeper.status())?);

	let scheduler = RefreshScheduler::spawn(keeper.clone(), config.refresh_interval())?;
	let client = ReqwestAuthenticatedClient::new(keeper.clone(), strategy)?;
	let mut request = HttpRequest::new(br#"{"header":{"namespace":"Uhome.Device","name":"Discovery"}}"#.to_vec());

	*request.method_mut() = Method::POST;
	*request.uri_mut() = format!("{}/action", config.api_base_url).parse()?;

	match client.call(request).await {
		Ok(response) => println!("Protected API answered with {}.", response.status()),
		Err(e) if e.is_permanent() => println!("Re-authorization required: {e}."),
		Err(e) => println!("Call failed, try again later: {e}."),
	}

	let metrics = keeper.refresh_metrics();

	println!(
		"Refresh attempts: {}, successes: {}, failures: {}.",
		metrics.attempts(),
		metrics.successes(),
		metrics.failures()
	);

	scheduler.shutdown().await;

	Ok(())
}
