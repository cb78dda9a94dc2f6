//! Builds the authorize URL for the first login and shows how the redirect handler turns the
//! returned `code` into the record the keeper starts from.

// std
use std::{collections::HashMap, sync::Arc};
// crates.io
use color_eyre::{Result, eyre::eyre};
// self
use oauth2_keeper::{
	config::KeeperConfig,
	keeper::TokenKeeper,
	provider::{DefaultProviderStrategy, ProviderStrategy},
	store::MemoryStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = KeeperConfig::from_json_slice(
		br#"{
			"client_id": "demo-client",
			"client_secret": "demo-secret",
			"redirect_uri": "https://gateway.example.com/oauth/callback"
		}"#,
	)?;
	let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
	let refresher = config.refresher(strategy)?;
	let redirect_uri =
		config.redirect_url()?.ok_or_else(|| eyre!("A redirect URI must be configured."))?;
	let session = refresher.start_authorization(redirect_uri, &config.scopes());

	println!("Send your user to {}.", &session.authorize_url);

	let mut sessions: HashMap<String, _> = HashMap::new();

	sessions.insert(session.state.clone(), session.clone());

	// The redirect handler receives `state` and `code` as query parameters.
	let returned_state = session.state.clone();

	let Some(stashed) = sessions.remove(&returned_state) else {
		eprintln!("State `{returned_state}` was not recognized.");

		return Ok(());
	};

	stashed.validate_state(&returned_state)?;
	println!("Validated state; the callback would now run:");
	println!("    let record = refresher.exchange_code(&session, &state, &code).await?;");
	println!("    keeper.install(record).await?;");

	let keeper = TokenKeeper::open(
		Arc::new(MemoryStore::default()),
		Arc::new(refresher),
		config.keeper_options(),
	)
	.await?;

	println!("Keeper before the first login: {:?}.", keeper.status().state);

	Ok(())
}
