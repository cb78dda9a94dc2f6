mod common;

// crates.io
use time::{Duration, macros};
// self
use common::{cleanup, temp_path};
use oauth2_keeper::{
	auth::{RefreshPolicy, TokenRecord, TokenStatus},
	store::{FileStore, MemoryStore, StoreError, TokenStore},
};

fn build_record(access: &str, refresh: Option<&str>) -> TokenRecord {
	let issued = macros::datetime!(2025-11-10 12:00 UTC);
	let builder = TokenRecord::builder()
		.access_token(access)
		.issued_at(issued)
		.expires_at(issued + Duration::hours(1));

	let builder = match refresh {
		Some(value) => builder.refresh_token(value),
		None => builder,
	};

	builder.build().expect("Token record fixture should build successfully.")
}

async fn exercise_contract(store: &dyn TokenStore) {
	assert_eq!(store.load().await.expect("Empty load should succeed."), None);
	assert_eq!(store.load_policy().await.expect("Empty policy load should succeed."), None);

	let first = build_record("access-1", Some("refresh-1"));

	store.save(first.clone()).await.expect("First save should succeed.");

	assert_eq!(store.load().await.expect("Load should succeed."), Some(first));

	let mut second = build_record("access-2", None);

	second.invalidate(macros::datetime!(2025-11-10 12:30 UTC), "invalid_grant");
	store.save(second.clone()).await.expect("Replacing save should succeed.");

	let loaded =
		store.load().await.expect("Load should succeed.").expect("Record should be present.");

	assert_eq!(loaded, second);
	assert_eq!(
		loaded.status_at(macros::datetime!(2025-11-10 12:45 UTC)),
		TokenStatus::Invalidated
	);

	let policy = RefreshPolicy::new(false, Duration::minutes(15));

	store.save_policy(policy).await.expect("Policy save should succeed.");

	assert_eq!(store.load_policy().await.expect("Policy load should succeed."), Some(policy));
	assert_eq!(store.load().await.expect("Load should succeed."), Some(second));
}

#[tokio::test]
async fn memory_store_honors_contract() {
	exercise_contract(&MemoryStore::default()).await;
}

#[tokio::test]
async fn file_store_honors_contract() {
	let path = temp_path("contract");
	let store = FileStore::open(&path).expect("File store should open.");

	exercise_contract(&store).await;
	cleanup(&path);
}

#[tokio::test]
async fn failed_memory_save_leaves_previous_record() {
	let store = MemoryStore::with_record(build_record("access-1", Some("refresh-1")));

	store.fail_saves(true);

	let err = store
		.save(build_record("access-2", Some("refresh-2")))
		.await
		.expect_err("Injected failure should surface.");

	assert!(matches!(err, StoreError::Backend { .. }));
	assert_eq!(store.record().map(|record| record.access_token.expose().to_owned()), Some("access-1".into()));
	assert_eq!(store.save_count(), 0);
}
