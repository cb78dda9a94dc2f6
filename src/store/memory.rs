//! Thread-safe in-memory [`TokenStore`] for local development and tests.

// std
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{RefreshPolicy, TokenRecord},
	store::{StoreError, StoreFuture, TokenStore},
};

#[derive(Debug, Default)]
struct MemoryState {
	record: Option<TokenRecord>,
	policy: Option<RefreshPolicy>,
}

/// In-process storage backend with an injectable write failure for exercising divergence paths.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	state: Arc<RwLock<MemoryState>>,
	fail_saves: Arc<AtomicBool>,
	saves: Arc<AtomicUsize>,
}
impl MemoryStore {
	/// Creates a store that already holds the provided record.
	pub fn with_record(record: TokenRecord) -> Self {
		let store = Self::default();

		store.state.write().record = Some(record);

		store
	}

	/// Makes every subsequent save fail (or succeed again) with a backend error.
	pub fn fail_saves(&self, fail: bool) {
		self.fail_saves.store(fail, Ordering::SeqCst);
	}

	/// Returns the currently stored record without going through the async contract.
	pub fn record(&self) -> Option<TokenRecord> {
		self.state.read().record.clone()
	}

	/// Number of successful record saves.
	pub fn save_count(&self) -> usize {
		self.saves.load(Ordering::SeqCst)
	}

	fn check_writable(&self) -> Result<(), StoreError> {
		if self.fail_saves.load(Ordering::SeqCst) {
			return Err(StoreError::Backend { message: "memory store rejected the write".into() });
		}

		Ok(())
	}
}
impl TokenStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.record()) })
	}

	fn save(&self, record: TokenRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.check_writable()?;
			self.state.write().record = Some(record);
			self.saves.fetch_add(1, Ordering::SeqCst);

			Ok(())
		})
	}

	fn load_policy(&self) -> StoreFuture<'_, Option<RefreshPolicy>> {
		Box::pin(async move { Ok(self.state.read().policy) })
	}

	fn save_policy(&self, policy: RefreshPolicy) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.check_writable()?;
			self.state.write().policy = Some(policy);

			Ok(())
		})
	}
}
