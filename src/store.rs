//! Storage contract and built-in store implementations for the kept token record.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{RefreshPolicy, TokenRecord},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable holder for the single token record and its refresh policy.
///
/// Stores carry no business logic and never retry. `save` must be atomic from the caller's point of
/// view: a concurrent or subsequent `load` observes either the previous record or the new one.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Returns the persisted record, or `None` when nothing has been installed yet.
	fn load(&self) -> StoreFuture<'_, Option<TokenRecord>>;

	/// Replaces the persisted record as a whole.
	fn save(&self, record: TokenRecord) -> StoreFuture<'_, ()>;

	/// Returns the persisted refresh policy, if one was ever saved.
	fn load_policy(&self) -> StoreFuture<'_, Option<RefreshPolicy>>;

	/// Replaces the persisted refresh policy.
	fn save_policy(&self, policy: RefreshPolicy) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
