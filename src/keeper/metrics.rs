//! Counters describing refresh activity on one keeper.

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh activity.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	joined: AtomicU64,
	persist_failures: AtomicU64,
}
impl RefreshMetrics {
	/// Provider calls started.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Provider calls that produced a new record.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Provider calls that failed, permanently or not.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Callers that waited on a refresh another caller started.
	pub fn joined(&self) -> u64 {
		self.joined.load(Ordering::Relaxed)
	}

	/// Store writes that failed, leaving memory ahead of durable state.
	pub fn persist_failures(&self) -> u64 {
		self.persist_failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_join(&self) {
		self.joined.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_persist_failure(&self) {
		self.persist_failures.fetch_add(1, Ordering::Relaxed);
	}
}
