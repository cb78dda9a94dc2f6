//! Periodic background refresh so idle periods never let the token lapse.
//!
//! Every tick calls [`TokenKeeper::ensure_valid`] and only logs the result. Ticks never overlap:
//! while one is still running the next is skipped. Shutting down stops new ticks and waits for
//! the running one, whose refresh is left to finish on its own.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::{
	task::JoinHandle,
	time::{self as tokio_time, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	keeper::TokenKeeper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan, events},
};

/// Default tick interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::minutes(5);

/// Tick counters exposed through [`SchedulerHandle`].
#[derive(Debug, Default)]
pub struct TickStats {
	started: AtomicU64,
	skipped: AtomicU64,
}
impl TickStats {
	/// Ticks that called into the keeper.
	pub fn started(&self) -> u64 {
		self.started.load(Ordering::Relaxed)
	}

	/// Ticks skipped because auto refresh was off or the previous tick was still running.
	pub fn skipped(&self) -> u64 {
		self.skipped.load(Ordering::Relaxed)
	}
}

/// Spawns the background refresh loop.
#[derive(Debug)]
pub struct RefreshScheduler;
impl RefreshScheduler {
	/// Starts ticking every `interval` on the ambient tokio runtime; the first tick fires at once.
	pub fn spawn(keeper: TokenKeeper, interval: Duration) -> Result<SchedulerHandle> {
		if !interval.is_positive() {
			return Err(ConfigError::InvalidSetting {
				field: "refresh_interval",
				reason: "must be positive",
			}
			.into());
		}

		let cancel = CancellationToken::new();
		let tick_guard = Arc::new(AsyncMutex::new(()));
		let stats = Arc::new(TickStats::default());
		let task = tokio::spawn(run_loop(
			keeper,
			interval.unsigned_abs(),
			cancel.clone(),
			tick_guard.clone(),
			stats.clone(),
		));

		Ok(SchedulerHandle { cancel, task: Some(task), tick_guard, stats })
	}
}

/// Owner of a running scheduler. Dropping it stops new ticks without waiting.
#[derive(Debug)]
pub struct SchedulerHandle {
	cancel: CancellationToken,
	task: Option<JoinHandle<()>>,
	tick_guard: Arc<AsyncMutex<()>>,
	stats: Arc<TickStats>,
}
impl SchedulerHandle {
	/// Tick counters.
	pub fn stats(&self) -> &TickStats {
		&self.stats
	}

	/// Stops issuing ticks and waits for a tick already in progress to finish.
	pub async fn shutdown(mut self) {
		self.cancel.cancel();

		if let Some(task) = self.task.take() {
			let _ = task.await;
		}

		let _ = self.tick_guard.lock().await;
	}
}
impl Drop for SchedulerHandle {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

async fn run_loop(
	keeper: TokenKeeper,
	interval: std::time::Duration,
	cancel: CancellationToken,
	tick_guard: Arc<AsyncMutex<()>>,
	stats: Arc<TickStats>,
) {
	let mut ticker = tokio_time::interval(interval);

	ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

	loop {
		tokio::select! {
			_ = cancel.cancelled() => break,
			_ = ticker.tick() => {},
		}

		if !keeper.policy().auto_refresh_enabled {
			stats.skipped.fetch_add(1, Ordering::Relaxed);
			events::tick_skipped("auto refresh disabled");

			continue;
		}

		let Some(guard) = tick_guard.try_lock_arc() else {
			stats.skipped.fetch_add(1, Ordering::Relaxed);
			events::tick_skipped("previous tick still running");

			continue;
		};
		let keeper = keeper.clone();

		stats.started.fetch_add(1, Ordering::Relaxed);
		tokio::spawn(FlowSpan::new(FlowKind::ScheduledTick, "tick").instrument(async move {
			let _guard = guard;

			obs::record_flow_outcome(FlowKind::ScheduledTick, FlowOutcome::Attempt);

			let (outcome, label) = match keeper.ensure_valid().await {
				Ok(_) => (FlowOutcome::Success, "token_valid"),
				Err(Error::NotConfigured) => (FlowOutcome::Failure, "not_configured"),
				Err(e) if e.is_permanent() => (FlowOutcome::Failure, "reauthorization_required"),
				Err(_) => (FlowOutcome::Failure, "refresh_deferred"),
			};

			obs::record_flow_outcome(FlowKind::ScheduledTick, outcome);
			events::tick_completed(label);
		}));
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// self
	use super::*;
	use crate::{
		_preludet::{StubRefresher, StubResponse, record_expiring_in},
		auth::RefreshPolicy,
		keeper::{KeeperOptions, KeeperState},
		store::MemoryStore,
	};

	async fn keeper(
		store: &MemoryStore,
		refresher: &Arc<StubRefresher>,
		options: KeeperOptions,
	) -> TokenKeeper {
		TokenKeeper::open(Arc::new(store.clone()), refresher.clone(), options)
			.await
			.expect("Keeper should open over the memory store.")
	}

	fn expiring_store() -> MemoryStore {
		MemoryStore::with_record(record_expiring_in("a-1", "r-1", Duration::minutes(2)))
	}

	#[tokio::test(start_paused = true)]
	async fn tick_refreshes_expiring_record() {
		let store = expiring_store();
		let refresher = Arc::new(StubRefresher::new([StubResponse::grant("a-2")]));
		let keeper = keeper(&store, &refresher, KeeperOptions::default()).await;
		let handle = RefreshScheduler::spawn(keeper.clone(), Duration::minutes(1))
			.expect("Scheduler should start.");

		tokio::time::sleep(StdDuration::from_millis(10)).await;

		assert_eq!(refresher.calls(), 1);
		assert_eq!(keeper.status().state, KeeperState::Valid);
		assert_eq!(handle.stats().started(), 1);

		handle.shutdown().await;
	}

	#[tokio::test(start_paused = true)]
	async fn timed_out_tick_is_retried_by_the_next_tick() {
		let store = expiring_store();
		let refresher =
			Arc::new(StubRefresher::new([StubResponse::Hang, StubResponse::grant("a-2")]));
		let keeper = keeper(&store, &refresher, KeeperOptions::default()).await;
		let handle = RefreshScheduler::spawn(keeper.clone(), Duration::minutes(1))
			.expect("Scheduler should start.");

		tokio::time::sleep(StdDuration::from_secs(35)).await;

		assert_eq!(refresher.calls(), 1);
		assert_eq!(keeper.status().state, KeeperState::ExpiringSoon);
		assert_eq!(keeper.refresh_metrics().failures(), 1);

		tokio::time::sleep(StdDuration::from_secs(30)).await;

		assert_eq!(refresher.calls(), 2);
		assert_eq!(keeper.status().state, KeeperState::Valid);
		assert_eq!(handle.stats().started(), 2);
		assert_eq!(store.record().map(|r| r.access_token.expose().to_owned()), Some("a-2".into()));

		handle.shutdown().await;
	}

	#[tokio::test(start_paused = true)]
	async fn disabled_auto_refresh_skips_ticks() {
		let store = expiring_store();
		let refresher = Arc::new(StubRefresher::default());
		let options = KeeperOptions::default()
			.with_policy(RefreshPolicy::default().with_auto_refresh(false));
		let keeper = keeper(&store, &refresher, options).await;
		let handle = RefreshScheduler::spawn(keeper, Duration::minutes(1))
			.expect("Scheduler should start.");

		tokio::time::sleep(StdDuration::from_secs(150)).await;

		assert_eq!(refresher.calls(), 0);
		assert_eq!(handle.stats().started(), 0);
		assert_eq!(handle.stats().skipped(), 3);

		handle.shutdown().await;
	}

	#[tokio::test(start_paused = true)]
	async fn overlapping_tick_is_skipped() {
		let store = expiring_store();
		let refresher = Arc::new(
			StubRefresher::new([StubResponse::grant("a-2")]).with_latency(StdDuration::from_secs(90)),
		);
		let options = KeeperOptions::default().with_refresh_timeout(Duration::minutes(5));
		let keeper = keeper(&store, &refresher, options).await;
		let handle = RefreshScheduler::spawn(keeper, Duration::minutes(1))
			.expect("Scheduler should start.");

		tokio::time::sleep(StdDuration::from_secs(100)).await;

		assert_eq!(refresher.calls(), 1);
		assert_eq!(handle.stats().started(), 1);
		assert_eq!(handle.stats().skipped(), 1);

		handle.shutdown().await;
	}

	#[tokio::test(start_paused = true)]
	async fn shutdown_lets_running_refresh_finish() {
		let store = expiring_store();
		let refresher = Arc::new(
			StubRefresher::new([StubResponse::grant("a-2")]).with_latency(StdDuration::from_secs(10)),
		);
		let keeper = keeper(&store, &refresher, KeeperOptions::default()).await;
		let handle = RefreshScheduler::spawn(keeper.clone(), Duration::minutes(1))
			.expect("Scheduler should start.");

		tokio::time::sleep(StdDuration::from_millis(1)).await;
		handle.shutdown().await;

		assert_eq!(refresher.calls(), 1);
		assert_eq!(store.record().map(|r| r.access_token.expose().to_owned()), Some("a-2".into()));

		tokio::time::sleep(StdDuration::from_secs(600)).await;

		assert_eq!(refresher.calls(), 1);
	}

	#[tokio::test]
	async fn zero_interval_is_rejected() {
		let store = expiring_store();
		let refresher = Arc::new(StubRefresher::default());
		let keeper = keeper(&store, &refresher, KeeperOptions::default()).await;
		let err = RefreshScheduler::spawn(keeper, Duration::ZERO).expect_err("Zero interval should fail.");

		assert!(matches!(err, Error::Config(ConfigError::InvalidSetting { .. })));
	}
}
