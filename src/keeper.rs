//! Single-flight refresh coordinator guarding one token record.
//!
//! [`TokenKeeper::ensure_valid`] is the only way callers obtain a credential. While the record is
//! outside the refresh buffer it returns a snapshot without touching the refresh slot. Otherwise
//! the first caller spawns the refresh on the runtime and parks a [`Shared`] handle to it in the
//! slot; every concurrent caller awaits that same handle, so N callers cost one provider call and
//! dropping any of them never cancels the refresh.
//!
//! Each published change (refresh result or [`install`](TokenKeeper::install)) bumps an epoch. A
//! caller whose view predates the latest change reuses that change's outcome instead of starting
//! another refresh, which collapses 401 storms and keeps a refresh from ever running against a
//! record older than the latest persisted one.

pub mod metrics;
pub mod state;

pub use metrics::*;
pub use state::*;

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use futures_util::future::{self, BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::{self, RefreshPolicy, TokenRecord},
	error::TransientError,
	oauth::TokenRefresher,
	obs::{self, FlowKind, FlowOutcome, FlowSpan, events},
	store::TokenStore,
};

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Default budget for one provider refresh call.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::seconds(30);

/// Construction options for [`TokenKeeper::open`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeeperOptions {
	/// Policy used when the store has none persisted.
	pub policy: RefreshPolicy,
	/// Upper bound for a single refresh call.
	pub refresh_timeout: Duration,
}
impl KeeperOptions {
	/// Overrides the fallback refresh policy.
	pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Overrides the refresh timeout.
	pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = timeout;

		self
	}
}
impl Default for KeeperOptions {
	fn default() -> Self {
		Self { policy: RefreshPolicy::default(), refresh_timeout: DEFAULT_REFRESH_TIMEOUT }
	}
}

#[derive(Clone, Debug)]
struct Snapshot {
	record: Option<TokenRecord>,
	policy: RefreshPolicy,
	epoch: u64,
	last_outcome: Option<RefreshOutcome>,
}

struct KeeperInner {
	store: Arc<dyn TokenStore>,
	refresher: Arc<dyn TokenRefresher>,
	refresh_timeout: Duration,
	state: RwLock<Arc<Snapshot>>,
	in_flight: Mutex<Option<SharedRefresh>>,
	// Orders publish + persist so the store never ends up behind an older record.
	writer: AsyncMutex<()>,
	persist_diverged: AtomicBool,
	metrics: Arc<RefreshMetrics>,
}

/// Cloneable handle to the coordinator; all clones share one record and one refresh slot.
///
/// Refreshes run on the ambient tokio runtime, so the keeper must be used from within one.
#[derive(Clone)]
pub struct TokenKeeper(Arc<KeeperInner>);
impl TokenKeeper {
	/// Loads the persisted record and policy and builds the keeper.
	///
	/// A store without a record yields a keeper in [`KeeperState::Unconfigured`]; a store without
	/// a policy falls back to `options.policy`.
	pub async fn open(
		store: Arc<dyn TokenStore>,
		refresher: Arc<dyn TokenRefresher>,
		options: KeeperOptions,
	) -> Result<Self> {
		let record = store.load().await?;
		let policy = store.load_policy().await?.unwrap_or(options.policy);

		policy.validate()?;

		let snapshot = Snapshot { record, policy, epoch: 0, last_outcome: None };

		Ok(Self(Arc::new(KeeperInner {
			store,
			refresher,
			refresh_timeout: options.refresh_timeout,
			state: RwLock::new(Arc::new(snapshot)),
			in_flight: Mutex::new(None),
			writer: AsyncMutex::new(()),
			persist_diverged: AtomicBool::new(false),
			metrics: Default::default(),
		})))
	}

	/// Returns a usable access token, refreshing first when the record is expiring soon.
	///
	/// Errors distinguish "try again later" ([`Error::Transient`]) from "reauthorize now"
	/// ([`Error::Reauthorize`], [`Error::NotConfigured`]). A failed refresh still yields the
	/// current token while it has not hard-expired.
	pub async fn ensure_valid(&self) -> Result<TokenSnapshot> {
		self.ensure_valid_with(false).await
	}

	/// Like [`ensure_valid`](Self::ensure_valid); `force` bypasses the "still valid" fast path and
	/// surfaces refresh failures instead of serving the current token.
	pub async fn ensure_valid_with(&self, force: bool) -> Result<TokenSnapshot> {
		self.acquire(force).await.map(|(snapshot, _)| snapshot)
	}

	/// Same as [`ensure_valid_with`](Self::ensure_valid_with), also reporting whether the call
	/// went through a refresh (its own or a joined one).
	pub(crate) async fn acquire(&self, force: bool) -> Result<(TokenSnapshot, bool)> {
		let snap = self.snapshot();
		let record = Self::usable_record(&snap)?;

		if !force && !auth::is_expiring_soon(record, &snap.policy, OffsetDateTime::now_utc()) {
			return Ok((record.into(), false));
		}

		let outcome = self.join_or_start(snap.epoch).await;

		self.resolve(outcome, force).map(|snapshot| (snapshot, true))
	}

	/// Forced refresh on behalf of a request whose credential the protected API rejected.
	///
	/// If the keeper already moved past `rejected` (another caller refreshed in the meantime),
	/// the newer token is returned without contacting the provider.
	pub async fn ensure_valid_after(&self, rejected: &TokenSnapshot) -> Result<TokenSnapshot> {
		let snap = self.snapshot();
		let record = Self::usable_record(&snap)?;

		if record.access_token != rejected.access_token
			&& !auth::is_expired(record, OffsetDateTime::now_utc())
		{
			return Ok(record.into());
		}

		let outcome = self.join_or_start(snap.epoch).await;

		self.resolve(outcome, true)
	}

	/// Refreshes now (or joins the refresh in flight) and returns the shared outcome.
	///
	/// Never contacts the provider for an invalid or missing record.
	pub async fn force_refresh(&self) -> RefreshOutcome {
		let snap = self.snapshot();

		match &snap.record {
			None => RefreshOutcome::PermanentFailure(Error::NotConfigured.to_string()),
			Some(record) if record.is_invalidated() =>
				RefreshOutcome::PermanentFailure(Self::invalid_reason(record)),
			Some(_) => self.join_or_start(snap.epoch).await,
		}
	}

	/// Installs a brand-new record (typically from an authorization-code exchange).
	///
	/// This is the only way out of [`KeeperState::Invalid`]. The record is live in memory even if
	/// persisting it fails; the error reports the divergence.
	pub async fn install(&self, record: TokenRecord) -> Result<()> {
		let _writer = self.0.writer.lock().await;
		let expires_at = record.expires_at;

		self.publish(|next| {
			next.record = Some(record.clone());
			next.epoch += 1;
			next.last_outcome = Some(RefreshOutcome::Success(record.clone()));
		});
		events::record_installed(expires_at);

		self.persist_record(record).await
	}

	/// Replaces and persists the refresh policy.
	pub async fn set_policy(&self, policy: RefreshPolicy) -> Result<()> {
		policy.validate()?;

		let _writer = self.0.writer.lock().await;

		self.publish(|next| next.policy = policy);

		self.0.store.save_policy(policy).await.map_err(|e| {
			self.mark_diverged(&e);

			e.into()
		})
	}

	/// Current refresh policy.
	pub fn policy(&self) -> RefreshPolicy {
		self.snapshot().policy
	}

	/// Health/diagnostics view.
	pub fn status(&self) -> KeeperStatus {
		let snap = self.snapshot();
		let now = OffsetDateTime::now_utc();
		let refreshing = self.0.in_flight.lock().is_some();
		let state = match &snap.record {
			None => KeeperState::Unconfigured,
			Some(record) if record.is_invalidated() => KeeperState::Invalid,
			Some(_) if refreshing => KeeperState::Refreshing,
			Some(record) if auth::is_expiring_soon(record, &snap.policy, now) =>
				KeeperState::ExpiringSoon,
			Some(_) => KeeperState::Valid,
		};

		KeeperStatus {
			valid: snap
				.record
				.as_ref()
				.is_some_and(|record| !record.is_invalidated() && !auth::is_expired(record, now)),
			state,
			expires_at: snap.record.as_ref().map(|record| record.expires_at),
			auto_refresh_enabled: snap.policy.auto_refresh_enabled,
			persist_diverged: self.0.persist_diverged.load(Ordering::SeqCst),
		}
	}

	/// Shared refresh counters.
	pub fn refresh_metrics(&self) -> Arc<RefreshMetrics> {
		Arc::clone(&self.0.metrics)
	}

	fn snapshot(&self) -> Arc<Snapshot> {
		Arc::clone(&self.0.state.read())
	}

	fn publish(&self, apply: impl FnOnce(&mut Snapshot)) {
		let mut state = self.0.state.write();
		let mut next = Snapshot::clone(&state);

		apply(&mut next);

		*state = Arc::new(next);
	}

	fn usable_record(snap: &Snapshot) -> Result<&TokenRecord> {
		let record = snap.record.as_ref().ok_or(Error::NotConfigured)?;

		if record.is_invalidated() {
			return Err(Error::Reauthorize { reason: Self::invalid_reason(record) });
		}

		Ok(record)
	}

	fn invalid_reason(record: &TokenRecord) -> String {
		record.invalid_reason.clone().unwrap_or_else(|| "refresh token rejected".into())
	}

	fn join_or_start(&self, observed_epoch: u64) -> SharedRefresh {
		let mut slot = self.0.in_flight.lock();

		if let Some(shared) = slot.as_ref() {
			self.0.metrics.record_join();

			return shared.clone();
		}

		let snap = self.snapshot();

		// Someone published since the caller looked; hand back that result instead of refreshing.
		if let (true, Some(outcome)) = (snap.epoch != observed_epoch, &snap.last_outcome) {
			return future::ready(outcome.clone()).boxed().shared();
		}

		let keeper = self.clone();
		let span = FlowSpan::new(FlowKind::Refresh, "ensure_valid");
		let task = tokio::spawn(span.instrument(async move {
			let _clear = ClearInFlight(keeper.clone());

			keeper.run_refresh().await
		}));
		let shared = async move {
			task.await.unwrap_or_else(|e| {
				RefreshOutcome::TransientFailure(format!("refresh task did not complete: {e}"))
			})
		}
		.boxed()
		.shared();

		*slot = Some(shared.clone());

		shared
	}

	async fn run_refresh(&self) -> RefreshOutcome {
		let start = self.snapshot();
		let Some(record) = start.record.clone() else {
			return RefreshOutcome::PermanentFailure(Error::NotConfigured.to_string());
		};

		if record.is_invalidated() {
			return RefreshOutcome::PermanentFailure(Self::invalid_reason(&record));
		}

		self.0.metrics.record_attempt();
		obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Attempt);

		match self.call_provider(&record).await {
			Ok((replacement, rotated)) => {
				self.0.metrics.record_success();
				obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Success);
				events::refresh_succeeded(replacement.expires_at, rotated);

				let outcome = RefreshOutcome::Success(replacement.clone());

				self.commit(start.epoch, Some(replacement), outcome).await
			},
			Err(e) => {
				let permanent = e.is_permanent();
				let reason = e.to_string();

				self.0.metrics.record_failure();
				obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Failure);
				events::refresh_failed(&reason, permanent);

				if permanent {
					let mut invalid = record;

					invalid.invalidate(OffsetDateTime::now_utc(), reason.clone());

					self.commit(start.epoch, Some(invalid), RefreshOutcome::PermanentFailure(reason))
						.await
				} else {
					self.commit(start.epoch, None, RefreshOutcome::TransientFailure(reason)).await
				}
			},
		}
	}

	async fn call_provider(&self, record: &TokenRecord) -> Result<(TokenRecord, bool)> {
		let refresh_token = record.require_refresh_token()?;
		let call = self.0.refresher.refresh(refresh_token.expose());
		let grant = tokio::time::timeout(self.0.refresh_timeout.unsigned_abs(), call)
			.await
			.map_err(|_| TransientError::RefreshTimedOut { after: self.0.refresh_timeout })??;
		let rotated = grant.rotated();

		Ok((grant.into_record(record.refresh_token.clone())?, rotated))
	}

	/// Publishes the attempt's result unless an install superseded it, then persists any new
	/// record. Persist failures are flagged but never change the outcome.
	async fn commit(
		&self,
		base_epoch: u64,
		replacement: Option<TokenRecord>,
		outcome: RefreshOutcome,
	) -> RefreshOutcome {
		let _writer = self.0.writer.lock().await;
		let current = self.snapshot();

		if current.epoch != base_epoch {
			return current.last_outcome.clone().unwrap_or(outcome);
		}

		self.publish(|next| {
			if let Some(record) = &replacement {
				next.record = Some(record.clone());
			}

			next.epoch += 1;
			next.last_outcome = Some(outcome.clone());
		});

		if let Some(record) = replacement {
			// Already logged and flagged; the in-memory record stays authoritative.
			let _ = self.persist_record(record).await;
		}

		outcome
	}

	async fn persist_record(&self, record: TokenRecord) -> Result<()> {
		match self.0.store.save(record).await {
			Ok(()) => {
				self.0.persist_diverged.store(false, Ordering::SeqCst);

				Ok(())
			},
			Err(e) => {
				self.mark_diverged(&e);

				Err(e.into())
			},
		}
	}

	fn mark_diverged(&self, error: &dyn Display) {
		self.0.persist_diverged.store(true, Ordering::SeqCst);
		self.0.metrics.record_persist_failure();
		events::persist_failed(error);
	}

	fn resolve(&self, outcome: RefreshOutcome, force: bool) -> Result<TokenSnapshot> {
		match outcome {
			RefreshOutcome::Success(record) => Ok((&record).into()),
			RefreshOutcome::PermanentFailure(reason) => Err(Error::Reauthorize { reason }),
			RefreshOutcome::TransientFailure(reason) => {
				let snap = self.snapshot();
				let record = Self::usable_record(&snap)?;

				if !force && !auth::is_expired(record, OffsetDateTime::now_utc()) {
					events::stale_token_served(record.expires_at, &reason);

					return Ok(record.into());
				}

				Err(TransientError::Refresh { reason }.into())
			},
		}
	}
}
impl Debug for TokenKeeper {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenKeeper").field("status", &self.status()).finish()
	}
}

/// Empties the refresh slot when the refresh task ends, including by panic or abort.
struct ClearInFlight(TokenKeeper);
impl Drop for ClearInFlight {
	fn drop(&mut self) {
		self.0.0.in_flight.lock().take();
	}
}
