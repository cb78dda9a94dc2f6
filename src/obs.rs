//! Optional observability helpers for the keeper.
//!
//! # Feature Flags
//!
//! - `tracing` (default) wraps each operation in a span named `oauth2_keeper.flow` with `flow`
//!   and `stage` fields, and emits the structured events in [`events`].
//! - `metrics` increments the `oauth2_keeper_flow_total` counter for every attempt, success and
//!   failure, labeled by `flow` + `outcome`.

pub mod events;

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the keeper.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Shared refresh against the token endpoint.
	Refresh,
	/// One background scheduler tick.
	ScheduledTick,
	/// Authenticated call to the protected API.
	ApiCall,
	/// Authorization code exchange producing the initial record.
	AuthorizationCode,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Refresh => "refresh",
			Self::ScheduledTick => "scheduled_tick",
			Self::ApiCall => "api_call",
			Self::AuthorizationCode => "authorization_code",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Attempt => "attempt",
			Self::Success => "success",
			Self::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
