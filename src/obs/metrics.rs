// std
use std::time::Duration as StdDuration;
// self
use crate::obs::{FlowKind, FlowOutcome};

/// Counter of flow attempts and their outcomes, labeled by `flow` and `outcome`.
pub const FLOW_TOTAL: &str = "cas_broker_flow_total";
/// Histogram of completed flow durations in seconds, labeled by `flow` and `outcome`.
pub const FLOW_DURATION_SECONDS: &str = "cas_broker_flow_duration_seconds";
/// Counter of cookie-cache removals, labeled by `cause`.
pub const COOKIE_CACHE_REMOVALS_TOTAL: &str = "cas_broker_cookie_cache_removals_total";

/// Counts one `outcome` of `kind` with the global recorder.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(FLOW_TOTAL, "flow" => kind.as_str(), "outcome" => outcome.as_str())
			.increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records how long a finished flow took.
pub fn record_flow_duration(kind: FlowKind, outcome: FlowOutcome, elapsed: StdDuration) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!(
			FLOW_DURATION_SECONDS,
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.record(elapsed.as_secs_f64());
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome, elapsed);
	}
}

/// Counts a cookie-cache entry leaving the cache for `cause` (`expired`, `size`, `explicit`).
pub fn record_cookie_cache_removal(cause: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(COOKIE_CACHE_REMOVALS_TOTAL, "cause" => cause).increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = cause;
	}
}
