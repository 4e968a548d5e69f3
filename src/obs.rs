//! Optional observability helpers for broker flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `cas_broker.flow` with the `flow` (protocol
//!   step or broker operation) and `stage` (call site) fields, plus the crate's log events.
//! - Enable `metrics` to increment the `cas_broker_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// std
use std::time::Instant;
// self
use crate::_prelude::*;

/// Emits a log event through `tracing` when the feature is enabled.
///
/// Arguments are plain format arguments; without `tracing` they are type-checked and dropped.
macro_rules! log {
	($level:ident, $($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		{
			::tracing::$level!($($arg)+);
		}
		#[cfg(not(feature = "tracing"))]
		{
			if false {
				let _ = format!($($arg)+);
			}
		}
	}};
}
pub(crate) use log;

/// Broker flows observed by spans and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// `POST /v1/tickets` exchanging the principal's password for a ticket-granting ticket.
	TicketGrantingTicket,
	/// Service ticket (or proxy ticket) acquisition.
	ServiceTicket,
	/// Service ticket to session cookie exchange.
	Session,
	/// Session-authenticated request execution.
	Execute,
	/// Request execution authenticated by a bare service ticket.
	ExecuteWithServiceTicket,
	/// Blocking cookie-cache load.
	CookieLoad,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::TicketGrantingTicket => "ticket_granting_ticket",
			FlowKind::ServiceTicket => "service_ticket",
			FlowKind::Session => "session",
			FlowKind::Execute => "execute",
			FlowKind::ExecuteWithServiceTicket => "execute_with_service_ticket",
			FlowKind::CookieLoad => "cookie_load",
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
	/// Entry to a broker helper.
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
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records attempt plus success/failure around `fut`, instrumented with a flow span.
pub(crate) async fn observe<T, Fut>(
	kind: FlowKind,
	stage: &'static str,
	principal: &str,
	fut: Fut,
) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(kind, stage).with_principal(principal);
	let started = Instant::now();

	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;
	let outcome = if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

	span.record_outcome(outcome);
	record_flow_outcome(kind, outcome);
	record_flow_duration(kind, outcome, started.elapsed());

	if let Err(e) = &result {
		log!(debug, "The {kind} flow failed at {stage}: {e}.");
	}

	result
}
