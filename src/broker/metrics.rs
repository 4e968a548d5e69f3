//! Counters of the network work a session broker performed.

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing the network work a [`SessionBroker`](super::SessionBroker)
/// performed.
///
/// Fetch counters increment when a fetch actually runs, so callers that joined a shared
/// in-flight fetch do not inflate them.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
	ticket_granting_ticket_fetches: AtomicU64,
	service_ticket_fetches: AtomicU64,
	session_fetches: AtomicU64,
	retries: AtomicU64,
	session_extensions: AtomicU64,
	authentication_failures: AtomicU64,
}
impl BrokerMetrics {
	/// Returns the number of ticket-granting ticket requests sent to CAS.
	pub fn ticket_granting_ticket_fetches(&self) -> u64 {
		self.ticket_granting_ticket_fetches.load(Ordering::Relaxed)
	}

	/// Returns the number of service (or proxy) ticket requests.
	pub fn service_ticket_fetches(&self) -> u64 {
		self.service_ticket_fetches.load(Ordering::Relaxed)
	}

	/// Returns the number of session renewals that ran.
	pub fn session_fetches(&self) -> u64 {
		self.session_fetches.load(Ordering::Relaxed)
	}

	/// Returns the number of requests retried after a rejection.
	pub fn retries(&self) -> u64 {
		self.retries.load(Ordering::Relaxed)
	}

	/// Returns the number of successful session expiry extensions.
	pub fn session_extensions(&self) -> u64 {
		self.session_extensions.load(Ordering::Relaxed)
	}

	/// Returns the number of calls that ended in
	/// [`Error::AuthenticationFailed`](crate::error::Error::AuthenticationFailed).
	pub fn authentication_failures(&self) -> u64 {
		self.authentication_failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_ticket_granting_ticket_fetch(&self) {
		self.ticket_granting_ticket_fetches.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_service_ticket_fetch(&self) {
		self.service_ticket_fetches.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_session_fetch(&self) {
		self.session_fetches.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_retry(&self) {
		self.retries.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_session_extension(&self) {
		self.session_extensions.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_authentication_failure(&self) {
		self.authentication_failures.fetch_add(1, Ordering::Relaxed);
	}
}
