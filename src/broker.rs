//! Session broker: one ticket-granting ticket slot and one session slot shared by every caller
//! of a broker instance.
//!
//! A broker is scoped to one principal and one target service. Sessions are fetched lazily,
//! reused while their estimated validity lasts, renewed through the ticket-granting ticket
//! (which is itself renewed when CAS rejects it), and replaced only by compare-and-swap
//! against the exact fetch a caller observed.

pub mod metrics;

mod execute;
mod renewal;

pub use metrics::*;

// self
use crate::{
	_prelude::*,
	auth::{Credential, Principal},
	config::CasConfig,
	http::CasHttpClient,
	protocol::CasProtocolClient,
	store::SingleFlightStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport.
pub type ReqwestSessionBroker = SessionBroker<ReqwestHttpClient>;

/// Authenticated-request executor for one CAS principal and one target service.
///
/// Clones share the same slots and metrics.
pub struct SessionBroker<C>
where
	C: ?Sized + CasHttpClient,
{
	protocol: CasProtocolClient<C>,
	ticket_granting_ticket: Arc<SingleFlightStore<Credential>>,
	session: Arc<SingleFlightStore<Credential>>,
	metrics: Arc<BrokerMetrics>,
}
impl<C> SessionBroker<C>
where
	C: ?Sized + CasHttpClient,
{
	/// Creates a broker that reuses the caller-provided transport.
	pub fn with_http_client(
		config: CasConfig,
		principal: Principal,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		Self {
			protocol: CasProtocolClient::new(http_client, config, principal),
			ticket_granting_ticket: Arc::new(SingleFlightStore::new("ticket-granting ticket")),
			session: Arc::new(SingleFlightStore::new("session")),
			metrics: Default::default(),
		}
	}

	/// Config the broker was built with.
	pub fn config(&self) -> &CasConfig {
		self.protocol.config()
	}

	/// Principal the broker authenticates as.
	pub fn principal(&self) -> &Principal {
		self.protocol.principal()
	}

	/// Counters describing the work performed so far.
	pub fn metrics(&self) -> &BrokerMetrics {
		&self.metrics
	}

	/// Drops the cached session so the next call opens a new one.
	///
	/// Callers already waiting on an in-flight session fetch still receive its outcome.
	pub fn invalidate_session(&self) {
		if self.session.clear().is_some() {
			crate::obs::log!(debug, "Session of {} invalidated.", self.principal().name());
		}
	}

	/// Drops the cached ticket-granting ticket so the next renewal authenticates again.
	pub fn invalidate_ticket_granting_ticket(&self) {
		if self.ticket_granting_ticket.clear().is_some() {
			crate::obs::log!(
				debug,
				"Ticket-granting ticket of {} invalidated.",
				self.principal().name()
			);
		}
	}
}
#[cfg(feature = "reqwest")]
impl SessionBroker<ReqwestHttpClient> {
	/// Creates a broker with its own reqwest transport built from `config.transport`.
	///
	/// The config is validated again, since deserialized configs skip the builder.
	pub fn new(config: CasConfig, principal: Principal) -> Result<Self> {
		config.validate()?;

		let http_client = ReqwestHttpClient::from_timeouts(&config.transport)?;

		Ok(Self::with_http_client(config, principal, http_client))
	}
}
impl<C> Clone for SessionBroker<C>
where
	C: ?Sized + CasHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			protocol: self.protocol.clone(),
			ticket_granting_ticket: self.ticket_granting_ticket.clone(),
			session: self.session.clone(),
			metrics: self.metrics.clone(),
		}
	}
}
impl<C> Debug for SessionBroker<C>
where
	C: ?Sized + CasHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBroker")
			.field("protocol", &self.protocol)
			.field("ticket_granting_ticket", &self.ticket_granting_ticket)
			.field("session", &self.session)
			.finish()
	}
}
