//! Session and ticket-granting ticket renewal cascade.

// std
use std::ptr;
// crates.io
use futures::{FutureExt, future::BoxFuture};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind},
	broker::{BrokerMetrics, SessionBroker},
	http::CasHttpClient,
	obs,
	protocol::CasProtocolClient,
	store::{FetchProcess, SingleFlightStore},
};

type CredentialFetch = BoxFuture<'static, Result<Credential>>;

/// A credential together with the slot process that produced it.
pub(crate) struct Lease {
	pub(crate) process: Arc<FetchProcess<Credential>>,
	pub(crate) credential: Credential,
	/// `true` when the credential was cached before this call observed it.
	pub(crate) reused: bool,
}

impl<C> SessionBroker<C>
where
	C: ?Sized + CasHttpClient,
{
	/// Returns the cached session while it is valid, otherwise renews it.
	///
	/// Concurrent callers share one renewal. A caller that joins a fetch already in flight
	/// receives that fetch's outcome, success or failure.
	pub async fn get_session(&self) -> Result<Credential> {
		Ok(self.session_lease().await?.credential)
	}

	/// Renews the session now, replacing the session this call observed.
	///
	/// With `force_ticket_granting_ticket` the ticket-granting ticket is fetched again too.
	/// When another caller already replaced the observed session, that replacement is
	/// returned instead of starting a second renewal.
	pub async fn renew_session(&self, force_ticket_granting_ticket: bool) -> Result<Credential> {
		let observed = self.session.current();

		Ok(self.renew_from(observed.as_ref(), force_ticket_granting_ticket).await?.credential)
	}

	pub(crate) async fn session_lease(&self) -> Result<Lease> {
		let Some(current) = self.session.current() else {
			let process = self.session.get_or_start(|| self.session_fetch(false));
			let credential = process.outcome().await?;

			return Ok(Lease { process, credential, reused: false });
		};

		match current.peek() {
			Some(Ok(credential)) if credential.is_valid() =>
				Ok(Lease { process: current, credential, reused: true }),
			Some(Ok(_)) => {
				obs::log!(debug, "Cached session of {} expired; renewing.", self.principal().name());

				self.renew_from(Some(&current), false).await
			},
			Some(Err(_)) => self.renew_from(Some(&current), false).await,
			None => {
				let credential = current.outcome().await?;

				Ok(Lease { process: current, credential, reused: false })
			},
		}
	}

	pub(crate) async fn renew_from(
		&self,
		expected: Option<&Arc<FetchProcess<Credential>>>,
		force_ticket_granting_ticket: bool,
	) -> Result<Lease> {
		let process =
			self.session.replace(expected, || self.session_fetch(force_ticket_granting_ticket));
		let credential = process.outcome().await?;

		Ok(Lease { process, credential, reused: false })
	}

	/// Renews the session after the target rejected `rejected`, forcing a new ticket-granting
	/// ticket.
	///
	/// Any slot process still carrying the rejected token is replaced, including an extension
	/// another caller installed after a successful response on that same session. A different
	/// session, or a renewal already in flight, is joined.
	pub(crate) async fn renew_rejected(&self, rejected: &Lease) -> Result<Lease> {
		let token = rejected.credential.expose();
		let process = self.session.replace_stale(
			|current| {
				ptr::eq(current, Arc::as_ptr(&rejected.process))
					|| match current.peek() {
						Some(Ok(credential)) => credential.expose() == token,
						Some(Err(_)) => true,
						None => false,
					}
			},
			|| self.session_fetch(true),
		);
		let credential = process.outcome().await?;

		Ok(Lease { process, credential, reused: false })
	}

	/// Fetches a service ticket (or proxy ticket) for one-off use by the caller.
	pub(crate) async fn service_ticket(&self, force_ticket_granting_ticket: bool) -> Result<Credential> {
		if self.principal().is_proxy() {
			self.metrics.record_service_ticket_fetch();

			return self.protocol.fetch_proxy_ticket().await;
		}

		fetch_service_ticket(
			&self.protocol,
			&self.ticket_granting_ticket,
			&self.metrics,
			force_ticket_granting_ticket,
		)
		.await
	}

	fn session_fetch(&self, force_ticket_granting_ticket: bool) -> CredentialFetch {
		let protocol = self.protocol.clone();
		let ticket_granting_ticket = self.ticket_granting_ticket.clone();
		let metrics = self.metrics.clone();

		async move {
			metrics.record_session_fetch();

			let service_ticket = if protocol.principal().is_proxy() {
				metrics.record_service_ticket_fetch();
				protocol.fetch_proxy_ticket().await?
			} else {
				fetch_service_ticket(
					&protocol,
					&ticket_granting_ticket,
					&metrics,
					force_ticket_granting_ticket,
				)
				.await?
			};

			protocol.fetch_session_token(&service_ticket).await
		}
		.map(|result| result.map_err(|e| e.renewal(CredentialKind::Session)))
		.boxed()
	}
}

/// Exchanges a (cached or fresh) ticket-granting ticket for a service ticket.
///
/// When CAS refuses a ticket-granting ticket that came from the cache, the ticket-granting
/// ticket is renewed exactly once and the exchange is repeated.
async fn fetch_service_ticket<C>(
	protocol: &CasProtocolClient<C>,
	store: &Arc<SingleFlightStore<Credential>>,
	metrics: &Arc<BrokerMetrics>,
	force: bool,
) -> Result<Credential>
where
	C: ?Sized + CasHttpClient,
{
	let lease = ticket_granting_ticket_lease(protocol, store, metrics, force).await?;

	metrics.record_service_ticket_fetch();

	match protocol.fetch_service_ticket(&lease.credential).await {
		Err(Error::ServiceTicket { status, .. }) if lease.reused => {
			obs::log!(
				warn,
				"CAS refused the cached ticket-granting ticket of {} (status {status}); renewing it once.",
				protocol.principal().name()
			);

			let process =
				store.replace(Some(&lease.process), || ticket_granting_ticket_fetch(protocol, metrics));
			let ticket_granting_ticket = process
				.outcome()
				.await
				.map_err(|e| e.renewal(CredentialKind::TicketGrantingTicket))?;

			metrics.record_service_ticket_fetch();

			protocol.fetch_service_ticket(&ticket_granting_ticket).await
		},
		result => result,
	}
}

async fn ticket_granting_ticket_lease<C>(
	protocol: &CasProtocolClient<C>,
	store: &Arc<SingleFlightStore<Credential>>,
	metrics: &Arc<BrokerMetrics>,
	force: bool,
) -> Result<Lease>
where
	C: ?Sized + CasHttpClient,
{
	let fetch = || ticket_granting_ticket_fetch(protocol, metrics);
	let (process, reused) = match store.current() {
		None => (store.get_or_start(fetch), false),
		Some(current) => match current.peek() {
			Some(Ok(credential)) if !force && credential.is_valid() => (current, true),
			Some(_) => (store.replace(Some(&current), fetch), false),
			// Joining an in-flight fetch is as fresh as forcing one.
			None => (current, false),
		},
	};
	let credential =
		process.outcome().await.map_err(|e| e.renewal(CredentialKind::TicketGrantingTicket))?;

	Ok(Lease { process, credential, reused })
}

fn ticket_granting_ticket_fetch<C>(
	protocol: &CasProtocolClient<C>,
	metrics: &Arc<BrokerMetrics>,
) -> CredentialFetch
where
	C: ?Sized + CasHttpClient,
{
	let protocol = protocol.clone();
	let metrics = metrics.clone();

	async move {
		metrics.record_ticket_granting_ticket_fetch();

		protocol.fetch_ticket_granting_ticket().await
	}
	.boxed()
}
