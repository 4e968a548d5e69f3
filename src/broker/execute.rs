//! Authenticated request execution with a single retry after re-authentication.

// crates.io
use http::StatusCode;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	broker::{SessionBroker, renewal::Lease},
	http::{self as transport, CasHttpClient, HttpRequest, HttpResponse},
	obs::{self, FlowKind},
	store::{FetchProcess, SwapOutcome},
};

impl<C> SessionBroker<C>
where
	C: ?Sized + CasHttpClient,
{
	/// Sends `request` with the current session, renewing it once if the target rejects it.
	///
	/// A rejection is `401`, or a `302` to the CAS login page when
	/// [`refresh_on_login_redirect`](crate::config::CasConfig::refresh_on_login_redirect) is on.
	/// After one rejection the session and ticket-granting ticket are renewed and the request
	/// is sent again; a second rejection fails with [`Error::AuthenticationFailed`]. A
	/// successful response on a reused session extends that session's estimated expiry.
	pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
		let url = transport::redacted_url(request.uri());

		obs::observe(FlowKind::Execute, "execute", self.principal().name(), async {
			let lease = self.session_lease().await?;
			let response = self.send_with_session(&request, &lease.credential).await?;

			if !self.protocol.is_rejection(&response) {
				if lease.reused {
					self.extend_session(&lease, response.status());
				}

				return Ok(response);
			}

			self.metrics.record_retry();
			obs::log!(
				warn,
				"Request to {url} was rejected with status {}; renewing the session and retrying once.",
				response.status()
			);

			let lease = self.renew_rejected(&lease).await?;
			let response = self.send_with_session(&request, &lease.credential).await?;

			self.ensure_accepted(url.as_str(), response)
		})
		.await
	}

	/// Sends `request` authenticated by a freshly issued service ticket instead of a session.
	///
	/// The ticket travels as the `ticket` query parameter, or in
	/// [`service_ticket_header`](crate::config::CasConfig::service_ticket_header) when set.
	/// A rejection renews the ticket-granting ticket and retries once; a second rejection fails
	/// with [`Error::AuthenticationFailed`].
	pub async fn execute_with_service_ticket(&self, request: HttpRequest) -> Result<HttpResponse> {
		let url = transport::redacted_url(request.uri());

		obs::observe(
			FlowKind::ExecuteWithServiceTicket,
			"execute_with_service_ticket",
			self.principal().name(),
			async {
				let response = self.send_with_service_ticket(&request, false).await?;

				if !self.protocol.is_rejection(&response) {
					return Ok(response);
				}

				self.metrics.record_retry();
				obs::log!(
					warn,
					"Request to {url} with a service ticket was rejected with status {}; retrying once.",
					response.status()
				);

				let response = self.send_with_service_ticket(&request, true).await?;

				self.ensure_accepted(url.as_str(), response)
			},
		)
		.await
	}

	async fn send_with_session(
		&self,
		template: &HttpRequest,
		session: &Credential,
	) -> Result<HttpResponse> {
		let mut request = transport::duplicate_request(template);

		self.protocol.attach_session(&mut request, session)?;
		self.protocol.decorate(&mut request)?;

		self.protocol.send(request).await
	}

	async fn send_with_service_ticket(
		&self,
		template: &HttpRequest,
		force_ticket_granting_ticket: bool,
	) -> Result<HttpResponse> {
		let ticket = self.service_ticket(force_ticket_granting_ticket).await?;
		let mut request = transport::duplicate_request(template);

		self.protocol.attach_service_ticket(&mut request, ticket.expose())?;
		self.protocol.decorate(&mut request)?;

		self.protocol.send(request).await
	}

	fn ensure_accepted(&self, url: &str, response: HttpResponse) -> Result<HttpResponse> {
		if self.protocol.is_rejection(&response) {
			self.metrics.record_authentication_failure();

			return Err(Error::AuthenticationFailed {
				url: url.to_owned(),
				status: response.status().as_u16(),
			});
		}

		Ok(response)
	}

	fn extend_session(&self, lease: &Lease, status: StatusCode) {
		if !matches!(status, StatusCode::OK | StatusCode::CREATED) {
			return;
		}

		let extended = match lease
			.credential
			.extended_at(OffsetDateTime::now_utc(), self.config().validity.session)
		{
			Ok(extended) => extended,
			Err(e) => {
				obs::log!(debug, "Skipping session extension: {e}.");

				return;
			},
		};

		match self.session.compare_and_swap(Some(&lease.process), FetchProcess::ready(extended)) {
			SwapOutcome::Swapped => self.metrics.record_session_extension(),
			SwapOutcome::Lost => {
				obs::log!(debug, "Session was replaced concurrently; skipping the extension.");
			},
		}
	}
}
