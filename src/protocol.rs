//! CAS REST protocol client: ticket-granting ticket, service ticket, and session cookie steps.
//!
//! Each step is a single request with no retries; callers decide how failures cascade.
//! The response parsers are plain functions so the blocking cookie loader can share them.

// crates.io
use http::{
	HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
	header::{CONTENT_TYPE, LOCATION},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialKind, Principal, Secret},
	config::CasConfig,
	error::{ConfigError, body_preview},
	http::{self as transport, CasHttpClient, HttpRequest, HttpResponse},
	obs::{self, FlowKind},
};

/// Header carrying the caller identifier.
pub const CALLER_ID_HEADER: &str = "caller-id";
/// Header carrying the CSRF value (the same value is also sent as the `CSRF` cookie).
pub const CSRF_HEADER: &str = "csrf";
/// Cookie carrying the CSRF value.
pub const CSRF_COOKIE: &str = "CSRF";
/// Query parameter carrying service tickets.
pub const TICKET_PARAM: &str = "ticket";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Performs the three CAS network steps for one principal against one target service.
pub struct CasProtocolClient<C>
where
	C: ?Sized + CasHttpClient,
{
	http_client: Arc<C>,
	config: Arc<CasConfig>,
	principal: Principal,
}
impl<C> CasProtocolClient<C>
where
	C: ?Sized + CasHttpClient,
{
	/// Creates a protocol client sharing `http_client` and `config`.
	pub fn new(http_client: impl Into<Arc<C>>, config: impl Into<Arc<CasConfig>>, principal: Principal) -> Self {
		Self { http_client: http_client.into(), config: config.into(), principal }
	}

	/// Config the client was built with.
	pub fn config(&self) -> &CasConfig {
		&self.config
	}

	/// Principal the client authenticates as.
	pub fn principal(&self) -> &Principal {
		&self.principal
	}

	/// Exchanges the principal's username and password for a ticket-granting ticket.
	///
	/// Expects `201 Created` with a `Location` whose last path segment is the ticket id.
	/// Proxy principals have no ticket-granting ticket and fail with [`Error::ProxyTicket`].
	pub async fn fetch_ticket_granting_ticket(&self) -> Result<Credential> {
		let Principal::Password { username, password } = &self.principal else {
			return Err(Error::ProxyTicket {
				target_service: self.config.service_ticket_service(),
				reason: "proxy principals authenticate with proxy tickets only".into(),
			});
		};

		obs::observe(FlowKind::TicketGrantingTicket, "fetch_ticket_granting_ticket", username, async {
			let url = self.config.tickets_url();
			let request = self.form_request(&url, &ticket_granting_ticket_form(username, password))?;
			let response = self.send(request).await?;
			let ticket = parse_ticket_granting_ticket(
				&url,
				response.status(),
				response.headers(),
				response.body(),
			)?;

			obs::log!(debug, "Received a ticket-granting ticket for {username}.");

			Ok(Credential::issue(
				CredentialKind::TicketGrantingTicket,
				ticket,
				self.config.validity.ticket_granting_ticket,
			)?)
		})
		.await
	}

	/// Exchanges `ticket_granting_ticket` for a service ticket scoped to the target service.
	///
	/// Expects `200 OK`; the trimmed body is the ticket.
	pub async fn fetch_service_ticket(&self, ticket_granting_ticket: &Credential) -> Result<Credential> {
		obs::observe(FlowKind::ServiceTicket, "fetch_service_ticket", self.principal.name(), async {
			let url = self.config.ticket_granting_ticket_url(ticket_granting_ticket.expose());
			let service = self.config.service_ticket_service();
			let request = self.form_request(&url, &[("service", service.as_str())])?;
			let response = self.send(request).await?;
			let ticket = parse_service_ticket(
				&redacted_ticket_url(&self.config),
				response.status(),
				response.body(),
			)?;

			Ok(Credential::issue(CredentialKind::ServiceTicket, ticket, self.config.validity.service_ticket)?)
		})
		.await
	}

	/// Asks the proxy principal's ticket source for a proxy ticket scoped to the target service.
	///
	/// Password principals fail with [`Error::ProxyTicket`].
	pub async fn fetch_proxy_ticket(&self) -> Result<Credential> {
		let service = self.config.service_ticket_service();
		let Principal::Proxy { name, source } = &self.principal else {
			return Err(Error::ProxyTicket {
				target_service: service,
				reason: "password principals authenticate with ticket-granting tickets".into(),
			});
		};

		obs::observe(FlowKind::ServiceTicket, "fetch_proxy_ticket", name, async {
			let ticket = source.proxy_ticket_for(&service).await?;

			if ticket.trim().is_empty() {
				return Err(Error::ProxyTicket {
					target_service: service.clone(),
					reason: "the ticket source returned an empty ticket".into(),
				});
			}

			Ok(Credential::issue(
				CredentialKind::ServiceTicket,
				ticket.trim(),
				self.config.validity.service_ticket,
			)?)
		})
		.await
	}

	/// Redeems `service_ticket` at the session URL and extracts the session cookie.
	pub async fn fetch_session_token(&self, service_ticket: &Credential) -> Result<Credential> {
		obs::observe(FlowKind::Session, "fetch_session_token", self.principal.name(), async {
			let mut request = http::Request::builder()
				.method(Method::GET)
				.uri(self.config.session_url.as_str())
				.body(Vec::new())?;

			self.attach_service_ticket(&mut request, service_ticket.expose())?;
			self.decorate(&mut request)?;

			let response = self.send(request).await?;
			let set_cookies = transport::set_cookie_values(response.headers());
			let Some(value) = transport::find_cookie(&set_cookies, &self.config.session_cookie_name)
			else {
				return Err(Error::MissingSessionCookie {
					cookie_name: self.config.session_cookie_name.clone(),
					url: transport::redacted_url(&session_uri(&self.config)?),
					status: response.status().as_u16(),
					set_cookies,
					body: body_preview(response.body()),
				});
			};

			obs::log!(debug, "Opened a {} session.", self.config.session_cookie_name);

			Ok(Credential::issue(CredentialKind::Session, value, self.config.validity.session)?)
		})
		.await
	}

	/// Adds the `Caller-Id` header, the `CSRF` header, and the `CSRF` cookie.
	pub fn decorate(&self, request: &mut HttpRequest) -> Result<()> {
		let headers = request.headers_mut();

		headers.insert(CALLER_ID_HEADER, header_value(&self.config.caller_id)?);
		headers.insert(CSRF_HEADER, header_value(&self.config.csrf)?);

		transport::upsert_cookie(headers, CSRF_COOKIE, &self.config.csrf)
	}

	/// Attaches `session` as the configured session cookie.
	pub fn attach_session(&self, request: &mut HttpRequest, session: &Credential) -> Result<()> {
		transport::upsert_cookie(
			request.headers_mut(),
			&self.config.session_cookie_name,
			session.expose(),
		)
	}

	/// Attaches a service ticket as the configured header, or as the `ticket` query parameter.
	pub fn attach_service_ticket(&self, request: &mut HttpRequest, ticket: &str) -> Result<()> {
		match self.config.service_ticket_header.as_deref() {
			Some(name) => {
				let name = HeaderName::from_bytes(name.as_bytes()).map_err(ConfigError::http_request)?;

				request.headers_mut().insert(name, header_value(ticket)?);
			},
			None => append_query_param(request, TICKET_PARAM, ticket)?,
		}

		Ok(())
	}

	/// Returns `true` when the target rejected the request's credentials.
	///
	/// A rejection is `401`, or (when enabled) a `302` to the CAS login page for this service.
	pub fn is_rejection(&self, response: &HttpResponse) -> bool {
		match response.status() {
			StatusCode::UNAUTHORIZED => true,
			StatusCode::FOUND => {
				let location = response.headers().get(LOCATION).and_then(|v| v.to_str().ok());
				let login = self.config.login_redirect_location();

				if self.config.refresh_on_login_redirect && location == Some(login.as_str()) {
					true
				} else {
					obs::log!(
						debug,
						"Passing through a redirect to {} that is not the CAS login page.",
						location.unwrap_or("<missing>")
					);

					false
				}
			},
			_ => false,
		}
	}

	/// Sends `request` through the transport unchanged.
	pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
		self.http_client.execute(request).await
	}

	fn form_request(&self, url: &str, pairs: &[(&str, &str)]) -> Result<HttpRequest> {
		let mut request = http::Request::builder()
			.method(Method::POST)
			.uri(url)
			.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
			.body(transport::form_body(pairs))?;

		self.decorate(&mut request)?;

		Ok(request)
	}
}
impl<C> Clone for CasProtocolClient<C>
where
	C: ?Sized + CasHttpClient,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			config: self.config.clone(),
			principal: self.principal.clone(),
		}
	}
}
impl<C> Debug for CasProtocolClient<C>
where
	C: ?Sized + CasHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CasProtocolClient")
			.field("cas_url", &self.config.cas_url.as_str())
			.field("service_url", &self.config.service_url.as_str())
			.field("principal", &self.principal)
			.finish()
	}
}

/// Form pairs of the ticket-granting ticket request.
pub(crate) fn ticket_granting_ticket_form<'a>(
	username: &'a str,
	password: &'a Secret,
) -> [(&'a str, &'a str); 2] {
	[("username", username), ("password", password.expose())]
}

/// Extracts the ticket-granting ticket id from a `POST /v1/tickets` response.
pub(crate) fn parse_ticket_granting_ticket(
	url: &str,
	status: StatusCode,
	headers: &HeaderMap,
	body: &[u8],
) -> Result<String> {
	let failure = |reason: &str| Error::TicketGrantingTicket {
		url: url.to_owned(),
		status: status.as_u16(),
		reason: reason.to_owned(),
		body: body_preview(body),
	};

	if status != StatusCode::CREATED {
		return Err(failure("expected 201 Created"));
	}

	let location = headers
		.get(LOCATION)
		.and_then(|v| v.to_str().ok())
		.ok_or_else(|| failure("the Location header is missing"))?;
	let ticket = location
		.split(['?', '#'])
		.next()
		.and_then(|path| path.trim_end_matches('/').rsplit('/').next())
		.filter(|segment| !segment.is_empty())
		.ok_or_else(|| failure("the Location header has no ticket segment"))?;

	Ok(ticket.to_owned())
}

/// Extracts the service ticket from a `POST /v1/tickets/{tgt}` response.
pub(crate) fn parse_service_ticket(url: &str, status: StatusCode, body: &[u8]) -> Result<String> {
	let ticket = String::from_utf8_lossy(body).trim().to_owned();

	if status != StatusCode::OK || ticket.is_empty() {
		return Err(Error::ServiceTicket {
			url: url.to_owned(),
			status: status.as_u16(),
			body: body_preview(body),
		});
	}

	Ok(ticket)
}

/// Ticket endpoint URL with the ticket-granting ticket id masked.
pub(crate) fn redacted_ticket_url(config: &CasConfig) -> String {
	config.ticket_granting_ticket_url("<tgt>")
}

/// Appends `name=value` to the request URI's query string.
pub(crate) fn append_query_param(request: &mut HttpRequest, name: &str, value: &str) -> Result<()> {
	let mut url = Url::parse(&request.uri().to_string()).map_err(ConfigError::http_request)?;

	url.query_pairs_mut().append_pair(name, value);

	*request.uri_mut() = url.as_str().parse().map_err(ConfigError::http_request)?;

	Ok(())
}

fn session_uri(config: &CasConfig) -> Result<http::Uri> {
	config.session_url.as_str().parse().map_err(|e| ConfigError::http_request(e).into())
}

fn header_value(value: &str) -> Result<HeaderValue> {
	HeaderValue::from_str(value).map_err(|e| ConfigError::http_request(e).into())
}
