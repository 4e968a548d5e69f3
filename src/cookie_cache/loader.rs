// crates.io
#[cfg(feature = "reqwest")]
use http::{HeaderMap, HeaderValue, header::CONTENT_TYPE};
#[cfg(feature = "reqwest")]
use reqwest::blocking::{Client as BlockingClient, Response as BlockingResponse};
// self
use crate::{_prelude::*, cookie_cache::CacheKey};
#[cfg(feature = "reqwest")]
use crate::{
	auth::{Principal, Secret},
	config::trim_base,
	cookie_cache::CookieCacheConfig,
	error::{ConfigError, body_preview},
	http::{self as transport, map_reqwest_error},
	protocol::{self, CALLER_ID_HEADER, CSRF_COOKIE, CSRF_HEADER, TICKET_PARAM},
};

/// Blocking source of authenticated session cookies, used by
/// [`BlockingUserCookieCache`](super::BlockingUserCookieCache) on cache misses.
pub trait CookieLoader
where
	Self: 'static + Send + Sync,
{
	/// Obtains a one-time ticket for `key.target_service()`.
	fn obtain_ticket(&self, key: &CacheKey) -> Result<String>;

	/// Redeems `ticket` at the target service and returns every `Set-Cookie` value.
	fn open_session(&self, key: &CacheKey, ticket: &str) -> Result<Vec<String>>;
}

/// [`CookieLoader`] talking to CAS and the target service over blocking reqwest.
///
/// Service accounts authenticate with `POST /v1/tickets` followed by a service-ticket request
/// for the target service; proxy principals ask their ticket source. Sessions are opened with
/// `GET {target}{session_init_path}&ticket=...` after stripping the security-check suffix.
/// Redirects are not followed, so cookies set by the ticket-redeeming response are kept.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct CasCookieLoader {
	client: BlockingClient,
	config: CookieCacheConfig,
}
#[cfg(feature = "reqwest")]
impl CasCookieLoader {
	/// Builds a loader with its own blocking client.
	pub fn new(config: CookieCacheConfig) -> Result<Self> {
		let client = BlockingClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.connect_timeout(config.transport.connect)
			.timeout(config.transport.read)
			.build()
			.map_err(ConfigError::http_client_build)?;

		Ok(Self::with_client(client, config))
	}

	/// Wraps an existing blocking client; it must not follow redirects.
	pub fn with_client(client: BlockingClient, config: CookieCacheConfig) -> Self {
		Self { client, config }
	}

	/// Config the loader was built with.
	pub fn config(&self) -> &CookieCacheConfig {
		&self.config
	}

	fn headers(&self) -> Result<HeaderMap> {
		let mut headers = HeaderMap::new();

		headers.insert(
			CALLER_ID_HEADER,
			HeaderValue::from_str(&self.config.caller_id).map_err(ConfigError::http_request)?,
		);
		headers.insert(
			CSRF_HEADER,
			HeaderValue::from_str(&self.config.csrf).map_err(ConfigError::http_request)?,
		);
		transport::upsert_cookie(&mut headers, CSRF_COOKIE, &self.config.csrf)?;

		Ok(headers)
	}

	fn post_form(&self, url: &str, pairs: &[(&str, &str)]) -> Result<BlockingResponse> {
		let mut headers = self.headers()?;

		headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-www-form-urlencoded"));

		self.client
			.post(url)
			.headers(headers)
			.body(transport::form_body(pairs))
			.send()
			.map_err(|e| map_reqwest_error(url, e))
	}

	fn service_ticket_for_service_user(
		&self,
		username: &str,
		password: &Secret,
		target_service: &str,
	) -> Result<String> {
		let tickets_url = format!("{}/v1/tickets", trim_base(&self.config.cas_url));
		let response =
			self.post_form(&tickets_url, &protocol::ticket_granting_ticket_form(username, password))?;
		let status = response.status();
		let headers = response.headers().to_owned();
		let body = response.bytes().map_err(|e| map_reqwest_error(&tickets_url, e))?;
		let ticket_granting_ticket =
			protocol::parse_ticket_granting_ticket(&tickets_url, status, &headers, &body)?;
		let response = self.post_form(
			&format!("{tickets_url}/{ticket_granting_ticket}"),
			&[("service", target_service)],
		)?;
		let status = response.status();
		let redacted = format!("{tickets_url}/<tgt>");
		let body = response.bytes().map_err(|e| map_reqwest_error(&redacted, e))?;

		protocol::parse_service_ticket(&redacted, status, &body)
	}

	fn session_url(&self, target_service: &str, ticket: &str) -> Result<Url> {
		let base = if self.config.security_check_suffix.is_empty() {
			target_service.to_owned()
		} else {
			target_service.replace(&self.config.security_check_suffix, "")
		};
		let mut url = Url::parse(&format!("{base}{}", self.config.session_init_path))
			.map_err(ConfigError::http_request)?;

		url.query_pairs_mut().append_pair(TICKET_PARAM, ticket);

		Ok(url)
	}
}
#[cfg(feature = "reqwest")]
impl CookieLoader for CasCookieLoader {
	fn obtain_ticket(&self, key: &CacheKey) -> Result<String> {
		match key.principal() {
			Principal::Password { username, password } =>
				self.service_ticket_for_service_user(username, password, key.target_service()),
			Principal::Proxy { source, .. } =>
				futures::executor::block_on(source.proxy_ticket_for(key.target_service())),
		}
	}

	fn open_session(&self, key: &CacheKey, ticket: &str) -> Result<Vec<String>> {
		let url = self.session_url(key.target_service(), ticket)?;
		let mut redacted = url.clone();

		redacted.set_query(None);

		let redacted = redacted.to_string();
		let response = self
			.client
			.get(url)
			.headers(self.headers()?)
			.send()
			.map_err(|e| map_reqwest_error(&redacted, e))?;
		let status = response.status();
		let cookies = transport::set_cookie_values(response.headers());

		if cookies.is_empty() {
			let body = response.bytes().map(|body| body_preview(&body)).unwrap_or_default();

			crate::obs::log!(
				warn,
				"Opening a session at {redacted} for {key} returned status {status} without cookies: {body}"
			);

			return Err(Error::NoSessionCookies { url: redacted, status: status.as_u16() });
		}

		Ok(cookies)
	}
}
