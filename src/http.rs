//! Transport primitives for CAS and target-service requests.
//!
//! The module exposes [`CasHttpClient`], the broker's only dependency on an HTTP stack, plus
//! the cookie and header helpers the protocol client uses to decorate requests. Requests and
//! responses are plain [`http`] values with in-memory bodies so fakes can script exchanges
//! without a network.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use http::{
	HeaderMap, HeaderValue, Uri,
	header::{COOKIE, SET_COOKIE},
};
use url::form_urlencoded;
// self
use crate::{_prelude::*, error::ConfigError};
#[cfg(feature = "reqwest")]
use crate::{config::TransportTimeouts, error::TransportError};

/// Request sent through a [`CasHttpClient`].
pub type HttpRequest = http::Request<Vec<u8>>;
/// Response returned by a [`CasHttpClient`].
pub type HttpResponse = http::Response<Vec<u8>>;
/// Boxed future returned by [`CasHttpClient::execute`].
pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse>> + 'a + Send>>;

/// Abstraction over HTTP transports used by [`SessionBroker`](crate::broker::SessionBroker).
///
/// Implementations must not follow redirects (a `302` to the CAS login page is a rejection
/// signal) and must not keep a cookie jar: every request already carries the exact `Cookie`
/// header the broker wants sent. Transport failures map to
/// [`TransportError`](crate::error::TransportError); HTTP error statuses are ordinary responses.
pub trait CasHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and buffers the whole response body.
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Build it through [`ReqwestHttpClient::from_timeouts`] to get the required redirect and cookie
/// settings; a client passed to [`ReqwestHttpClient::with_client`] must disable redirect
/// following itself.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client with the given timeouts, no redirect following, and no cookie store.
	pub fn from_timeouts(timeouts: &TransportTimeouts) -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.connect_timeout(timeouts.connect)
			.timeout(timeouts.read)
			.build()
			.map_err(ConfigError::http_client_build)?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl CasHttpClient for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_> {
		Box::pin(async move {
			let url = redacted_url(request.uri());
			let request = reqwest::Request::try_from(request).map_err(ConfigError::http_request)?;
			let response =
				self.0.execute(request).await.map_err(|e| map_reqwest_error(&url, e))?;
			let status = response.status();
			let version = response.version();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(|e| map_reqwest_error(&url, e))?;
			let mut response_new = HttpResponse::new(body.to_vec());

			*response_new.status_mut() = status;
			*response_new.version_mut() = version;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

#[cfg(feature = "reqwest")]
pub(crate) fn map_reqwest_error(url: &str, e: ReqwestError) -> Error {
	if e.is_timeout() {
		TransportError::Timeout { url: url.to_owned() }.into()
	} else if e.is_builder() {
		ConfigError::http_request(e).into()
	} else {
		TransportError::network(url, e).into()
	}
}

/// Renders `uri` without its query so tickets never reach logs or errors.
pub(crate) fn redacted_url(uri: &Uri) -> String {
	match (uri.scheme_str(), uri.authority()) {
		(Some(scheme), Some(authority)) => format!("{scheme}://{authority}{}", uri.path()),
		_ => uri.path().to_owned(),
	}
}

/// Encodes `pairs` as an `application/x-www-form-urlencoded` body.
pub(crate) fn form_body(pairs: &[(&str, &str)]) -> Vec<u8> {
	form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish().into_bytes()
}

/// Adds `name=value` to the request's `Cookie` header, replacing any cookie of the same name.
pub(crate) fn upsert_cookie(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
	let mut pairs = headers
		.get_all(COOKIE)
		.iter()
		.filter_map(|header| header.to_str().ok())
		.flat_map(|header| header.split(';'))
		.map(str::trim)
		.filter(|pair| !pair.is_empty())
		.filter(|pair| pair.split_once('=').map_or(*pair, |(n, _)| n.trim()) != name)
		.map(str::to_owned)
		.collect::<Vec<_>>();

	pairs.push(cookie::Cookie::new(name, value).stripped().to_string());

	let header = HeaderValue::from_str(&pairs.join("; ")).map_err(ConfigError::http_request)?;

	headers.insert(COOKIE, header);

	Ok(())
}

/// Collects every `Set-Cookie` header value verbatim.
pub(crate) fn set_cookie_values(headers: &HeaderMap) -> Vec<String> {
	headers
		.get_all(SET_COOKIE)
		.iter()
		.filter_map(|header| header.to_str().ok())
		.map(str::to_owned)
		.collect()
}

/// Finds the value of cookie `name` among raw `Set-Cookie` values.
pub(crate) fn find_cookie(set_cookies: &[String], name: &str) -> Option<String> {
	set_cookies
		.iter()
		.filter_map(|raw| cookie::Cookie::parse(raw.as_str()).ok())
		.find(|cookie| cookie.name() == name && !cookie.value().is_empty())
		.map(|cookie| cookie.value().to_owned())
}

/// Copies a request so it can be resent; extensions are not carried over.
pub(crate) fn duplicate_request(request: &HttpRequest) -> HttpRequest {
	let mut copy = HttpRequest::new(request.body().clone());

	*copy.method_mut() = request.method().clone();
	*copy.uri_mut() = request.uri().clone();
	*copy.version_mut() = request.version();
	*copy.headers_mut() = request.headers().clone();

	copy
}
