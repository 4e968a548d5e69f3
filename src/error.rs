//! Broker-level error types shared across the protocol client, brokers, and caches.
//!
//! [`Error`] is `Clone` so a single failed fetch can be handed to every caller that observed
//! it; foreign sources are therefore held behind [`Arc`] instead of [`Box`].

// self
use crate::{
	_prelude::*,
	auth::{CredentialError, CredentialKind, IdentifierError},
	config::CasConfigError,
};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn StdError + Send + Sync>;

const BODY_PREVIEW_LIMIT: usize = 512;

/// Canonical broker error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeouts).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// CAS rejected the principal's credentials or answered the ticket request unexpectedly.
	#[error("CAS did not issue a ticket-granting ticket at {url} (status {status}): {reason}.")]
	TicketGrantingTicket {
		/// Ticket endpoint URL.
		url: String,
		/// HTTP status returned by CAS.
		status: u16,
		/// Short description of what was wrong with the response.
		reason: String,
		/// Truncated response body.
		body: String,
	},
	/// CAS refused to exchange the ticket-granting ticket for a service ticket.
	#[error("CAS did not issue a service ticket at {url} (status {status}).")]
	ServiceTicket {
		/// Ticket-granting ticket endpoint URL (the ticket id itself is omitted).
		url: String,
		/// HTTP status returned by CAS.
		status: u16,
		/// Truncated response body.
		body: String,
	},
	/// The target service answered the session request without the expected cookie.
	#[error("Session cookie `{cookie_name}` is missing from the response of {url} (status {status}).")]
	MissingSessionCookie {
		/// Name of the expected session cookie.
		cookie_name: String,
		/// Session endpoint URL without the ticket.
		url: String,
		/// HTTP status returned by the target service.
		status: u16,
		/// Every `Set-Cookie` value the response did carry.
		set_cookies: Vec<String>,
		/// Truncated response body.
		body: String,
	},
	/// Opening an authenticated session yielded no cookies at all.
	#[error("Opening an authenticated session at {url} returned no cookies (status {status}).")]
	NoSessionCookies {
		/// Session endpoint URL without the ticket.
		url: String,
		/// HTTP status returned by the target service.
		status: u16,
	},
	/// A proxy principal could not produce a proxy ticket.
	#[error("No proxy ticket is available for {target_service}: {reason}.")]
	ProxyTicket {
		/// Service the proxy ticket was requested for.
		target_service: String,
		/// Source-supplied reason.
		reason: String,
	},
	/// The target rejected the request again after the broker re-authenticated once.
	#[error("Request to {url} was rejected with status {status} after re-authenticating.")]
	AuthenticationFailed {
		/// Request URL.
		url: String,
		/// Status of the second rejection.
		status: u16,
	},
	/// Renewing a cached credential failed; `source` holds the underlying cause.
	#[error("Unable to renew the {kind} credential.")]
	Renewal {
		/// Credential slot being renewed.
		kind: CredentialKind,
		/// Underlying failure.
		#[source]
		source: Box<Error>,
	},
	/// Loading session cookies for a cookie-cache key failed.
	#[error("Unable to load session cookies for {key}.")]
	CookieLoad {
		/// Printable cache key (never contains a password).
		key: String,
		/// Underlying failure.
		#[source]
		source: Box<Error>,
	},
}
impl Error {
	/// Wraps `self` as the cause of a failed renewal of `kind`.
	pub fn renewal(self, kind: CredentialKind) -> Self {
		Self::Renewal { kind, source: Box::new(self) }
	}

	/// Returns the innermost error of a renewal or cookie-load chain.
	pub fn root(&self) -> &Error {
		match self {
			Self::Renewal { source, .. } | Self::CookieLoad { source, .. } => source.root(),
			other => other,
		}
	}

	/// Returns `true` when the error is the terminal rejection after one retry.
	pub fn is_authentication_failed(&self) -> bool {
		matches!(self.root(), Self::AuthenticationFailed { .. })
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// Broker configuration failed validation.
	#[error(transparent)]
	InvalidConfig(#[from] CasConfigError),
	/// Principal or caller identifier is invalid.
	#[error(transparent)]
	InvalidIdentifier(#[from] IdentifierError),
	/// Credential could not be constructed.
	#[error(transparent)]
	InvalidCredential(#[from] CredentialError),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed.")]
	HttpRequest {
		/// Underlying request builder failure.
		#[source]
		source: SharedError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}

	/// Wraps a request builder failure inside [`ConfigError`].
	pub fn http_request(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpRequest { source: Arc::new(src) }
	}
}
impl From<http::Error> for ConfigError {
	fn from(e: http::Error) -> Self {
		Self::http_request(e)
	}
}
impl From<CasConfigError> for Error {
	fn from(e: CasConfigError) -> Self {
		ConfigError::from(e).into()
	}
}
impl From<IdentifierError> for Error {
	fn from(e: IdentifierError) -> Self {
		ConfigError::from(e).into()
	}
}
impl From<CredentialError> for Error {
	fn from(e: CredentialError) -> Self {
		ConfigError::from(e).into()
	}
}
impl From<http::Error> for Error {
	fn from(e: http::Error) -> Self {
		ConfigError::from(e).into()
	}
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// Request URL without query.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// The configured connect or read timeout elapsed.
	#[error("Request to {url} timed out.")]
	Timeout {
		/// Request URL without query.
		url: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: impl Into<String>, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { url: url.into(), source: Arc::new(src) }
	}
}

/// Truncates a response body for inclusion in diagnostics.
pub(crate) fn body_preview(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);
	let text = text.trim();

	match text.char_indices().nth(BODY_PREVIEW_LIMIT) {
		Some((cut, _)) => format!("{}...", &text[..cut]),
		None => text.to_owned(),
	}
}
