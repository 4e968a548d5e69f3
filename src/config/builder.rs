// std
use std::time::Duration as StdDuration;
// crates.io
use http::{HeaderName, HeaderValue};
// self
use crate::{
	_prelude::*,
	auth::{CallerId, CredentialKind, IdentifierError},
	config::{CasConfig, EstimatedValidity, TransportTimeouts, trim_base},
};

/// Session cookie issued by Spring Security services.
pub const SPRING_SESSION_COOKIE: &str = "JSESSIONID";
/// Security-check suffix of Spring Security services.
pub const SPRING_SECURITY_CHECK_SUFFIX: &str = "/j_spring_cas_security_check";
/// Session cookie issued by Ring (Clojure) services.
pub const RING_SESSION_COOKIE: &str = "ring-session";
/// Security-check suffix of Ring services.
pub const RING_SECURITY_CHECK_SUFFIX: &str = "/auth/cas";

/// Errors raised while validating a [`CasConfig`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CasConfigError {
	/// A URL cannot be extended with paths (e.g. `mailto:` or `data:` URLs).
	#[error("The {field} URL cannot be used as a base URL: {url}.")]
	NotABaseUrl {
		/// Config field holding the URL.
		field: &'static str,
		/// Offending URL.
		url: String,
	},
	/// Only HTTP(S) endpoints are supported.
	#[error("The {field} URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Config field holding the URL.
		field: &'static str,
		/// Offending URL.
		url: String,
	},
	/// Session cookie name is empty or not a valid cookie token.
	#[error("Session cookie name `{name}` is not a valid cookie name.")]
	InvalidCookieName {
		/// Supplied cookie name.
		name: String,
	},
	/// CSRF value is required.
	#[error("A CSRF value is required.")]
	MissingCsrf,
	/// Caller id is required.
	#[error("A caller id is required.")]
	MissingCallerId,
	/// Caller id failed identifier validation.
	#[error(transparent)]
	InvalidCallerId(#[from] IdentifierError),
	/// A value would not survive as an HTTP header.
	#[error("The {field} value is not a valid HTTP header value.")]
	InvalidHeaderValue {
		/// Config field holding the value.
		field: &'static str,
	},
	/// The configured service-ticket header is not a valid header name.
	#[error("`{name}` is not a valid HTTP header name.")]
	InvalidHeaderName {
		/// Supplied header name.
		name: String,
	},
	/// Validity estimates must be positive.
	#[error("The estimated {kind} validity must be positive.")]
	NonPositiveValidity {
		/// Credential whose estimate is not positive.
		kind: CredentialKind,
	},
	/// Timeouts must be non-zero.
	#[error("The {which} timeout must be greater than zero.")]
	ZeroTimeout {
		/// Which timeout (connect, read).
		which: &'static str,
	},
}

/// Builder for [`CasConfig`] values.
#[derive(Debug)]
pub struct CasConfigBuilder {
	/// CAS server base URL.
	pub cas_url: Url,
	/// Target service base URL.
	pub service_url: Url,
	/// Security-check suffix appended to the service URL.
	pub service_url_suffix: String,
	/// Explicit session URL; defaults to `service_url` + suffix.
	pub session_url: Option<Url>,
	/// Session cookie name.
	pub session_cookie_name: String,
	/// Header carrying bare service tickets.
	pub service_ticket_header: Option<String>,
	/// CSRF value.
	pub csrf: Option<String>,
	/// Raw caller id.
	pub caller_id: Option<String>,
	/// Treat a `302` to the CAS login page as a rejection.
	pub refresh_on_login_redirect: bool,
	/// Estimated credential lifetimes.
	pub validity: EstimatedValidity,
	/// Transport timeouts.
	pub transport: TransportTimeouts,
}
impl CasConfigBuilder {
	/// Creates a builder with an explicit cookie name and security-check suffix.
	pub fn new(
		cas_url: Url,
		service_url: Url,
		session_cookie_name: impl Into<String>,
		service_url_suffix: impl Into<String>,
	) -> Self {
		Self {
			cas_url,
			service_url,
			service_url_suffix: service_url_suffix.into(),
			session_url: None,
			session_cookie_name: session_cookie_name.into(),
			service_ticket_header: None,
			csrf: None,
			caller_id: None,
			refresh_on_login_redirect: true,
			validity: EstimatedValidity::default(),
			transport: TransportTimeouts::default(),
		}
	}

	/// Preset for Spring Security services (`JSESSIONID`, `/j_spring_cas_security_check`).
	pub fn spring_session(cas_url: Url, service_url: Url) -> Self {
		Self::new(cas_url, service_url, SPRING_SESSION_COOKIE, SPRING_SECURITY_CHECK_SUFFIX)
	}

	/// Preset for Ring services (`ring-session`, `/auth/cas`).
	pub fn ring_session(cas_url: Url, service_url: Url) -> Self {
		Self::new(cas_url, service_url, RING_SESSION_COOKIE, RING_SECURITY_CHECK_SUFFIX)
	}

	/// Overrides the session URL.
	pub fn session_url(mut self, url: Url) -> Self {
		self.session_url = Some(url);

		self
	}

	/// Sends bare service tickets in `header` instead of the `ticket` query parameter.
	pub fn service_ticket_header(mut self, header: impl Into<String>) -> Self {
		self.service_ticket_header = Some(header.into());

		self
	}

	/// Sets the CSRF value.
	pub fn csrf(mut self, csrf: impl Into<String>) -> Self {
		self.csrf = Some(csrf.into());

		self
	}

	/// Sets the caller id.
	pub fn caller_id(mut self, caller_id: impl Into<String>) -> Self {
		self.caller_id = Some(caller_id.into());

		self
	}

	/// Toggles login-redirect detection.
	pub fn refresh_on_login_redirect(mut self, enabled: bool) -> Self {
		self.refresh_on_login_redirect = enabled;

		self
	}

	/// Overrides the validity estimates.
	pub fn validity(mut self, validity: EstimatedValidity) -> Self {
		self.validity = validity;

		self
	}

	/// Overrides the transport timeouts.
	pub fn transport(mut self, transport: TransportTimeouts) -> Self {
		self.transport = transport;

		self
	}

	/// Consumes the builder and validates the resulting config.
	pub fn build(self) -> Result<CasConfig, CasConfigError> {
		let csrf = self.csrf.ok_or(CasConfigError::MissingCsrf)?;
		let caller_id = CallerId::new(self.caller_id.ok_or(CasConfigError::MissingCallerId)?)?;
		let session_url = match self.session_url {
			Some(url) => url,
			None => default_session_url(&self.service_url, &self.service_url_suffix)?,
		};
		let config = CasConfig {
			cas_url: self.cas_url,
			service_url: self.service_url,
			service_url_suffix: self.service_url_suffix,
			session_url,
			session_cookie_name: self.session_cookie_name,
			service_ticket_header: self.service_ticket_header,
			csrf,
			caller_id,
			refresh_on_login_redirect: self.refresh_on_login_redirect,
			validity: self.validity,
			transport: self.transport,
		};

		config.validate()?;

		Ok(config)
	}
}

impl CasConfig {
	/// Validates invariants for the config; deserialized configs should call this too.
	pub fn validate(&self) -> Result<(), CasConfigError> {
		validate_base_url("cas", &self.cas_url)?;
		validate_base_url("service", &self.service_url)?;
		validate_base_url("session", &self.session_url)?;
		validate_cookie_name(&self.session_cookie_name)?;
		validate_header_value("csrf", &self.csrf)?;
		validate_header_value("caller_id", &self.caller_id)?;

		if let Some(name) = self.service_ticket_header.as_deref() {
			HeaderName::from_bytes(name.as_bytes())
				.map_err(|_| CasConfigError::InvalidHeaderName { name: name.to_owned() })?;
		}

		validate_validity(CredentialKind::TicketGrantingTicket, self.validity.ticket_granting_ticket)?;
		validate_validity(CredentialKind::ServiceTicket, self.validity.service_ticket)?;
		validate_validity(CredentialKind::Session, self.validity.session)?;
		validate_timeout("connect", self.transport.connect)?;
		validate_timeout("read", self.transport.read)?;

		Ok(())
	}
}

fn default_session_url(service_url: &Url, suffix: &str) -> Result<Url, CasConfigError> {
	let raw = format!("{}{suffix}", trim_base(service_url));

	Url::parse(&raw).map_err(|_| CasConfigError::NotABaseUrl { field: "session", url: raw })
}

fn validate_base_url(field: &'static str, url: &Url) -> Result<(), CasConfigError> {
	if url.cannot_be_a_base() {
		return Err(CasConfigError::NotABaseUrl { field, url: url.to_string() });
	}
	if !matches!(url.scheme(), "http" | "https") {
		return Err(CasConfigError::UnsupportedScheme { field, url: url.to_string() });
	}

	Ok(())
}

fn validate_cookie_name(name: &str) -> Result<(), CasConfigError> {
	let valid = !name.is_empty()
		&& name.bytes().all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b));

	if valid { Ok(()) } else { Err(CasConfigError::InvalidCookieName { name: name.to_owned() }) }
}

fn validate_header_value(field: &'static str, value: &str) -> Result<(), CasConfigError> {
	HeaderValue::from_str(value).map(|_| ()).map_err(|_| CasConfigError::InvalidHeaderValue { field })
}

fn validate_validity(kind: CredentialKind, validity: Duration) -> Result<(), CasConfigError> {
	if validity.is_positive() { Ok(()) } else { Err(CasConfigError::NonPositiveValidity { kind }) }
}

fn validate_timeout(which: &'static str, timeout: StdDuration) -> Result<(), CasConfigError> {
	if timeout.is_zero() { Err(CasConfigError::ZeroTimeout { which }) } else { Ok(()) }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn urls() -> (Url, Url) {
		(
			Url::parse("https://cas.example.com/cas").expect("CAS URL fixture should parse."),
			Url::parse("https://svc.example.com/kayttooikeus-service/")
				.expect("Service URL fixture should parse."),
		)
	}

	#[test]
	fn presets_fill_cookie_suffix_and_session_url() {
		let (cas, service) = urls();
		let spring = CasConfigBuilder::spring_session(cas.clone(), service.clone())
			.csrf("csrf")
			.caller_id("caller")
			.build()
			.expect("Spring preset should be valid.");

		assert_eq!(spring.session_cookie_name, "JSESSIONID");
		assert_eq!(
			spring.session_url.as_str(),
			"https://svc.example.com/kayttooikeus-service/j_spring_cas_security_check"
		);
		assert!(spring.refresh_on_login_redirect);
		assert_eq!(spring.validity, EstimatedValidity::default());

		let ring = CasConfigBuilder::ring_session(cas, service)
			.csrf("csrf")
			.caller_id("caller")
			.build()
			.expect("Ring preset should be valid.");

		assert_eq!(ring.session_cookie_name, "ring-session");
		assert_eq!(ring.session_url.as_str(), "https://svc.example.com/kayttooikeus-service/auth/cas");
	}

	#[test]
	fn build_rejects_invalid_settings() {
		let (cas, service) = urls();
		let base = || {
			CasConfigBuilder::spring_session(cas.clone(), service.clone()).csrf("csrf").caller_id("caller")
		};

		assert_eq!(
			CasConfigBuilder::spring_session(cas.clone(), service.clone()).caller_id("caller").build(),
			Err(CasConfigError::MissingCsrf)
		);
		assert_eq!(
			CasConfigBuilder::spring_session(cas.clone(), service.clone()).csrf("csrf").build(),
			Err(CasConfigError::MissingCallerId)
		);
		assert!(matches!(
			base().caller_id("has space").build(),
			Err(CasConfigError::InvalidCallerId(IdentifierError::ContainsWhitespace { .. }))
		));
		assert_eq!(
			base().csrf("line\nbreak").build(),
			Err(CasConfigError::InvalidHeaderValue { field: "csrf" })
		);
		assert!(matches!(
			base().service_ticket_header("bad header").build(),
			Err(CasConfigError::InvalidHeaderName { .. })
		));
		assert!(matches!(
			CasConfigBuilder::new(cas.clone(), service.clone(), "bad;name", "/auth/cas")
				.csrf("csrf")
				.caller_id("caller")
				.build(),
			Err(CasConfigError::InvalidCookieName { .. })
		));
		assert!(matches!(
			base().session_url(Url::parse("mailto:ops@example.com").expect("URL should parse.")).build(),
			Err(CasConfigError::NotABaseUrl { field: "session", .. })
		));
		assert_eq!(
			base()
				.validity(EstimatedValidity { session: Duration::ZERO, ..Default::default() })
				.build(),
			Err(CasConfigError::NonPositiveValidity { kind: CredentialKind::Session })
		);
		assert_eq!(
			base()
				.transport(TransportTimeouts { read: StdDuration::ZERO, ..Default::default() })
				.build(),
			Err(CasConfigError::ZeroTimeout { which: "read" })
		);
	}
}
