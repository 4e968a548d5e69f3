//! Broker configuration: CAS and target-service endpoints, request decoration, and the
//! estimated validity windows used to skip renewals.
//!
//! Configs are plain serializable data validated once through [`CasConfigBuilder::build`];
//! the principal's credentials are supplied separately so a config can be logged or stored.

/// Builder API and presets for [`CasConfig`].
pub mod builder;

pub use builder::*;

// std
use std::time::Duration as StdDuration;
// crates.io
use url::form_urlencoded;
// self
use crate::{_prelude::*, auth::CallerId};

/// Estimated lifetimes of cached credentials.
///
/// CAS never reports these, so they are chosen shorter than the server-side values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatedValidity {
	/// Ticket-granting ticket lifetime.
	pub ticket_granting_ticket: Duration,
	/// Service ticket lifetime.
	pub service_ticket: Duration,
	/// Session cookie lifetime, restarted by each successful request on a reused session.
	pub session: Duration,
}
impl Default for EstimatedValidity {
	fn default() -> Self {
		Self {
			ticket_granting_ticket: Duration::hours(7),
			service_ticket: Duration::seconds(10),
			session: Duration::minutes(15),
		}
	}
}

/// Connect and read timeouts applied by the bundled transports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportTimeouts {
	/// TCP/TLS connect timeout.
	pub connect: StdDuration,
	/// Whole-request read timeout.
	pub read: StdDuration,
}
impl Default for TransportTimeouts {
	fn default() -> Self {
		Self { connect: StdDuration::from_secs(10), read: StdDuration::from_secs(30) }
	}
}

/// Validated configuration consumed by [`SessionBroker`](crate::broker::SessionBroker).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasConfig {
	/// CAS server base URL, e.g. `https://virkailija.example.com/cas`.
	pub cas_url: Url,
	/// Target service base URL.
	pub service_url: Url,
	/// Security-check suffix appended to `service_url` when requesting service tickets.
	pub service_url_suffix: String,
	/// URL that exchanges a service ticket for a session cookie.
	pub session_url: Url,
	/// Name of the session cookie issued by the target service.
	pub session_cookie_name: String,
	/// Header carrying bare service tickets; `None` sends them as the `ticket` query parameter.
	pub service_ticket_header: Option<String>,
	/// CSRF value sent as both the `CSRF` header and cookie.
	pub csrf: String,
	/// Value of the `Caller-Id` header.
	pub caller_id: CallerId,
	/// Treat a `302` to the CAS login page as a rejection.
	pub refresh_on_login_redirect: bool,
	/// Estimated credential lifetimes.
	pub validity: EstimatedValidity,
	/// Transport timeouts.
	pub transport: TransportTimeouts,
}
impl CasConfig {
	/// Starts a Spring Security builder; see [`CasConfigBuilder::spring_session`].
	pub fn spring_session(cas_url: Url, service_url: Url) -> CasConfigBuilder {
		CasConfigBuilder::spring_session(cas_url, service_url)
	}

	/// Starts a Ring builder; see [`CasConfigBuilder::ring_session`].
	pub fn ring_session(cas_url: Url, service_url: Url) -> CasConfigBuilder {
		CasConfigBuilder::ring_session(cas_url, service_url)
	}

	/// Endpoint issuing ticket-granting tickets (`{cas_url}/v1/tickets`).
	pub fn tickets_url(&self) -> String {
		format!("{}/v1/tickets", trim_base(&self.cas_url))
	}

	/// Endpoint exchanging `ticket_granting_ticket` for a service ticket.
	pub fn ticket_granting_ticket_url(&self, ticket_granting_ticket: &str) -> String {
		format!("{}/{ticket_granting_ticket}", self.tickets_url())
	}

	/// Service identifier sent when requesting a service ticket (`service_url` + suffix).
	pub fn service_ticket_service(&self) -> String {
		format!("{}{}", trim_base(&self.service_url), self.service_url_suffix)
	}

	/// `Location` the target answers with when it wants the caller to log in again.
	pub fn login_redirect_location(&self) -> String {
		let service: String =
			form_urlencoded::byte_serialize(self.session_url.as_str().as_bytes()).collect();

		format!("{}/login?service={service}", trim_base(&self.cas_url))
	}
}

pub(crate) fn trim_base(url: &Url) -> &str {
	url.as_str().trim_end_matches('/')
}
