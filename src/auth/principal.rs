//! Principals the brokers authenticate as.

// self
use crate::{
	_prelude::*,
	auth::{IdentifierError, PrincipalName, Secret},
};

/// Boxed future returned by [`ProxyTicketSource::proxy_ticket_for`].
pub type ProxyTicketFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + 'a + Send>>;

/// Delegated authentication held by an already-authenticated principal.
///
/// Implementations typically wrap a CAS assertion obtained through proxy validation and ask
/// CAS for a proxy ticket scoped to `target_service`. Failures should be reported as
/// [`Error::ProxyTicket`].
pub trait ProxyTicketSource
where
	Self: Send + Sync,
{
	/// Requests a proxy ticket usable exactly once against `target_service`.
	fn proxy_ticket_for<'a>(&'a self, target_service: &'a str) -> ProxyTicketFuture<'a>;
}

/// Identity a broker authenticates as.
#[derive(Clone)]
pub enum Principal {
	/// Service account authenticating with username and password.
	Password {
		/// Account name.
		username: PrincipalName,
		/// Account password; never part of equality, hashing, or printable output.
		password: Secret,
	},
	/// End user whose delegated CAS authentication yields proxy tickets.
	Proxy {
		/// Authenticated user's name.
		name: PrincipalName,
		/// Source of proxy tickets for this user.
		source: Arc<dyn ProxyTicketSource>,
	},
}
impl Principal {
	/// Creates a username/password principal; an empty username is rejected.
	pub fn password(
		username: impl AsRef<str>,
		password: impl Into<String>,
	) -> Result<Self, IdentifierError> {
		Ok(Self::Password { username: PrincipalName::new(username)?, password: Secret::new(password) })
	}

	/// Creates a proxy-authenticated principal; an empty name is rejected.
	pub fn proxy(
		name: impl AsRef<str>,
		source: Arc<dyn ProxyTicketSource>,
	) -> Result<Self, IdentifierError> {
		Ok(Self::Proxy { name: PrincipalName::new(name)?, source })
	}

	/// Principal name used in cache keys and logs.
	pub fn name(&self) -> &PrincipalName {
		match self {
			Self::Password { username, .. } => username,
			Self::Proxy { name, .. } => name,
		}
	}

	/// Returns `true` for delegated (proxy) principals.
	pub fn is_proxy(&self) -> bool {
		matches!(self, Self::Proxy { .. })
	}
}
impl Debug for Principal {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Password { username, .. } => f
				.debug_struct("Principal::Password")
				.field("username", username)
				.field("password", &"<redacted>")
				.finish(),
			Self::Proxy { name, .. } =>
				f.debug_struct("Principal::Proxy").field("name", name).finish_non_exhaustive(),
		}
	}
}
