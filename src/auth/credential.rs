//! Expiring CAS credentials (ticket-granting tickets, service tickets, session cookies).
//!
//! CAS does not report a real time-to-live for any of these values, so every credential
//! carries an *estimated* expiry chosen shorter than the server-side lifetime. The estimate
//! only saves round trips; a rejected request is what actually forces a renewal.

// self
use crate::{_prelude::*, auth::Secret};

/// Which step of the CAS exchange produced a credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
	/// Long-lived ticket-granting ticket issued by `POST /v1/tickets`.
	TicketGrantingTicket,
	/// One-time service ticket issued for a specific service URL.
	ServiceTicket,
	/// Session cookie value issued by the target service.
	Session,
}
impl CredentialKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialKind::TicketGrantingTicket => "ticket_granting_ticket",
			CredentialKind::ServiceTicket => "service_ticket",
			CredentialKind::Session => "session",
		}
	}
}
impl Display for CredentialKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(match self {
			CredentialKind::TicketGrantingTicket => "ticket-granting ticket",
			CredentialKind::ServiceTicket => "service ticket",
			CredentialKind::Session => "session",
		})
	}
}

/// Errors produced while constructing a [`Credential`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialError {
	/// The token string was empty.
	#[error("The {kind} token cannot be empty.")]
	EmptyToken {
		/// Credential kind being constructed.
		kind: CredentialKind,
	},
	/// `expires_at` did not come strictly after `issued_at`.
	#[error("The {kind} must expire after it was issued.")]
	NonPositiveValidity {
		/// Credential kind being constructed.
		kind: CredentialKind,
	},
	/// The estimated expiry falls outside the representable date range.
	#[error("The estimated {kind} expiry overflows the date range.")]
	ValidityOverflow {
		/// Credential kind being constructed.
		kind: CredentialKind,
	},
}

/// Immutable credential paired with its estimated validity window.
///
/// Credentials are never mutated; renewals and extensions produce new values.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
	kind: CredentialKind,
	token: Secret,
	issued_at: OffsetDateTime,
	expires_at: OffsetDateTime,
}
impl Credential {
	/// Creates a credential, enforcing a non-empty token and `expires_at > issued_at`.
	pub fn new(
		kind: CredentialKind,
		token: impl Into<String>,
		issued_at: OffsetDateTime,
		expires_at: OffsetDateTime,
	) -> Result<Self, CredentialError> {
		let token = Secret::new(token);

		if token.is_empty() {
			return Err(CredentialError::EmptyToken { kind });
		}
		if expires_at <= issued_at {
			return Err(CredentialError::NonPositiveValidity { kind });
		}

		Ok(Self { kind, token, issued_at, expires_at })
	}

	/// Issues a credential now with an estimated validity window.
	pub fn issue(
		kind: CredentialKind,
		token: impl Into<String>,
		validity: Duration,
	) -> Result<Self, CredentialError> {
		let now = OffsetDateTime::now_utc();

		Self::new(kind, token, now, expiry(kind, now, validity)?)
	}

	/// Step that produced the credential.
	pub fn kind(&self) -> CredentialKind {
		self.kind
	}

	/// Returns the raw token. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.token.expose()
	}

	/// Instant the credential was issued (or last extended).
	pub fn issued_at(&self) -> OffsetDateTime {
		self.issued_at
	}

	/// Estimated expiry instant.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.expires_at
	}

	/// Returns `true` while `instant` is strictly before the estimated expiry.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}

	/// Checks validity against the current UTC clock.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Time left before the estimated expiry, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}

	/// Returns a copy of the same token re-issued at `instant` with a fresh validity window.
	pub fn extended_at(&self, instant: OffsetDateTime, validity: Duration) -> Result<Self, CredentialError> {
		Self::new(self.kind, self.token.expose(), instant, expiry(self.kind, instant, validity)?)
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("kind", &self.kind)
			.field("token", &self.token)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

fn expiry(
	kind: CredentialKind,
	issued_at: OffsetDateTime,
	validity: Duration,
) -> Result<OffsetDateTime, CredentialError> {
	issued_at.checked_add(validity).ok_or(CredentialError::ValidityOverflow { kind })
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn validity_is_strictly_before_expiry() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let expires = macros::datetime!(2025-01-01 00:15 UTC);
		let session = Credential::new(CredentialKind::Session, "S-1", issued, expires)
			.expect("Session fixture should be valid.");

		assert!(session.is_valid_at(macros::datetime!(2025-01-01 00:14:59 UTC)));
		assert!(!session.is_valid_at(expires));
		assert!(!session.is_valid_at(macros::datetime!(2025-01-01 01:00 UTC)));
		assert_eq!(session.remaining_at(macros::datetime!(2025-01-01 00:10 UTC)), Duration::minutes(5));
		assert_eq!(session.remaining_at(macros::datetime!(2025-01-02 00:00 UTC)), Duration::ZERO);
	}

	#[test]
	fn construction_enforces_invariants() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);

		assert_eq!(
			Credential::new(CredentialKind::TicketGrantingTicket, "TGT-1", now, now),
			Err(CredentialError::NonPositiveValidity { kind: CredentialKind::TicketGrantingTicket })
		);
		assert_eq!(
			Credential::new(CredentialKind::ServiceTicket, "", now, now + Duration::seconds(10)),
			Err(CredentialError::EmptyToken { kind: CredentialKind::ServiceTicket })
		);
		assert!(Credential::issue(CredentialKind::Session, "S-1", Duration::seconds(-1)).is_err());
	}

	#[test]
	fn extension_keeps_token_and_moves_window() {
		let issued = macros::datetime!(2025-01-01 00:00 UTC);
		let session =
			Credential::new(CredentialKind::Session, "S-1", issued, issued + Duration::minutes(15))
				.expect("Session fixture should be valid.");
		let later = macros::datetime!(2025-01-01 00:10 UTC);
		let extended = session
			.extended_at(later, Duration::minutes(15))
			.expect("Extending a session should succeed.");

		assert_eq!(extended.expose(), "S-1");
		assert_eq!(extended.kind(), CredentialKind::Session);
		assert_eq!(extended.expires_at(), macros::datetime!(2025-01-01 00:25 UTC));
		assert_eq!(session.expires_at(), issued + Duration::minutes(15));
	}

	#[test]
	fn oversized_validity_is_an_error() {
		assert_eq!(
			Credential::issue(CredentialKind::TicketGrantingTicket, "TGT-1", Duration::MAX),
			Err(CredentialError::ValidityOverflow { kind: CredentialKind::TicketGrantingTicket })
		);

		let session = Credential::issue(CredentialKind::Session, "S-1", Duration::minutes(1))
			.expect("Session fixture should be valid.");

		assert_eq!(
			session.extended_at(OffsetDateTime::now_utc(), Duration::MAX),
			Err(CredentialError::ValidityOverflow { kind: CredentialKind::Session })
		);
	}

	#[test]
	fn debug_output_redacts_token() {
		let session = Credential::issue(CredentialKind::Session, "S-secret", Duration::minutes(1))
			.expect("Session fixture should be valid.");
		let rendered = format!("{session:?}");

		assert!(!rendered.contains("S-secret"));
		assert!(rendered.contains("<redacted>"));
	}
}
