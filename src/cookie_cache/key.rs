// self
use crate::{
	_prelude::*,
	auth::{IdentifierError, Principal},
};

/// Identifies one cached cookie set: principal, optional caller context, and target service.
///
/// Equality, hashing and the printable form use the principal's name, the caller context and
/// the target service only. The password never takes part, so two keys differing only by
/// password share one entry. A missing caller context prints as `null`.
#[derive(Clone)]
pub struct CacheKey {
	principal: Principal,
	caller_context: Option<String>,
	target_service: String,
}
impl CacheKey {
	/// Creates a key for `principal` calling `target_service`.
	///
	/// `target_service` is the service URL including its security-check suffix;
	/// `caller_context` (e.g. the current user's session id) further partitions the cache.
	pub fn new(
		principal: Principal,
		caller_context: Option<&str>,
		target_service: impl Into<String>,
	) -> Self {
		Self {
			principal,
			caller_context: caller_context.map(str::to_owned),
			target_service: target_service.into(),
		}
	}

	/// Creates a key for a service account; an empty username is rejected.
	pub fn for_service_user(
		username: impl AsRef<str>,
		password: impl Into<String>,
		caller_context: Option<&str>,
		target_service: impl Into<String>,
	) -> Result<Self, IdentifierError> {
		Ok(Self::new(Principal::password(username, password)?, caller_context, target_service))
	}

	/// Principal the cookies belong to.
	pub fn principal(&self) -> &Principal {
		&self.principal
	}

	/// Caller context, if any.
	pub fn caller_context(&self) -> Option<&str> {
		self.caller_context.as_deref()
	}

	/// Target service URL.
	pub fn target_service(&self) -> &str {
		&self.target_service
	}

	/// Returns `true` when the cookies come from proxy authentication.
	pub fn is_proxy_auth(&self) -> bool {
		self.principal.is_proxy()
	}

	fn identity(&self) -> (&str, Option<&str>, &str) {
		(self.principal.name().as_ref(), self.caller_context.as_deref(), &self.target_service)
	}
}
impl PartialEq for CacheKey {
	fn eq(&self, other: &Self) -> bool {
		self.identity() == other.identity()
	}
}
impl Eq for CacheKey {}
impl Hash for CacheKey {
	fn hash<H>(&self, state: &mut H)
	where
		H: Hasher,
	{
		self.identity().hash(state);
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(
			f,
			"u:{}_cc:{}_ts:{}",
			self.principal.name(),
			self.caller_context.as_deref().unwrap_or("null"),
			self.target_service
		)
	}
}
impl Debug for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "CacheKey({self})")
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashSet;
	// self
	use super::*;

	#[test]
	fn password_is_not_part_of_identity() {
		let a = CacheKey::for_service_user("alice", "pw", None, "svc1").expect("Key should be valid.");
		let b = CacheKey::for_service_user("alice", "other", None, "svc1").expect("Key should be valid.");
		let c = CacheKey::for_service_user("alice", "pw", Some("session-1"), "svc1")
			.expect("Key should be valid.");
		let keys = HashSet::from([a.clone(), b.clone(), c.clone()]);

		assert_eq!(a, b);
		assert_ne!(a, c);
		assert_eq!(keys.len(), 2);
		assert_eq!(a.to_string(), "u:alice_cc:null_ts:svc1");
		assert_eq!(c.to_string(), "u:alice_cc:session-1_ts:svc1");
		assert!(!format!("{a:?}").contains("pw"));
	}

	#[test]
	fn empty_user_is_rejected() {
		assert!(CacheKey::for_service_user("", "pw", None, "svc1").is_err());
	}
}
