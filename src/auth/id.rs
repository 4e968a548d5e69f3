//! Strongly typed identifiers for CAS principals and calling services.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

/// Longest accepted principal name, in bytes.
pub const PRINCIPAL_NAME_MAX_LEN: usize = 256;
/// Longest accepted caller identifier, in bytes.
pub const CALLER_ID_MAX_LEN: usize = 128;

macro_rules! def_id {
	($name:ident, $kind:literal, $validate:path, $(#[$doc:meta])*) => {
		$(#[$doc])*
		#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Validates and wraps `value`.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let value = value.as_ref();

				$validate(value)?;

				Ok(Self(value.to_owned()))
			}

			/// Borrows the identifier.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				$validate(&value)?;

				Ok(Self(value))
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({:?})"), self.0)
			}
		}
	};
}

def_id! {
	PrincipalName, "Principal", validate_principal_name,
	/// Name of a CAS principal: a service account or a proxied end user.
	///
	/// Any printable text without whitespace is accepted, since CAS user names are not
	/// restricted to ASCII.
}
def_id! {
	CallerId, "Caller", validate_caller_id,
	/// Identifier sent in the `Caller-Id` header of every outgoing request.
	///
	/// Restricted to visible ASCII so it always forms a valid header value.
}

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (principal, caller).
		kind: &'static str,
	},
	/// The identifier contains whitespace.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (principal, caller).
		kind: &'static str,
	},
	/// The identifier contains a control or non-ASCII character where neither is allowed.
	#[error("{kind} identifier contains the disallowed character {character:?}.")]
	DisallowedCharacter {
		/// Kind of identifier (principal, caller).
		kind: &'static str,
		/// First offending character.
		character: char,
	},
	/// The identifier is longer than allowed.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Kind of identifier (principal, caller).
		kind: &'static str,
		/// Maximum permitted length in bytes.
		max: usize,
	},
}

fn validate_principal_name(value: &str) -> Result<(), IdentifierError> {
	const KIND: &str = "Principal";

	check_shape(KIND, value, PRINCIPAL_NAME_MAX_LEN)?;

	match value.chars().find(|c| c.is_control()) {
		Some(character) => Err(IdentifierError::DisallowedCharacter { kind: KIND, character }),
		None => Ok(()),
	}
}

fn validate_caller_id(value: &str) -> Result<(), IdentifierError> {
	const KIND: &str = "Caller";

	check_shape(KIND, value, CALLER_ID_MAX_LEN)?;

	match value.chars().find(|c| !c.is_ascii_graphic()) {
		Some(character) => Err(IdentifierError::DisallowedCharacter { kind: KIND, character }),
		None => Ok(()),
	}
}

fn check_shape(kind: &'static str, value: &str, max: usize) -> Result<(), IdentifierError> {
	if value.is_empty() {
		Err(IdentifierError::Empty { kind })
	} else if value.chars().any(char::is_whitespace) {
		Err(IdentifierError::ContainsWhitespace { kind })
	} else if value.len() > max {
		Err(IdentifierError::TooLong { kind, max })
	} else {
		Ok(())
	}
}
