//! Auth-domain identifiers, secrets, expiring credentials, and principals.

pub mod credential;
pub mod id;
pub mod principal;
pub mod secret;

pub use credential::*;
pub use id::*;
pub use principal::*;
pub use secret::*;
