//! CAS ticket and session broker: single-flight ticket-granting-ticket, service-ticket and
//! session caching, retry-once re-authentication, and a bounded per-user cookie cache.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod broker;
pub mod config;
pub mod cookie_cache;
pub mod error;
pub mod http;
pub mod obs;
pub mod protocol;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::Principal,
		broker::SessionBroker,
		config::{CasConfig, CasConfigBuilder},
		cookie_cache::{BlockingUserCookieCache, CasCookieLoader, CookieCacheConfig},
		http::ReqwestHttpClient,
	};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = SessionBroker<ReqwestHttpClient>;

	/// Builds a reqwest HTTP client that never follows redirects and accepts the self-signed
	/// certificates produced by `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a cookie cache whose blocking client never follows redirects and accepts the
	/// self-signed certificates produced by `httpmock`.
	pub fn build_test_cookie_cache(config: CookieCacheConfig) -> BlockingUserCookieCache {
		let client = reqwest::blocking::Client::builder()
			.redirect(reqwest::redirect::Policy::none())
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure blocking Reqwest client for tests.");
		let (max_age, max_size) = (config.max_age, config.max_size);

		BlockingUserCookieCache::with_loader(
			max_age,
			max_size,
			CasCookieLoader::with_client(client, config),
		)
	}

	/// Builds a Spring-style config whose CAS server lives under `{base}/cas` and whose target
	/// service lives under `{base}/service`.
	pub fn test_config(base: &str) -> CasConfig {
		let cas_url = Url::parse(&format!("{base}/cas")).expect("Failed to parse test CAS URL.");
		let service_url =
			Url::parse(&format!("{base}/service")).expect("Failed to parse test service URL.");

		CasConfigBuilder::spring_session(cas_url, service_url)
			.csrf("csrf-token")
			.caller_id("1.2.246.562.10.00000000001.test")
			.build()
			.expect("Test CAS config should be valid.")
	}

	/// Constructs a [`SessionBroker`] backed by the reqwest transport used across integration
	/// tests.
	pub fn build_reqwest_test_broker(config: CasConfig, principal: Principal) -> ReqwestTestBroker {
		SessionBroker::with_http_client(config, principal, test_reqwest_http_client())
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use httpmock as _;
