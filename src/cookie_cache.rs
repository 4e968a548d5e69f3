//! Blocking per-user cookie cache for callers that act on behalf of many principals.
//!
//! Each entry holds the `Set-Cookie` values of one authenticated session, keyed by
//! [`CacheKey`]. The cache is bounded (least-recently-used entries go first) and entries
//! expire a fixed time after they were loaded. Concurrent misses on one key block on a single
//! load; failed loads are not cached, so the next call starts over.

mod key;
mod loader;

pub use key::*;
pub use loader::*;

// std
use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::{Duration as StdDuration, Instant},
};
// crates.io
use moka::{notification::RemovalCause, policy::EvictionPolicy, sync::Cache};
// self
use crate::{
	_prelude::*,
	auth::{CallerId, Principal},
	config::{CasConfigError, SPRING_SECURITY_CHECK_SUFFIX, TransportTimeouts},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Default entry lifetime.
pub const DEFAULT_MAX_AGE: StdDuration = StdDuration::from_secs(10 * 60);
/// Default entry bound.
pub const DEFAULT_MAX_SIZE: u64 = 100_000;
/// Default path (and query) requested to open a session.
pub const DEFAULT_SESSION_INIT_PATH: &str = "/buildversion.txt?auth";

/// Cookie set shared by every caller of one cache entry.
pub type Cookies = Arc<Vec<String>>;

/// Settings for [`BlockingUserCookieCache`] and [`CasCookieLoader`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieCacheConfig {
	/// CAS server base URL.
	pub cas_url: Url,
	/// Lifetime of a cached cookie set, counted from its load.
	pub max_age: StdDuration,
	/// Maximum number of cached cookie sets.
	pub max_size: u64,
	/// Suffix removed from target services before opening a session.
	pub security_check_suffix: String,
	/// Path (and query) appended to the target service to open a session.
	pub session_init_path: String,
	/// Value of the `Caller-Id` header.
	pub caller_id: CallerId,
	/// CSRF value sent as both header and cookie.
	pub csrf: String,
	/// Transport timeouts of the blocking client.
	pub transport: TransportTimeouts,
}
impl CookieCacheConfig {
	/// Creates a config with the default age, size, suffix, and session path.
	pub fn new(
		cas_url: Url,
		caller_id: impl AsRef<str>,
		csrf: impl Into<String>,
	) -> Result<Self, CasConfigError> {
		Ok(Self {
			cas_url,
			max_age: DEFAULT_MAX_AGE,
			max_size: DEFAULT_MAX_SIZE,
			security_check_suffix: SPRING_SECURITY_CHECK_SUFFIX.into(),
			session_init_path: DEFAULT_SESSION_INIT_PATH.into(),
			caller_id: CallerId::new(caller_id)?,
			csrf: csrf.into(),
			transport: TransportTimeouts::default(),
		})
	}

	/// Overrides the entry lifetime.
	pub fn max_age(mut self, max_age: StdDuration) -> Self {
		self.max_age = max_age;

		self
	}

	/// Overrides the entry bound.
	pub fn max_size(mut self, max_size: u64) -> Self {
		self.max_size = max_size;

		self
	}

	/// Overrides the path used to open sessions.
	pub fn session_init_path(mut self, path: impl Into<String>) -> Self {
		self.session_init_path = path.into();

		self
	}

	/// Overrides the security-check suffix stripped from target services.
	pub fn security_check_suffix(mut self, suffix: impl Into<String>) -> Self {
		self.security_check_suffix = suffix.into();

		self
	}

	/// Overrides the transport timeouts.
	pub fn transport(mut self, transport: TransportTimeouts) -> Self {
		self.transport = transport;

		self
	}
}

/// Bounded, expiring cache of authenticated cookie sets with blocking single-flight loads.
///
/// Methods block the calling thread; call them from blocking contexts only.
pub struct BlockingUserCookieCache<L = DefaultCookieLoader>
where
	L: ?Sized + CookieLoader,
{
	cache: Cache<CacheKey, Cookies>,
	loader: Arc<L>,
	removed: Arc<AtomicU64>,
}
#[cfg(feature = "reqwest")]
impl BlockingUserCookieCache<CasCookieLoader> {
	/// Builds a cache backed by a [`CasCookieLoader`].
	pub fn new(config: CookieCacheConfig) -> Result<Self> {
		let (max_age, max_size) = (config.max_age, config.max_size);

		Ok(Self::with_loader(max_age, max_size, CasCookieLoader::new(config)?))
	}
}
impl<L> BlockingUserCookieCache<L>
where
	L: ?Sized + CookieLoader,
{
	/// Builds a cache around a caller-provided loader.
	pub fn with_loader(max_age: StdDuration, max_size: u64, loader: impl Into<Arc<L>>) -> Self {
		let removed = Arc::new(AtomicU64::new(0));
		let counter = removed.clone();
		let cache = Cache::builder()
			.max_capacity(max_size)
			.time_to_live(max_age)
			.eviction_policy(EvictionPolicy::lru())
			.eviction_listener(move |key: Arc<CacheKey>, _: Cookies, cause: RemovalCause| {
				if cause != RemovalCause::Replaced {
					counter.fetch_add(1, Ordering::Relaxed);
					obs::record_cookie_cache_removal(removal_label(cause));
					obs::log!(info, "Removed cached session cookies of {key} ({cause:?}).");
				}
			})
			.build();

		obs::log!(
			info,
			"Initialized the cookie cache with max age {max_age:?} and max size {max_size}."
		);

		Self { cache, loader: loader.into(), removed }
	}

	/// Returns the cookies cached for `key`, loading them on a miss.
	///
	/// Concurrent misses on one key wait for a single load and share its outcome. A failed
	/// load leaves no entry behind.
	pub fn get_authenticated_cookies(&self, key: &CacheKey) -> Result<Cookies> {
		self.cache.try_get_with_by_ref(key, || self.load(key)).map_err(|e| Error::CookieLoad {
			key: key.to_string(),
			source: Box::new(e.as_ref().clone()),
		})
	}

	/// Returns cookies for a service account calling `target_service`.
	///
	/// Once an entry exists, the password is not consulted again.
	pub fn get_authenticated_cookies_for_service_user(
		&self,
		username: &str,
		password: &str,
		caller_context: Option<&str>,
		target_service: &str,
	) -> Result<Cookies> {
		let key = CacheKey::for_service_user(username, password, caller_context, target_service)?;

		self.get_authenticated_cookies(&key)
	}

	/// Returns cookies for a proxy-authenticated principal calling `target_service`.
	pub fn get_authenticated_cookies_for_proxy_auth(
		&self,
		principal: Principal,
		caller_context: Option<&str>,
		target_service: &str,
	) -> Result<Cookies> {
		self.get_authenticated_cookies(&CacheKey::new(principal, caller_context, target_service))
	}

	/// Drops the entry of `key`.
	pub fn invalidate(&self, key: &CacheKey) {
		self.cache.invalidate(key);
	}

	/// Drops every entry.
	pub fn invalidate_all(&self) {
		self.cache.invalidate_all();
	}

	/// Number of live entries, after applying pending evictions.
	pub fn size(&self) -> u64 {
		self.cache.run_pending_tasks();

		self.cache.entry_count()
	}

	/// Number of entries removed so far (expired, evicted, or invalidated).
	pub fn removed(&self) -> u64 {
		self.removed.load(Ordering::Relaxed)
	}

	fn load(&self, key: &CacheKey) -> Result<Cookies> {
		let span = FlowSpan::new(FlowKind::CookieLoad, "load").with_principal(key.principal().name());
		let _guard = span.clone().entered();
		let started = Instant::now();

		obs::record_flow_outcome(FlowKind::CookieLoad, FlowOutcome::Attempt);
		obs::log!(info, "Loading an authenticated session for {key}.");

		let result = match self
			.loader
			.obtain_ticket(key)
			.and_then(|ticket| self.loader.open_session(key, &ticket))
		{
			Ok(cookies) if cookies.is_empty() =>
				Err(Error::NoSessionCookies { url: key.target_service().to_owned(), status: 0 }),
			Ok(cookies) => {
				obs::log!(info, "Loaded {} session cookies for {key}.", cookies.len());

				Ok(Arc::new(cookies))
			},
			Err(e) => {
				obs::log!(warn, "Loading an authenticated session for {key} failed: {e}.");

				Err(e)
			},
		};
		let outcome = if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

		span.record_outcome(outcome);
		obs::record_flow_outcome(FlowKind::CookieLoad, outcome);
		obs::record_flow_duration(FlowKind::CookieLoad, outcome, started.elapsed());

		result
	}
}
impl<L> Debug for BlockingUserCookieCache<L>
where
	L: ?Sized + CookieLoader,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BlockingUserCookieCache")
			.field("entries", &self.cache.entry_count())
			.field("removed", &self.removed())
			.finish()
	}
}

fn removal_label(cause: RemovalCause) -> &'static str {
	match cause {
		RemovalCause::Expired => "expired",
		RemovalCause::Explicit => "explicit",
		RemovalCause::Replaced => "replaced",
		RemovalCause::Size => "size",
	}
}

/// Loader used when none is named: [`CasCookieLoader`] with the `reqwest` feature.
#[cfg(feature = "reqwest")]
pub type DefaultCookieLoader = CasCookieLoader;
/// Loader used when none is named; without `reqwest` a loader must always be supplied.
#[cfg(not(feature = "reqwest"))]
pub type DefaultCookieLoader = dyn CookieLoader;
