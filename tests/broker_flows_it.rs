// std
use std::{
	collections::HashSet,
	sync::atomic::{AtomicBool, AtomicUsize, Ordering},
	time::Duration as StdDuration,
};
// crates.io
use http::{Method, Request, Response, StatusCode, header};
// self
use cas_broker::{
	_preludet::*,
	auth::{Principal, ProxyTicketFuture, ProxyTicketSource},
	broker::SessionBroker,
	config::{CasConfig, CasConfigBuilder, EstimatedValidity},
	http::{CasHttpClient, HttpFuture, HttpRequest, HttpResponse},
	url::form_urlencoded,
};

const BASE: &str = "https://fake.example.com";

/// Scripted CAS server plus target service.
///
/// Tickets and sessions are numbered in issue order (`TGT-1`, `ST-1`, `S-1`, ...). The target
/// accepts any session or ticket except the rejected ones.
#[derive(Default)]
struct FakeCas {
	delay: StdDuration,
	ticket_granting_tickets: AtomicUsize,
	service_tickets: AtomicUsize,
	sessions: AtomicUsize,
	target_calls: AtomicUsize,
	revoked: Mutex<HashSet<String>>,
	revoke_every_ticket_granting_ticket: AtomicBool,
	rejected: Mutex<HashSet<String>>,
	reject_everything: AtomicBool,
	login_redirect: Option<String>,
	redirect_elsewhere: AtomicBool,
	/// Holds the first target response this long, then rejects it.
	slow_first_rejection: Option<StdDuration>,
	slow_rejection_sent: AtomicBool,
}
impl FakeCas {
	fn count(counter: &AtomicUsize) -> usize {
		counter.load(Ordering::SeqCst)
	}

	fn respond(&self, request: &HttpRequest) -> HttpResponse {
		let path = request.uri().path();
		let query = request.uri().query().unwrap_or_default();

		match (request.method(), path) {
			(&Method::POST, "/cas/v1/tickets") => {
				let body = String::from_utf8_lossy(request.body());

				if body != "username=alice&password=pw" {
					return status(StatusCode::UNAUTHORIZED);
				}

				let n = self.ticket_granting_tickets.fetch_add(1, Ordering::SeqCst) + 1;

				Response::builder()
					.status(StatusCode::CREATED)
					.header(header::LOCATION, format!("{BASE}/cas/v1/tickets/TGT-{n}"))
					.body(Vec::new())
					.expect("Fake response should build.")
			},
			(&Method::POST, path) if path.starts_with("/cas/v1/tickets/") => {
				let ticket_granting_ticket = path.trim_start_matches("/cas/v1/tickets/");

				if self.revoke_every_ticket_granting_ticket.load(Ordering::SeqCst)
					|| self.revoked.lock().contains(ticket_granting_ticket)
				{
					return status(StatusCode::NOT_FOUND);
				}

				let n = self.service_tickets.fetch_add(1, Ordering::SeqCst) + 1;

				text(StatusCode::OK, format!("ST-{n}"))
			},
			(&Method::GET, "/service/j_spring_cas_security_check") => {
				if query_value(query, "ticket").is_none() {
					return status(StatusCode::BAD_REQUEST);
				}

				let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;

				Response::builder()
					.status(StatusCode::FOUND)
					.header(header::LOCATION, "/service/")
					.header(header::SET_COOKIE, format!("JSESSIONID=S-{n}; Path=/service; HttpOnly"))
					.body(Vec::new())
					.expect("Fake response should build.")
			},
			_ => self.target(request),
		}
	}

	fn target(&self, request: &HttpRequest) -> HttpResponse {
		self.target_calls.fetch_add(1, Ordering::SeqCst);

		let presented = query_value(request.uri().query().unwrap_or_default(), "ticket")
			.or_else(|| session_cookie(request));
		let Some(presented) = presented else {
			return status(StatusCode::UNAUTHORIZED);
		};

		if self.redirect_elsewhere.load(Ordering::SeqCst) {
			return redirect("https://elsewhere.example.com/");
		}
		if self.reject_everything.load(Ordering::SeqCst) || self.rejected.lock().contains(&presented)
		{
			return match &self.login_redirect {
				Some(location) => redirect(location),
				None => status(StatusCode::UNAUTHORIZED),
			};
		}

		text(StatusCode::OK, presented)
	}
}
impl CasHttpClient for FakeCas {
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_> {
		Box::pin(async move {
			if !self.delay.is_zero() {
				tokio::time::sleep(self.delay).await;
			}
			if let Some(hold) = self.slow_first_rejection
				&& request.uri().path() == "/service/api"
				&& !self.slow_rejection_sent.swap(true, Ordering::SeqCst)
			{
				tokio::time::sleep(hold).await;
				self.target_calls.fetch_add(1, Ordering::SeqCst);

				return Ok(status(StatusCode::UNAUTHORIZED));
			}

			Ok(self.respond(&request))
		})
	}
}

struct CountingProxyTickets(AtomicUsize);
impl ProxyTicketSource for CountingProxyTickets {
	fn proxy_ticket_for<'a>(&'a self, target_service: &'a str) -> ProxyTicketFuture<'a> {
		Box::pin(async move {
			assert!(target_service.ends_with("/service/j_spring_cas_security_check"));

			let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;

			Ok(format!("PT-{n}"))
		})
	}
}

fn status(status: StatusCode) -> HttpResponse {
	Response::builder().status(status).body(Vec::new()).expect("Fake response should build.")
}

fn text(status: StatusCode, body: String) -> HttpResponse {
	Response::builder().status(status).body(body.into_bytes()).expect("Fake response should build.")
}

fn redirect(location: &str) -> HttpResponse {
	Response::builder()
		.status(StatusCode::FOUND)
		.header(header::LOCATION, location)
		.body(Vec::new())
		.expect("Fake response should build.")
}

fn query_value(query: &str, name: &str) -> Option<String> {
	form_urlencoded::parse(query.as_bytes()).find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
}

fn session_cookie(request: &HttpRequest) -> Option<String> {
	request
		.headers()
		.get(header::COOKIE)
		.and_then(|v| v.to_str().ok())
		.into_iter()
		.flat_map(|v| v.split(';'))
		.filter_map(|pair| pair.trim().strip_prefix("JSESSIONID="))
		.map(str::to_owned)
		.next()
}

fn alice() -> Principal {
	Principal::password("alice", "pw").expect("Principal should be valid.")
}

fn broker(fake: &Arc<FakeCas>, config: CasConfig, principal: Principal) -> SessionBroker<FakeCas> {
	SessionBroker::<FakeCas>::with_http_client(config, principal, fake.clone())
}

fn api_request() -> HttpRequest {
	Request::builder()
		.method(Method::GET)
		.uri(format!("{BASE}/service/api?page=1"))
		.body(Vec::new())
		.expect("Test request should build.")
}

fn body(response: &HttpResponse) -> String {
	String::from_utf8_lossy(response.body()).into_owned()
}

#[tokio::test]
async fn concurrent_callers_share_one_login() {
	let fake = Arc::new(FakeCas { delay: StdDuration::from_millis(50), ..Default::default() });
	let broker = broker(&fake, test_config(BASE), alice());
	let handles = (0..32)
		.map(|_| {
			let broker = broker.clone();

			tokio::spawn(async move { broker.get_session().await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let session = handle
			.await
			.expect("Session task should not panic.")
			.expect("Session should be issued.");

		assert_eq!(session.expose(), "S-1");
	}

	assert_eq!(FakeCas::count(&fake.ticket_granting_tickets), 1);
	assert_eq!(FakeCas::count(&fake.service_tickets), 1);
	assert_eq!(FakeCas::count(&fake.sessions), 1);
	assert_eq!(broker.metrics().session_fetches(), 1);
	assert_eq!(broker.metrics().ticket_granting_ticket_fetches(), 1);
}

#[tokio::test]
async fn valid_session_is_reused() {
	let fake = Arc::new(FakeCas::default());
	let broker = broker(&fake, test_config(BASE), alice());
	let first = broker.get_session().await.expect("First session should be issued.");
	let second = broker.get_session().await.expect("Second call should reuse the session.");

	assert_eq!(first, second);
	assert_eq!(FakeCas::count(&fake.sessions), 1);
}

#[tokio::test]
async fn expired_session_renews_through_the_cached_ticket_granting_ticket() {
	let fake = Arc::new(FakeCas::default());
	let config = CasConfigBuilder::spring_session(
		Url::parse(&format!("{BASE}/cas")).expect("CAS URL should parse."),
		Url::parse(&format!("{BASE}/service")).expect("Service URL should parse."),
	)
	.csrf("csrf-token")
	.caller_id("1.2.246.562.10.00000000001.test")
	.validity(EstimatedValidity { session: Duration::milliseconds(200), ..Default::default() })
	.build()
	.expect("Config should be valid.");
	let broker = broker(&fake, config, alice());

	assert_eq!(broker.get_session().await.expect("Session should be issued.").expose(), "S-1");

	tokio::time::sleep(StdDuration::from_millis(300)).await;

	assert_eq!(broker.get_session().await.expect("Session should be renewed.").expose(), "S-2");
	assert_eq!(FakeCas::count(&fake.ticket_granting_tickets), 1);
	assert_eq!(FakeCas::count(&fake.service_tickets), 2);
}

#[tokio::test]
async fn execute_reuses_the_session_and_extends_it() {
	let fake = Arc::new(FakeCas::default());
	let broker = broker(&fake, test_config(BASE), alice());
	let first = broker.execute(api_request()).await.expect("First request should succeed.");
	let second = broker.execute(api_request()).await.expect("Second request should succeed.");

	assert_eq!(first.status(), StatusCode::OK);
	assert_eq!(body(&second), "S-1");
	assert_eq!(FakeCas::count(&fake.sessions), 1);
	assert_eq!(broker.metrics().session_extensions(), 1);
	assert_eq!(broker.metrics().retries(), 0);
}

#[tokio::test]
async fn rejected_session_is_renewed_and_the_request_retried_once() {
	let fake = Arc::new(FakeCas::default());
	let broker = broker(&fake, test_config(BASE), alice());

	broker.get_session().await.expect("Session should be issued.");
	fake.rejected.lock().insert("S-1".into());

	let response = broker.execute(api_request()).await.expect("Retried request should succeed.");

	assert_eq!(body(&response), "S-2");
	assert_eq!(FakeCas::count(&fake.target_calls), 2);
	assert_eq!(FakeCas::count(&fake.ticket_granting_tickets), 2);
	assert_eq!(broker.metrics().retries(), 1);
	assert_eq!(broker.get_session().await.expect("Renewed session should be cached.").expose(), "S-2");
}

#[tokio::test]
async fn rejection_replaces_a_session_extended_by_another_caller() {
	let fake = Arc::new(FakeCas {
		slow_first_rejection: Some(StdDuration::from_millis(150)),
		..Default::default()
	});
	let broker = broker(&fake, test_config(BASE), alice());

	broker.get_session().await.expect("Session should be issued.");

	let rejected = tokio::spawn({
		let broker = broker.clone();

		async move { broker.execute(api_request()).await }
	});

	tokio::time::sleep(StdDuration::from_millis(30)).await;

	let accepted = broker.execute(api_request()).await.expect("Concurrent request should succeed.");

	assert_eq!(body(&accepted), "S-1");
	assert_eq!(broker.metrics().session_extensions(), 1);

	let retried = rejected
		.await
		.expect("Rejected request task should not panic.")
		.expect("Rejected request should succeed after renewal.");

	assert_eq!(body(&retried), "S-2");
	assert_eq!(FakeCas::count(&fake.sessions), 2);
	assert_eq!(FakeCas::count(&fake.ticket_granting_tickets), 2);
	assert_eq!(FakeCas::count(&fake.target_calls), 3);
	assert_eq!(broker.metrics().retries(), 1);
	assert_eq!(broker.get_session().await.expect("Renewed session should be cached.").expose(), "S-2");
}

#[tokio::test]
async fn expired_ticket_granting_ticket_is_fetched_again() {
	let fake = Arc::new(FakeCas::default());
	let config = CasConfigBuilder::spring_session(
		Url::parse(&format!("{BASE}/cas")).expect("CAS URL should parse."),
		Url::parse(&format!("{BASE}/service")).expect("Service URL should parse."),
	)
	.csrf("csrf-token")
	.caller_id("1.2.246.562.10.00000000001.test")
	.validity(EstimatedValidity {
		ticket_granting_ticket: Duration::milliseconds(200),
		..Default::default()
	})
	.build()
	.expect("Config should be valid.");
	let broker = broker(&fake, config, alice());

	assert_eq!(broker.get_session().await.expect("Session should be issued.").expose(), "S-1");
	assert_eq!(broker.renew_session(false).await.expect("Session should renew.").expose(), "S-2");
	assert_eq!(broker.metrics().ticket_granting_ticket_fetches(), 1);

	tokio::time::sleep(StdDuration::from_millis(300)).await;

	assert_eq!(broker.renew_session(false).await.expect("Session should renew.").expose(), "S-3");
	assert_eq!(FakeCas::count(&fake.ticket_granting_tickets), 2);
	assert_eq!(broker.metrics().ticket_granting_ticket_fetches(), 2);
}

#[tokio::test]
async fn second_rejection_fails_without_a_third_attempt() {
	let fake = Arc::new(FakeCas { reject_everything: AtomicBool::new(true), ..Default::default() });
	let broker = broker(&fake, test_config(BASE), alice());
	let err = broker.execute(api_request()).await.expect_err("Request should fail after one retry.");

	assert!(err.is_authentication_failed());
	assert!(matches!(err, Error::AuthenticationFailed { status: 401, ref url } if !url.contains("page=1")));
	assert_eq!(FakeCas::count(&fake.target_calls), 2);
	assert_eq!(broker.metrics().authentication_failures(), 1);
}

#[tokio::test]
async fn login_redirect_is_a_rejection() {
	let config = test_config(BASE);
	let fake = Arc::new(FakeCas {
		login_redirect: Some(config.login_redirect_location()),
		..Default::default()
	});
	let broker = broker(&fake, config, alice());

	broker.get_session().await.expect("Session should be issued.");
	fake.rejected.lock().insert("S-1".into());

	let response = broker.execute(api_request()).await.expect("Retried request should succeed.");

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(body(&response), "S-2");
	assert_eq!(broker.metrics().retries(), 1);
}

#[tokio::test]
async fn other_redirects_pass_through() {
	let fake = Arc::new(FakeCas { redirect_elsewhere: AtomicBool::new(true), ..Default::default() });
	let broker = broker(&fake, test_config(BASE), alice());
	let response = broker.execute(api_request()).await.expect("Redirect should pass through.");

	assert_eq!(response.status(), StatusCode::FOUND);
	assert_eq!(FakeCas::count(&fake.target_calls), 1);
	assert_eq!(broker.metrics().retries(), 0);
}

#[tokio::test]
async fn refused_cached_ticket_granting_ticket_is_renewed_once() {
	let fake = Arc::new(FakeCas::default());
	let broker = broker(&fake, test_config(BASE), alice());

	broker.get_session().await.expect("Session should be issued.");
	fake.revoked.lock().insert("TGT-1".into());
	broker.invalidate_session();

	let session = broker.get_session().await.expect("Session should be renewed via a new TGT.");

	assert_eq!(session.expose(), "S-2");
	assert_eq!(FakeCas::count(&fake.ticket_granting_tickets), 2);
	assert_eq!(broker.metrics().ticket_granting_ticket_fetches(), 2);
}

#[tokio::test]
async fn refused_fresh_ticket_granting_ticket_is_not_retried() {
	let fake = Arc::new(FakeCas {
		revoke_every_ticket_granting_ticket: AtomicBool::new(true),
		..Default::default()
	});
	let broker = broker(&fake, test_config(BASE), alice());
	let err = broker.get_session().await.expect_err("Session should not be issued.");

	assert!(matches!(err.root(), Error::ServiceTicket { status: 404, .. }));
	assert_eq!(FakeCas::count(&fake.ticket_granting_tickets), 1);

	// The failure stays observable until the next caller replaces it.
	fake.revoke_every_ticket_granting_ticket.store(false, Ordering::SeqCst);

	assert_eq!(broker.get_session().await.expect("Session should recover.").expose(), "S-1");
}

#[tokio::test]
async fn bad_password_fails_the_session_renewal() {
	let fake = Arc::new(FakeCas::default());
	let principal = Principal::password("alice", "wrong").expect("Principal should be valid.");
	let broker = broker(&fake, test_config(BASE), principal);
	let err = broker.get_session().await.expect_err("Wrong password should fail.");

	assert!(matches!(err, Error::Renewal { .. }));
	assert!(matches!(err.root(), Error::TicketGrantingTicket { status: 401, .. }));
	assert_eq!(FakeCas::count(&fake.sessions), 0);
}

#[tokio::test]
async fn service_ticket_requests_retry_with_a_new_ticket_granting_ticket() {
	let fake = Arc::new(FakeCas::default());
	let broker = broker(&fake, test_config(BASE), alice());
	let response = broker
		.execute_with_service_ticket(api_request())
		.await
		.expect("Service-ticket request should succeed.");

	assert_eq!(body(&response), "ST-1");

	fake.rejected.lock().insert("ST-2".into());

	let response = broker
		.execute_with_service_ticket(api_request())
		.await
		.expect("Retried service-ticket request should succeed.");

	assert_eq!(body(&response), "ST-3");
	assert_eq!(FakeCas::count(&fake.ticket_granting_tickets), 2);
	assert_eq!(broker.metrics().retries(), 1);
	assert_eq!(FakeCas::count(&fake.sessions), 0);
}

#[tokio::test]
async fn proxy_principals_skip_the_ticket_granting_ticket() {
	let fake = Arc::new(FakeCas::default());
	let source = Arc::new(CountingProxyTickets(AtomicUsize::new(0)));
	let principal = Principal::proxy("bob", source.clone()).expect("Principal should be valid.");
	let broker = broker(&fake, test_config(BASE), principal);
	let response = broker.execute(api_request()).await.expect("Proxy request should succeed.");

	assert_eq!(body(&response), "S-1");
	assert_eq!(FakeCas::count(&fake.ticket_granting_tickets), 0);
	assert_eq!(source.0.load(Ordering::SeqCst), 1);

	let response = broker
		.execute_with_service_ticket(api_request())
		.await
		.expect("Proxy-ticket request should succeed.");

	assert_eq!(body(&response), "PT-2");
}

#[tokio::test]
async fn renew_session_replaces_the_observed_session() {
	let fake = Arc::new(FakeCas::default());
	let broker = broker(&fake, test_config(BASE), alice());

	assert_eq!(broker.get_session().await.expect("Session should be issued.").expose(), "S-1");
	assert_eq!(broker.renew_session(false).await.expect("Session should renew.").expose(), "S-2");
	assert_eq!(FakeCas::count(&fake.ticket_granting_tickets), 1);
	assert_eq!(broker.renew_session(true).await.expect("Session should renew.").expose(), "S-3");
	assert_eq!(FakeCas::count(&fake.ticket_granting_tickets), 2);
}
