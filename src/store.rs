//! Single-flight slots that hold at most one in-flight or completed credential fetch.
//!
//! A [`SingleFlightStore`] owns one slot. Callers either join the [`FetchProcess`] already in
//! the slot or install a new one; replacement is a compare-and-swap against the exact process
//! a caller last observed, so a caller that lost a race never overwrites a fresher credential.
//! The slot is only written through [`SingleFlightStore::compare_and_swap`] and its wrappers.
//!
//! Fetches are lazy shared futures: they make progress while at least one caller polls them,
//! dropping one observer never cancels the others, and a process that loses the install race
//! is dropped before it was ever polled. Completed outcomes (including failures) stay in the
//! slot until they are replaced or cleared.

// crates.io
use futures::{
	FutureExt,
	future::{BoxFuture, Shared},
};
// self
use crate::_prelude::*;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Result of a [`SingleFlightStore::compare_and_swap`] attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapOutcome {
	/// The slot still held the expected process and now holds the replacement.
	Swapped,
	/// Another caller changed the slot first; the replacement was discarded.
	Lost,
}

enum FetchState<V> {
	Ready(Result<V>),
	Pending(SharedFetch<V>),
}

/// One in-flight or completed fetch, shared by every caller that observed it.
pub struct FetchProcess<V> {
	state: FetchState<V>,
	started_at: OffsetDateTime,
}
impl<V> FetchProcess<V>
where
	V: 'static + Clone + Send + Sync,
{
	/// Wraps `fetch` in a shared process. Nothing runs until the first caller awaits it.
	pub fn start<Fut>(fetch: Fut) -> Arc<Self>
	where
		Fut: 'static + Future<Output = Result<V>> + Send,
	{
		Arc::new(Self {
			state: FetchState::Pending(fetch.boxed().shared()),
			started_at: OffsetDateTime::now_utc(),
		})
	}

	/// Builds an already-completed process holding `value`.
	pub fn ready(value: V) -> Arc<Self> {
		Arc::new(Self { state: FetchState::Ready(Ok(value)), started_at: OffsetDateTime::now_utc() })
	}

	/// Waits for the shared outcome.
	pub async fn outcome(&self) -> Result<V> {
		match &self.state {
			FetchState::Ready(outcome) => outcome.clone(),
			FetchState::Pending(fetch) => fetch.clone().await,
		}
	}

	/// Returns the outcome without waiting, or `None` while the fetch is still in flight.
	pub fn peek(&self) -> Option<Result<V>> {
		match &self.state {
			FetchState::Ready(outcome) => Some(outcome.clone()),
			FetchState::Pending(fetch) => fetch.peek().cloned(),
		}
	}

	/// Instant the process was created.
	pub fn started_at(&self) -> OffsetDateTime {
		self.started_at
	}
}
impl<V> Debug for FetchProcess<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = match &self.state {
			FetchState::Ready(Ok(_)) => "ready",
			FetchState::Ready(Err(_)) => "failed",
			FetchState::Pending(_) => "pending",
		};

		f.debug_struct("FetchProcess")
			.field("state", &state)
			.field("started_at", &self.started_at)
			.finish()
	}
}

/// Slot holding at most one [`FetchProcess`].
pub struct SingleFlightStore<V> {
	label: &'static str,
	slot: Mutex<Option<Arc<FetchProcess<V>>>>,
}
impl<V> SingleFlightStore<V>
where
	V: 'static + Clone + Send + Sync,
{
	/// Creates an empty slot; `label` only appears in logs.
	pub fn new(label: &'static str) -> Self {
		Self { label, slot: Mutex::new(None) }
	}

	/// Returns the process currently held, if any.
	pub fn current(&self) -> Option<Arc<FetchProcess<V>>> {
		self.slot.lock().clone()
	}

	/// Returns the stored process, or installs one produced by `fetch` when the slot is empty.
	///
	/// `fetch` runs at most once per call and only to build the future; when a concurrent
	/// caller installs first, the freshly built process is dropped unpolled and the winner is
	/// returned instead.
	pub fn get_or_start<F, Fut>(&self, fetch: F) -> Arc<FetchProcess<V>>
	where
		F: FnOnce() -> Fut,
		Fut: 'static + Future<Output = Result<V>> + Send,
	{
		if let Some(current) = self.current() {
			return current;
		}

		self.install(None, fetch)
	}

	/// Starts a replacement for `expected`, the process the caller last observed.
	///
	/// When the slot no longer holds `expected`, the process that replaced it is returned and
	/// `fetch` is never invoked.
	pub fn replace<F, Fut>(&self, expected: Option<&Arc<FetchProcess<V>>>, fetch: F) -> Arc<FetchProcess<V>>
	where
		F: FnOnce() -> Fut,
		Fut: 'static + Future<Output = Result<V>> + Send,
	{
		if let Some(winner) = self.slot.lock().as_ref().filter(|current| !same(Some(*current), expected)) {
			return winner.clone();
		}

		self.install(expected, fetch)
	}

	/// Starts a replacement unless the slot holds a process that `is_stale` does not reject.
	///
	/// The check and the install happen under one lock, so a fresh process installed by another
	/// caller is joined while every process matching `is_stale` is replaced. An empty slot is
	/// always filled.
	pub fn replace_stale<S, F, Fut>(&self, is_stale: S, fetch: F) -> Arc<FetchProcess<V>>
	where
		S: Fn(&FetchProcess<V>) -> bool,
		F: FnOnce() -> Fut,
		Fut: 'static + Future<Output = Result<V>> + Send,
	{
		let mut slot = self.slot.lock();

		if let Some(fresh) = slot.as_ref().filter(|current| !is_stale(current)) {
			return fresh.clone();
		}

		let process = FetchProcess::start(fetch());

		*slot = Some(process.clone());

		process
	}

	/// Atomically swaps `replacement` in if the slot still holds `expected`.
	pub fn compare_and_swap(
		&self,
		expected: Option<&Arc<FetchProcess<V>>>,
		replacement: Arc<FetchProcess<V>>,
	) -> SwapOutcome {
		let mut slot = self.slot.lock();

		if same(slot.as_ref(), expected) {
			*slot = Some(replacement);

			SwapOutcome::Swapped
		} else {
			SwapOutcome::Lost
		}
	}

	/// Empties the slot so the next caller starts fresh.
	///
	/// Callers already awaiting the removed process still receive its outcome.
	pub fn clear(&self) -> Option<Arc<FetchProcess<V>>> {
		self.slot.lock().take()
	}

	/// Empties the slot only if it still holds `expected`.
	pub fn clear_if(&self, expected: &Arc<FetchProcess<V>>) -> bool {
		let mut slot = self.slot.lock();

		if same(slot.as_ref(), Some(expected)) {
			*slot = None;

			true
		} else {
			false
		}
	}

	fn install<F, Fut>(&self, expected: Option<&Arc<FetchProcess<V>>>, fetch: F) -> Arc<FetchProcess<V>>
	where
		F: FnOnce() -> Fut,
		Fut: 'static + Future<Output = Result<V>> + Send,
	{
		let process = FetchProcess::start(fetch());
		let mut slot = self.slot.lock();

		match slot.as_ref() {
			Some(winner) if !same(Some(winner), expected) => {
				crate::obs::log!(
					debug,
					"Lost the {} slot race; joining the process installed by another caller.",
					self.label
				);

				winner.clone()
			},
			_ => {
				*slot = Some(process.clone());

				process
			},
		}
	}
}
impl<V> Debug for SingleFlightStore<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SingleFlightStore")
			.field("label", &self.label)
			.field("current", &*self.slot.lock())
			.finish()
	}
}

fn same<V>(a: Option<&Arc<FetchProcess<V>>>, b: Option<&Arc<FetchProcess<V>>>) -> bool {
	match (a, b) {
		(None, None) => true,
		(Some(a), Some(b)) => Arc::ptr_eq(a, b),
		_ => false,
	}
}
