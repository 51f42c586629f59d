//! Debounced search coordinator.
//! Anchor ID: ONTOPICK_ANCHOR_SEARCH_PANE
//!
//! # Mental model
//!
//! * Every keystroke is renewed intent and schedules one settle check.
//! * `pending` counts scheduled checks not yet resolved. A check that finds
//!   `pending == 1` is the last one of its burst and fires; every other check
//!   just decrements and exits.
//! * Firing bumps the pane generation and tags the query with it. A completed
//!   query is applied only while its tag is still the current generation.
//!
//! # Invariants
//!
//! * At most one query fires per burst of keystrokes closer together than `settle`.
//! * A result is applied only if its generation equals the current generation.
//! * Queries shorter than `min_query_len` never reach the port.
//! * View updates happen on the UI thread and only while the view is alive.
//!
//! # Data flow
//!
//! 1. `on_input` records the text and schedules a settle timer.
//! 2. The timer resolves the check; the firing check posts `fire` to the UI thread.
//! 3. `fire` bumps the generation, cancels the superseded query, submits a [`Task`].
//! 4. The task's completion runs `apply` on the UI thread.
//!
//! # Failure modes & recovery
//!
//! * Search failure: results cleared, error shown, busy cleared. No retry.
//! * Superseded query: cooperatively cancelled (unless `cancel_superseded` is
//!   off); any outcome it still produces is discarded as stale.
//! * View torn down: completion is dropped without touching the view.
//! * Pane dropped: pending timers find no pane and exit.

use std::sync::{Arc, Weak};
use std::time::Duration;

use ontopick_remote::{OntologyId, QueryError, SharedPort, Term};
use ontopick_worker::{GenerationClock, Task, TaskHandle, TaskManager, TaskOutcome};
use parking_lot::Mutex;

use crate::SearchView;

/// Debounce settings for one pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
	/// Quiet period after the last keystroke before a query fires.
	pub settle: Duration,
	/// Shortest query, in characters, that reaches the remote port.
	pub min_query_len: usize,
	/// Cancel the in-flight query when a newer one fires. Its late result is
	/// discarded by the generation check either way.
	pub cancel_superseded: bool,
}

impl Default for SearchConfig {
	fn default() -> Self {
		Self {
			settle: Duration::from_millis(1000),
			min_query_len: 3,
			cancel_superseded: true,
		}
	}
}

/// What happened to one completed search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
	/// Results replaced the view's list.
	Applied,
	/// The search failed; the list was cleared and the error shown.
	Failed,
	/// The search was cancelled; only the busy indicator was cleared.
	Cancelled,
	/// A newer search superseded this one; nothing was touched.
	Stale,
	/// The view was torn down before the result arrived.
	ViewGone,
}

#[derive(Debug, Default)]
struct Debounce {
	pending: usize,
	epoch: u64,
}

struct PaneInner<V> {
	name: Arc<str>,
	scope: Option<OntologyId>,
	config: SearchConfig,
	debounce: Mutex<Debounce>,
	generation: GenerationClock,
	text: Mutex<String>,
	in_flight: Mutex<Option<TaskHandle>>,
	manager: TaskManager,
	port: SharedPort,
	view: Weak<V>,
}

/// One search field with its own debounce state and generation counter.
pub struct SearchPane<V> {
	inner: Arc<PaneInner<V>>,
}

impl<V> std::fmt::Debug for SearchPane<V> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SearchPane")
			.field("name", &self.inner.name)
			.field("scope", &self.inner.scope)
			.field("generation", &self.inner.generation.current())
			.finish_non_exhaustive()
	}
}

impl<V: SearchView> SearchPane<V> {
	/// Creates a pane searching `scope` (or every ontology when `None`).
	///
	/// The pane holds the view weakly; dropping the view disables updates.
	pub fn new(name: impl Into<Arc<str>>, scope: Option<OntologyId>, config: SearchConfig, manager: TaskManager, port: SharedPort, view: &Arc<V>) -> Self {
		Self {
			inner: Arc::new(PaneInner {
				name: name.into(),
				scope,
				config,
				debounce: Mutex::new(Debounce::default()),
				generation: GenerationClock::new(),
				text: Mutex::new(String::new()),
				in_flight: Mutex::new(None),
				manager,
				port,
				view: Arc::downgrade(view),
			}),
		}
	}

	pub fn scope(&self) -> Option<&OntologyId> {
		self.inner.scope.as_ref()
	}

	/// Current search generation; 0 before the first fire.
	pub fn generation(&self) -> u64 {
		self.inner.generation.current()
	}

	/// Settle checks scheduled but not yet resolved.
	pub fn pending(&self) -> usize {
		self.inner.debounce.lock().pending
	}

	/// Returns true while a fired query has not completed.
	pub fn is_searching(&self) -> bool {
		self.inner.in_flight.lock().as_ref().is_some_and(|handle| !handle.is_finished())
	}

	/// Records one keystroke's worth of input.
	///
	/// Every call re-arms the debounce, even when `text` did not change.
	pub fn on_input(&self, text: impl Into<String>) {
		*self.inner.text.lock() = text.into();
		let epoch = {
			let mut debounce = self.inner.debounce.lock();
			debounce.pending += 1;
			debounce.epoch
		};

		let weak = Arc::downgrade(&self.inner);
		let settle = self.inner.config.settle;
		self.inner.manager.runtime().spawn(async move {
			tokio::time::sleep(settle).await;
			if let Some(inner) = weak.upgrade() {
				inner.on_settled(epoch);
			}
		});
	}

	/// Abandons the current intent: pending checks are dropped, the in-flight
	/// query is cancelled and any late result is treated as stale.
	pub fn cancel(&self) {
		{
			let mut debounce = self.inner.debounce.lock();
			debounce.epoch += 1;
			debounce.pending = 0;
		}
		self.inner.generation.next();
		if let Some(handle) = self.inner.in_flight.lock().take() {
			handle.cancel(false);
		}
		tracing::debug!(pane = %self.inner.name, "search.cancel");
	}
}

impl<V: SearchView> PaneInner<V> {
	/// Resolves one settle check. Runs on the timer, not the UI thread.
	fn on_settled(self: Arc<Self>, epoch: u64) {
		let fire = {
			let mut debounce = self.debounce.lock();
			if debounce.epoch != epoch {
				return;
			}
			let last = debounce.pending == 1;
			debounce.pending = debounce.pending.saturating_sub(1);
			last
		};
		if !fire {
			tracing::trace!(pane = %self.name, "search.coalesced");
			return;
		}

		let dispatcher = self.manager.dispatcher().clone();
		dispatcher.post(move || self.fire());
	}

	/// Fires the settled query. Runs on the UI thread.
	fn fire(self: Arc<Self>) {
		let text = self.text.lock().clone();
		let generation = self.generation.next();
		if let Some(previous) = self.in_flight.lock().take()
			&& self.config.cancel_superseded
		{
			previous.cancel(false);
		}

		let Some(view) = self.view.upgrade() else {
			return;
		};
		if text.trim().chars().count() < self.config.min_query_len {
			tracing::trace!(pane = %self.name, generation, "search.placeholder");
			view.set_busy(false);
			view.show_placeholder();
			return;
		}

		tracing::debug!(pane = %self.name, generation, query = %text, "search.fire");
		view.set_busy(true);

		let port = Arc::clone(&self.port);
		let scope = self.scope.clone();
		let query = text.clone();
		let pane = Arc::downgrade(&self);
		let task = Task::new(format!("{}: search '{text}'", self.name), move |ctx| async move {
			match ctx.run_until_cancelled(port.search_terms_by_name(&query, scope.as_ref())).await {
				Some(result) => result,
				None => Err(QueryError::Cancelled),
			}
		})
		.on_complete(move |outcome| {
			if let Some(pane) = pane.upgrade() {
				pane.apply(generation, &text, outcome);
			}
		});

		match self.manager.add_task(task) {
			Ok(handle) => *self.in_flight.lock() = Some(handle),
			Err(err) => {
				tracing::warn!(pane = %self.name, %err, "search.submit_failed");
				view.set_busy(false);
			}
		}
	}

	/// Applies a completed query if it is still the latest one. Runs on the UI thread.
	fn apply(&self, generation: u64, query: &str, outcome: TaskOutcome<Vec<Term>, QueryError>) -> ApplyOutcome {
		if !self.generation.is_current(generation) {
			tracing::trace!(pane = %self.name, generation, current = self.generation.current(), "search.stale");
			return ApplyOutcome::Stale;
		}
		self.in_flight.lock().take();

		let Some(view) = self.view.upgrade() else {
			tracing::trace!(pane = %self.name, generation, "search.view_gone");
			return ApplyOutcome::ViewGone;
		};
		view.set_busy(false);

		match outcome {
			TaskOutcome::Succeeded(terms) => {
				tracing::debug!(pane = %self.name, generation, hits = terms.len(), "search.apply");
				view.show_results(query, &terms);
				ApplyOutcome::Applied
			}
			TaskOutcome::Failed(err) => {
				view.show_results(query, &[]);
				view.show_error(query, &err);
				ApplyOutcome::Failed
			}
			TaskOutcome::Panicked(msg) => {
				view.show_results(query, &[]);
				view.show_error(query, &QueryError::Protocol(msg));
				ApplyOutcome::Failed
			}
			TaskOutcome::Cancelled | TaskOutcome::Interrupted => ApplyOutcome::Cancelled,
		}
	}
}

#[cfg(test)]
mod tests;
