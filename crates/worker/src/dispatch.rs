//! UI-thread callback marshalling.
//!
//! Worker threads never touch UI state. They post boxed callbacks through a
//! cloneable [`UiDispatcher`]; the single UI thread owns the matching
//! [`UiQueue`] and runs them, either in budgeted batches from its event loop
//! ([`UiQueue::pump`]) or one at a time from an async loop ([`UiQueue::next`]).

use tokio::sync::mpsc;

/// Callback marshalled onto the UI thread.
pub type UiCallback = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable posting side of a [`UiQueue`].
#[derive(Clone)]
pub struct UiDispatcher {
	tx: mpsc::UnboundedSender<UiCallback>,
}

impl std::fmt::Debug for UiDispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("UiDispatcher").field("closed", &self.tx.is_closed()).finish()
	}
}

impl UiDispatcher {
	/// Posts a callback. Returns false if the UI queue has been dropped, in
	/// which case the callback is discarded.
	pub fn post(&self, f: impl FnOnce() + Send + 'static) -> bool {
		let posted = self.tx.send(Box::new(f)).is_ok();
		if !posted {
			tracing::trace!("ui.post.closed");
		}
		posted
	}
}

/// Outcome of one [`UiQueue::pump`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
	/// Callbacks executed.
	pub ran: usize,
	/// True when the budget stopped the pump before the queue ran dry.
	pub budget_exhausted: bool,
}

/// UI-thread receiving side of the dispatcher.
pub struct UiQueue {
	rx: mpsc::UnboundedReceiver<UiCallback>,
	tx: mpsc::UnboundedSender<UiCallback>,
}

impl std::fmt::Debug for UiQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("UiQueue").finish_non_exhaustive()
	}
}

impl Default for UiQueue {
	fn default() -> Self {
		Self::new()
	}
}

impl UiQueue {
	pub fn new() -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		Self { rx, tx }
	}

	/// Returns a posting handle.
	pub fn dispatcher(&self) -> UiDispatcher {
		UiDispatcher { tx: self.tx.clone() }
	}

	/// Runs up to `budget` ready callbacks without waiting.
	pub fn pump(&mut self, budget: usize) -> PumpReport {
		let mut report = PumpReport::default();
		while report.ran < budget {
			match self.rx.try_recv() {
				Ok(callback) => {
					callback();
					report.ran += 1;
				}
				Err(_) => return report,
			}
		}
		report.budget_exhausted = !self.rx.is_empty();
		report
	}

	/// Waits for the next callback and runs it.
	///
	/// Never returns `false` while the queue itself holds a sender; the return
	/// value exists for loops that select over several sources.
	pub async fn next(&mut self) -> bool {
		match self.rx.recv().await {
			Some(callback) => {
				callback();
				true
			}
			None => false,
		}
	}
}
