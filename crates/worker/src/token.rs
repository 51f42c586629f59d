use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

/// Monotonic generation clock.
///
/// Hands out strictly increasing IDs starting at 1. Clones share the same
/// counter, so one clock can be handed to several producers.
#[derive(Debug, Default, Clone)]
pub struct GenerationClock {
	next: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Creates a new generation clock starting at generation 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Advances the clock and returns the new generation ID.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}

	/// Returns the most recently issued generation, or 0 if none was issued.
	pub fn current(&self) -> u64 {
		self.next.load(Ordering::Acquire)
	}

	/// Returns true when `generation` is still the latest issued one.
	pub fn is_current(&self, generation: u64) -> bool {
		self.current() == generation
	}
}

/// Cancellation signals for one task.
///
/// `cancel` is the cooperative stop request observed by task work. `interrupt`
/// additionally drops the work future at its current await point.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelSignal {
	cancel: CancellationToken,
	interrupt: CancellationToken,
}

impl CancelSignal {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	/// Requests cooperative cancellation.
	pub(crate) fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Requests cancellation and preemption of the pending await.
	pub(crate) fn interrupt(&self) {
		self.cancel.cancel();
		self.interrupt.cancel();
	}

	pub(crate) fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	pub(crate) async fn cancelled(&self) {
		self.cancel.cancelled().await;
	}

	pub(crate) async fn interrupted(&self) {
		self.interrupt.cancelled().await;
	}

	/// Drives `fut` until it completes or cancellation is requested.
	pub(crate) async fn run_until_cancelled<F>(&self, fut: F) -> Option<F::Output>
	where
		F: Future,
	{
		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => None,
			out = fut => Some(out),
		}
	}
}
