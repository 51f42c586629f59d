//! Task lifecycle types.
//!
//! A [`Task`] is a named unit of deferred work plus an optional completion
//! callback. Once handed to [`crate::TaskManager::add_task`] it is owned by the
//! manager; the submitter keeps a [`TaskHandle`] for inspection and
//! cancellation.
//!
//! ```text
//! Created ──▶ Running ──▶ Succeeded | Failed | Cancelled | Interrupted
//!    │                                  ▲
//!    └──────────── cancel() ────────────┘
//! ```
//!
//! Transitions are monotonic and every right-hand state is terminal.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::manager::ManagerInner;
use crate::token::CancelSignal;

/// Opaque identity of one task submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "task#{}", self.0)
	}
}

/// Lifecycle state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
	/// Registered, waiting for a worker slot.
	Created,
	/// Admitted to a worker slot. The work has been handed to the pool but
	/// may not have been polled yet.
	Running,
	/// Work returned a result.
	Succeeded,
	/// Work returned an error.
	Failed,
	/// Cancelled before it ran, or work observed the cancel signal and returned.
	Cancelled,
	/// Cancelled with interrupt while the work was parked at an await point.
	Interrupted,
}

impl TaskState {
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled | Self::Interrupted)
	}

	/// Returns true for the two terminal states that carry no result.
	pub const fn is_cancelled(self) -> bool {
		matches!(self, Self::Cancelled | Self::Interrupted)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Created => "created",
			Self::Running => "running",
			Self::Succeeded => "succeeded",
			Self::Failed => "failed",
			Self::Cancelled => "cancelled",
			Self::Interrupted => "interrupted",
		}
	}
}

impl fmt::Display for TaskState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Point-in-time view of one task, as published to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
	pub id: TaskId,
	pub name: Arc<str>,
	pub state: TaskState,
	/// Rendered error, present only in [`TaskState::Failed`].
	pub error: Option<Arc<str>>,
}

/// Terminal result delivered to a task's completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T, E> {
	Succeeded(T),
	Failed(E),
	/// Work panicked; the task is reported as [`TaskState::Failed`].
	Panicked(String),
	Cancelled,
	Interrupted,
}

impl<T, E> TaskOutcome<T, E> {
	pub const fn state(&self) -> TaskState {
		match self {
			Self::Succeeded(_) => TaskState::Succeeded,
			Self::Failed(_) | Self::Panicked(_) => TaskState::Failed,
			Self::Cancelled => TaskState::Cancelled,
			Self::Interrupted => TaskState::Interrupted,
		}
	}

	/// Returns true for the two terminal states that carry no result.
	pub const fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled | Self::Interrupted)
	}
}

/// Cancellation view handed to task work.
#[derive(Debug, Clone)]
pub struct TaskContext {
	id: TaskId,
	signal: CancelSignal,
}

impl TaskContext {
	pub(crate) fn new(id: TaskId, signal: CancelSignal) -> Self {
		Self { id, signal }
	}

	pub fn id(&self) -> TaskId {
		self.id
	}

	/// Returns true once cancellation has been requested.
	pub fn is_cancelled(&self) -> bool {
		self.signal.is_cancelled()
	}

	/// Resolves when cancellation is requested.
	pub async fn cancelled(&self) {
		self.signal.cancelled().await;
	}

	/// Drives `fut` until it completes, or returns `None` once cancellation is
	/// requested. Wrap every blocking boundary (network call) in this.
	pub async fn run_until_cancelled<F>(&self, fut: F) -> Option<F::Output>
	where
		F: Future,
	{
		self.signal.run_until_cancelled(fut).await
	}
}

pub(crate) type WorkFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;
pub(crate) type WorkFn<T, E> = Box<dyn FnOnce(TaskContext) -> WorkFuture<T, E> + Send + 'static>;
pub(crate) type CompleteFn<T, E> = Box<dyn FnOnce(TaskOutcome<T, E>) + Send + 'static>;

/// Unit of deferred work awaiting submission.
pub struct Task<T, E> {
	pub(crate) name: Arc<str>,
	pub(crate) work: WorkFn<T, E>,
	pub(crate) on_complete: Option<CompleteFn<T, E>>,
	pub(crate) deadline: Option<Duration>,
}

impl<T, E> fmt::Debug for Task<T, E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Task")
			.field("name", &self.name)
			.field("deadline", &self.deadline)
			.finish_non_exhaustive()
	}
}

impl<T, E> Task<T, E>
where
	T: Send + 'static,
	E: fmt::Display + Send + 'static,
{
	/// Creates a task from a work closure.
	///
	/// The closure runs once on a worker slot and receives the task's
	/// [`TaskContext`] for cooperative cancellation.
	pub fn new<F, Fut>(name: impl Into<Arc<str>>, work: F) -> Self
	where
		F: FnOnce(TaskContext) -> Fut + Send + 'static,
		Fut: Future<Output = Result<T, E>> + Send + 'static,
	{
		Self {
			name: name.into(),
			work: Box::new(move |ctx| Box::pin(work(ctx))),
			on_complete: None,
			deadline: None,
		}
	}

	/// Sets the completion callback, run on the UI thread via the manager's
	/// dispatcher with the task's terminal outcome.
	#[must_use]
	pub fn on_complete(mut self, f: impl FnOnce(TaskOutcome<T, E>) + Send + 'static) -> Self {
		self.on_complete = Some(Box::new(f));
		self
	}

	/// Cancels the task cooperatively once it has been running for `deadline`.
	#[must_use]
	pub fn deadline(mut self, deadline: Duration) -> Self {
		self.deadline = Some(deadline);
		self
	}
}

#[derive(Debug)]
struct CoreState {
	state: TaskState,
	error: Option<Arc<str>>,
	/// Terminal state a late result is replaced with after a running cancel.
	cancelled_as: Option<TaskState>,
}

/// Type-erased shared state of one submitted task.
#[derive(Debug)]
pub(crate) struct TaskCore {
	pub(crate) id: TaskId,
	pub(crate) name: Arc<str>,
	pub(crate) manager_id: u64,
	pub(crate) signal: CancelSignal,
	state: Mutex<CoreState>,
}

impl TaskCore {
	pub(crate) fn new(id: TaskId, name: Arc<str>, manager_id: u64) -> Self {
		Self {
			id,
			name,
			manager_id,
			signal: CancelSignal::new(),
			state: Mutex::new(CoreState {
				state: TaskState::Created,
				error: None,
				cancelled_as: None,
			}),
		}
	}

	pub(crate) fn state(&self) -> TaskState {
		self.state.lock().state
	}

	pub(crate) fn snapshot(&self) -> TaskSnapshot {
		let st = self.state.lock();
		TaskSnapshot {
			id: self.id,
			name: Arc::clone(&self.name),
			state: st.state,
			error: st.error.clone(),
		}
	}

	/// `Created -> Running`. Returns false if the task was cancelled first.
	pub(crate) fn try_start(&self) -> bool {
		let mut st = self.state.lock();
		if st.state != TaskState::Created {
			return false;
		}
		st.state = TaskState::Running;
		true
	}

	/// Requests cancellation.
	///
	/// A created task becomes `Cancelled` immediately. A running task is only
	/// signalled; its terminal state is set once the work returns. Returns
	/// false when the task already reached a terminal state.
	pub(crate) fn cancel(&self, interrupt: bool) -> bool {
		let mut st = self.state.lock();
		match st.state {
			TaskState::Created => {
				st.state = TaskState::Cancelled;
				drop(st);
				self.signal.cancel();
				true
			}
			TaskState::Running => {
				st.cancelled_as = Some(match (interrupt, st.cancelled_as) {
					(true, _) => TaskState::Interrupted,
					(false, Some(earlier)) => earlier,
					(false, None) => TaskState::Cancelled,
				});
				drop(st);
				if interrupt {
					self.signal.interrupt();
				} else {
					self.signal.cancel();
				}
				true
			}
			_ => false,
		}
	}

	/// `Running -> terminal`.
	///
	/// A result or error reported after a cancel request is recorded as that
	/// cancellation instead. Returns the state actually recorded, or `None` if
	/// the task was already terminal.
	pub(crate) fn finish(&self, state: TaskState, error: Option<Arc<str>>) -> Option<TaskState> {
		debug_assert!(state.is_terminal());
		let mut st = self.state.lock();
		if st.state.is_terminal() {
			return None;
		}
		let state = match (st.cancelled_as, state) {
			(Some(cancelled), TaskState::Succeeded | TaskState::Failed) => cancelled,
			_ => state,
		};
		st.state = state;
		st.error = if state == TaskState::Failed { error } else { None };
		Some(state)
	}
}

/// Submitter-side handle onto a registered task.
#[derive(Clone)]
pub struct TaskHandle {
	pub(crate) core: Arc<TaskCore>,
	pub(crate) manager: Weak<ManagerInner>,
}

impl fmt::Debug for TaskHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TaskHandle").field("id", &self.core.id).field("name", &self.core.name).finish()
	}
}

impl TaskHandle {
	pub fn id(&self) -> TaskId {
		self.core.id
	}

	pub fn name(&self) -> &str {
		&self.core.name
	}

	pub fn state(&self) -> TaskState {
		self.core.state()
	}

	pub fn snapshot(&self) -> TaskSnapshot {
		self.core.snapshot()
	}

	pub fn is_finished(&self) -> bool {
		self.state().is_terminal()
	}

	/// Cancels through the owning manager, so the registry is updated before
	/// the task is signalled. Returns false if the task was already terminal.
	pub fn cancel(&self, interrupt: bool) -> bool {
		match self.manager.upgrade() {
			Some(inner) => inner.cancel_core(&self.core, interrupt),
			None => self.core.cancel(interrupt),
		}
	}
}
