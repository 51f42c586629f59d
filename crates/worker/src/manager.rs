//! Background task manager.
//! Anchor ID: ONTOPICK_ANCHOR_TASK_MANAGER
//!
//! # Purpose
//!
//! * Runs remote-call work off the UI thread under a bounded concurrency limit.
//! * Owns the task registry and publishes every registry transition to observers.
//! * Marshals each task's terminal outcome back to the UI thread.
//!
//! # Mental model
//!
//! * A [`Task`] is submitted once and owned by the manager from then on.
//! * Registered tasks are either queued (`Created`) or executing (`Running`).
//! * Terminal tasks are never registered; completion and cancellation both
//!   deregister before observers hear about it.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`TaskManager`] | Cloneable manager handle | Must be created with a UI dispatcher | [`TaskManager::new`] |
//! | `Registry` | Task map, FIFO queue, running count | Mutated only under `ManagerInner::registry` | this module |
//! | [`TaskHandle`] | Submitter handle | Cancellation routes back through the manager | [`TaskManager::add_task`] |
//! | [`TasksChanged`] | Old/new registry snapshots | Snapshots taken inside the lock, delivered outside | `emit` |
//! | `RunSlot` | One unit of concurrency | Dropping it admits the next queued task | `admit` |
//!
//! # Invariants
//!
//! * A task ID is in the registry iff the task is non-terminal.
//! * At most `max_concurrent` tasks are `Running`; the rest wait in submission order.
//! * Observers are never invoked while the registry lock is held.
//! * Cancellation removes the task from the registry before signalling it.
//! * Each task's completion callback runs exactly once, on the UI thread.
//!
//! # Data flow
//!
//! 1. `add_task` registers the task, queues it, emits `Added`, admits queued work.
//! 2. Admission flips `Created -> Running` under the lock and spawns the runner.
//! 3. The runner drives the work, classifies the outcome, and calls the completion listener.
//! 4. The completion listener deregisters the task and emits `Removed`.
//! 5. The outcome is posted to the UI dispatcher; the slot is released.
//!
//! # Concurrency & ordering
//!
//! * Registry mutations (add, cancel, complete, shutdown) are linearized by one mutex.
//! * Runners execute on the Tokio runtime captured at construction.
//! * Observer fan-out copies the observer list first, so observers may subscribe,
//!   submit, or cancel from inside a callback.
//!
//! # Failure modes & recovery
//!
//! * Work error: task becomes `Failed`; error text is carried in the removed snapshot.
//! * Work panic: caught at the join boundary and reported as `Failed`.
//! * Work ignoring cancellation: keeps running, result discarded as `Cancelled`.
//! * Misuse: [`ManagerError::ShutDown`] and [`ManagerError::ForeignTask`].

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio_util::task::TaskTracker;

use crate::dispatch::UiDispatcher;
use crate::observer::{ChangeKind, Subscription, TaskObserver, TasksChanged};
use crate::panic::panic_reason;
use crate::task::{CompleteFn, Task, TaskContext, TaskCore, TaskHandle, TaskId, TaskOutcome, TaskSnapshot, TaskState};
use crate::token::GenerationClock;

static MANAGER_IDS: AtomicU64 = AtomicU64::new(1);

/// Misuse of the manager contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
	/// The manager no longer accepts tasks.
	#[error("task manager is shut down")]
	ShutDown,
	/// The handle was issued by a different manager.
	#[error("{0} belongs to another task manager")]
	ForeignTask(TaskId),
}

/// Task manager settings.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
	/// Maximum number of concurrently running tasks.
	pub max_concurrent: usize,
	/// Deadline applied to tasks that do not set their own.
	pub deadline: Option<Duration>,
}

impl ManagerConfig {
	/// Creates a config with the given worker bound.
	///
	/// # Panics
	///
	/// Panics if `max_concurrent` is zero.
	#[must_use]
	pub fn with_max_concurrent(max_concurrent: usize) -> Self {
		assert!(max_concurrent > 0, "max_concurrent must be > 0");
		Self {
			max_concurrent,
			..Self::default()
		}
	}

	#[must_use]
	pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
		self.deadline = deadline;
		self
	}
}

impl Default for ManagerConfig {
	fn default() -> Self {
		Self {
			max_concurrent: 4,
			deadline: None,
		}
	}
}

/// Type-erased queued job.
trait Launch: Send {
	/// Spawns the runner holding `slot`.
	fn start(self: Box<Self>, slot: RunSlot);
	/// Delivers `Cancelled` for a job that will never run.
	fn abandon(self: Box<Self>);
}

struct QueuedJob {
	core: Arc<TaskCore>,
	job: Box<dyn Launch>,
}

struct Registry {
	tasks: BTreeMap<TaskId, Arc<TaskCore>>,
	queue: VecDeque<QueuedJob>,
	running: usize,
	accepting: bool,
}

impl Registry {
	fn snapshot(&self) -> Arc<[TaskSnapshot]> {
		self.tasks.values().map(|core| core.snapshot()).collect()
	}

	fn take_queued(&mut self, id: TaskId) -> Option<QueuedJob> {
		let pos = self.queue.iter().position(|queued| queued.core.id == id)?;
		self.queue.remove(pos)
	}
}

pub(crate) struct ManagerInner {
	id: u64,
	config: ManagerConfig,
	registry: Mutex<Registry>,
	observers: RwLock<Vec<(Subscription, Arc<dyn TaskObserver>)>>,
	task_ids: GenerationClock,
	subscription_ids: AtomicU64,
	dispatcher: UiDispatcher,
	handle: Handle,
	tracker: TaskTracker,
	idle: Notify,
}

/// One unit of worker concurrency, released on drop.
struct RunSlot {
	inner: Arc<ManagerInner>,
}

impl Drop for RunSlot {
	fn drop(&mut self) {
		self.inner.release_slot();
	}
}

impl ManagerInner {
	/// Pops queued jobs while slots are free. Must be called with the lock held;
	/// the returned jobs are started after it is released.
	fn admit(&self, reg: &mut Registry) -> Vec<QueuedJob> {
		let mut ready = Vec::new();
		while reg.running < self.config.max_concurrent {
			let Some(queued) = reg.queue.pop_front() else {
				break;
			};
			if queued.core.try_start() {
				reg.running += 1;
				ready.push(queued);
			}
		}
		ready
	}

	fn start_all(self: &Arc<Self>, ready: Vec<QueuedJob>) {
		for queued in ready {
			tracing::debug!(task = %queued.core.id, name = %queued.core.name, "task.start");
			queued.job.start(RunSlot { inner: Arc::clone(self) });
		}
	}

	fn release_slot(self: &Arc<Self>) {
		let ready = {
			let mut reg = self.registry.lock();
			reg.running = reg.running.saturating_sub(1);
			self.admit(&mut reg)
		};
		self.start_all(ready);
	}

	/// Completion listener subscribed to every task at registration time.
	fn on_task_completed(&self, core: &TaskCore) {
		let change = {
			let mut reg = self.registry.lock();
			if !reg.tasks.contains_key(&core.id) {
				return;
			}
			let old = reg.snapshot();
			reg.tasks.remove(&core.id);
			let new = reg.snapshot();
			if reg.tasks.is_empty() {
				self.idle.notify_waiters();
			}
			TasksChanged {
				kind: ChangeKind::Removed,
				old,
				new,
			}
		};
		self.emit(&change);
	}

	pub(crate) fn cancel_core(self: &Arc<Self>, core: &Arc<TaskCore>, interrupt: bool) -> bool {
		let (change, queued) = {
			let mut reg = self.registry.lock();
			if !reg.tasks.contains_key(&core.id) {
				return false;
			}
			let old = reg.snapshot();
			reg.tasks.remove(&core.id);
			let queued = reg.take_queued(core.id);
			let new = reg.snapshot();
			if reg.tasks.is_empty() {
				self.idle.notify_waiters();
			}
			(
				TasksChanged {
					kind: ChangeKind::Removed,
					old,
					new,
				},
				queued,
			)
		};

		let cancelled = core.cancel(interrupt);
		if let Some(queued) = queued {
			queued.job.abandon();
		}
		tracing::debug!(task = %core.id, name = %core.name, interrupt, cancelled, "task.cancel");
		self.emit(&change);
		cancelled
	}

	fn emit(&self, change: &TasksChanged) {
		let observers: Vec<Arc<dyn TaskObserver>> = self.observers.read().iter().map(|(_, observer)| Arc::clone(observer)).collect();
		tracing::trace!(kind = ?change.kind, tasks = change.new.len(), observers = observers.len(), "task.emit");
		for observer in observers {
			observer.on_tasks_changed(change);
		}
	}
}

/// Background task manager handle.
///
/// Clones share one registry and worker bound.
#[derive(Clone)]
pub struct TaskManager {
	inner: Arc<ManagerInner>,
}

impl fmt::Debug for TaskManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let reg = self.inner.registry.lock();
		f.debug_struct("TaskManager")
			.field("id", &self.inner.id)
			.field("tasks", &reg.tasks.len())
			.field("queued", &reg.queue.len())
			.field("running", &reg.running)
			.field("accepting", &reg.accepting)
			.finish()
	}
}

impl TaskManager {
	/// Creates a manager on the ambient runtime (see [`crate::runtime_handle`]).
	pub fn new(config: ManagerConfig, dispatcher: UiDispatcher) -> Self {
		Self::with_handle(config, dispatcher, crate::runtime_handle())
	}

	/// Creates a manager whose runners execute on `handle`.
	pub fn with_handle(config: ManagerConfig, dispatcher: UiDispatcher, handle: Handle) -> Self {
		assert!(config.max_concurrent > 0, "max_concurrent must be > 0");
		Self {
			inner: Arc::new(ManagerInner {
				id: MANAGER_IDS.fetch_add(1, Ordering::Relaxed),
				config,
				registry: Mutex::new(Registry {
					tasks: BTreeMap::new(),
					queue: VecDeque::new(),
					running: 0,
					accepting: true,
				}),
				observers: RwLock::new(Vec::new()),
				task_ids: GenerationClock::new(),
				subscription_ids: AtomicU64::new(1),
				dispatcher,
				handle,
				tracker: TaskTracker::new(),
				idle: Notify::new(),
			}),
		}
	}

	/// Returns the runtime runners execute on.
	pub fn runtime(&self) -> &Handle {
		&self.inner.handle
	}

	/// Returns the dispatcher completion callbacks are posted to.
	pub fn dispatcher(&self) -> &UiDispatcher {
		&self.inner.dispatcher
	}

	/// Registers and enqueues a task.
	///
	/// Emits an `Added` event before the task can start.
	pub fn add_task<T, E>(&self, task: Task<T, E>) -> Result<TaskHandle, ManagerError>
	where
		T: Send + 'static,
		E: fmt::Display + Send + 'static,
	{
		let inner = &self.inner;
		let (handle, change) = {
			let mut reg = inner.registry.lock();
			if !reg.accepting {
				return Err(ManagerError::ShutDown);
			}
			let id = TaskId(inner.task_ids.next());
			let core = Arc::new(TaskCore::new(id, Arc::clone(&task.name), inner.id));
			let deadline = task.deadline.or(inner.config.deadline);
			let old = reg.snapshot();
			reg.tasks.insert(id, Arc::clone(&core));
			reg.queue.push_back(QueuedJob {
				core: Arc::clone(&core),
				job: Box::new(Job {
					core: Arc::clone(&core),
					task,
					deadline,
					dispatcher: inner.dispatcher.clone(),
				}),
			});
			let new = reg.snapshot();
			tracing::debug!(task = %id, name = %core.name, queued = reg.queue.len(), running = reg.running, "task.add");
			(
				TaskHandle {
					core,
					manager: Arc::downgrade(inner),
				},
				TasksChanged {
					kind: ChangeKind::Added,
					old,
					new,
				},
			)
		};
		self.inner.emit(&change);

		let ready = {
			let mut reg = inner.registry.lock();
			inner.admit(&mut reg)
		};
		inner.start_all(ready);
		Ok(handle)
	}

	/// Cancels a registered task.
	///
	/// The task leaves the registry (and a `Removed` event is emitted) before
	/// its work is signalled. Returns `Ok(false)` if the task was no longer
	/// registered or had already finished.
	pub fn cancel_task(&self, handle: &TaskHandle, interrupt: bool) -> Result<bool, ManagerError> {
		if handle.core.manager_id != self.inner.id {
			return Err(ManagerError::ForeignTask(handle.id()));
		}
		Ok(self.inner.cancel_core(&handle.core, interrupt))
	}

	/// Returns true while `id` is registered (queued or running).
	pub fn has_task(&self, id: TaskId) -> bool {
		self.inner.registry.lock().tasks.contains_key(&id)
	}

	/// Snapshots registered tasks in submission order.
	pub fn list_tasks(&self) -> Vec<TaskSnapshot> {
		self.inner.registry.lock().snapshot().to_vec()
	}

	pub fn len(&self) -> usize {
		self.inner.registry.lock().tasks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of tasks currently holding a worker slot.
	pub fn running(&self) -> usize {
		self.inner.registry.lock().running
	}

	pub fn max_concurrent(&self) -> usize {
		self.inner.config.max_concurrent
	}

	/// Registers an observer for registry transitions.
	pub fn subscribe(&self, observer: impl TaskObserver) -> Subscription {
		let sub = Subscription(self.inner.subscription_ids.fetch_add(1, Ordering::Relaxed));
		self.inner.observers.write().push((sub, Arc::new(observer)));
		sub
	}

	/// Removes an observer. Returns false if it was not registered.
	pub fn unsubscribe(&self, sub: Subscription) -> bool {
		let mut observers = self.inner.observers.write();
		let before = observers.len();
		observers.retain(|(s, _)| *s != sub);
		observers.len() != before
	}

	pub fn is_shut_down(&self) -> bool {
		!self.inner.registry.lock().accepting
	}

	/// Orderly drain: stops accepting tasks and waits for every registered
	/// task (queued and running) to reach a terminal state.
	pub async fn shutdown(&self) {
		self.inner.registry.lock().accepting = false;
		tracing::debug!(manager = self.inner.id, "task.shutdown");
		loop {
			let notified = self.inner.idle.notified();
			if self.inner.registry.lock().tasks.is_empty() {
				break;
			}
			notified.await;
		}
		self.inner.tracker.close();
		self.inner.tracker.wait().await;
	}

	/// Immediate shutdown: stops accepting tasks, cancels everything still
	/// queued, and interrupts everything running.
	///
	/// Returns snapshots of the queued tasks that never started.
	pub fn shutdown_now(&self) -> Vec<TaskSnapshot> {
		let (abandoned, running, change) = {
			let mut reg = self.inner.registry.lock();
			reg.accepting = false;
			let old = reg.snapshot();
			let abandoned: Vec<QueuedJob> = reg.queue.drain(..).collect();
			for queued in &abandoned {
				reg.tasks.remove(&queued.core.id);
			}
			let running: Vec<Arc<TaskCore>> = reg.tasks.values().cloned().collect();
			let new = reg.snapshot();
			if reg.tasks.is_empty() {
				self.inner.idle.notify_waiters();
			}
			let change = (!abandoned.is_empty()).then_some(TasksChanged {
				kind: ChangeKind::Removed,
				old,
				new,
			});
			(abandoned, running, change)
		};
		tracing::debug!(manager = self.inner.id, abandoned = abandoned.len(), running = running.len(), "task.shutdown_now");

		let mut never_started = Vec::with_capacity(abandoned.len());
		for queued in abandoned {
			queued.core.cancel(false);
			never_started.push(queued.core.snapshot());
			queued.job.abandon();
		}
		for core in running {
			core.cancel(true);
		}
		self.inner.tracker.close();
		if let Some(change) = change {
			self.inner.emit(&change);
		}
		never_started
	}
}

struct Job<T, E> {
	core: Arc<TaskCore>,
	task: Task<T, E>,
	deadline: Option<Duration>,
	dispatcher: UiDispatcher,
}

impl<T, E> Launch for Job<T, E>
where
	T: Send + 'static,
	E: fmt::Display + Send + 'static,
{
	fn start(self: Box<Self>, slot: RunSlot) {
		let inner = Arc::clone(&slot.inner);
		inner.tracker.spawn_on((*self).run(slot), &inner.handle);
	}

	fn abandon(self: Box<Self>) {
		let Job { task, dispatcher, .. } = *self;
		deliver(&dispatcher, task.on_complete, TaskOutcome::Cancelled);
	}
}

impl<T, E> Job<T, E>
where
	T: Send + 'static,
	E: fmt::Display + Send + 'static,
{
	async fn run(self, slot: RunSlot) {
		let Job {
			core,
			task,
			deadline,
			dispatcher,
		} = self;
		let Task { work, on_complete, .. } = task;

		let ctx = TaskContext::new(core.id, core.signal.clone());
		let mut join = tokio::spawn(work(ctx));

		let deadline_timer = async move {
			match deadline {
				Some(d) => tokio::time::sleep(d).await,
				None => std::future::pending().await,
			}
		};
		tokio::pin!(deadline_timer);
		let mut deadline_fired = false;

		let joined = loop {
			tokio::select! {
				biased;
				_ = core.signal.interrupted() => {
					join.abort();
					break None;
				}
				res = &mut join => break Some(res),
				_ = &mut deadline_timer, if !deadline_fired => {
					deadline_fired = true;
					tracing::debug!(task = %core.id, name = %core.name, "task.deadline");
					core.signal.cancel();
				}
			}
		};

		let outcome = match joined {
			None => TaskOutcome::Interrupted,
			Some(_) if core.signal.is_cancelled() => TaskOutcome::Cancelled,
			Some(Ok(Ok(value))) => TaskOutcome::Succeeded(value),
			Some(Ok(Err(err))) => TaskOutcome::Failed(err),
			Some(Err(join_err)) => match panic_reason(join_err) {
				Some(msg) => TaskOutcome::Panicked(msg),
				None => TaskOutcome::Interrupted,
			},
		};

		let error: Option<Arc<str>> = match &outcome {
			TaskOutcome::Failed(err) => Some(Arc::from(err.to_string())),
			TaskOutcome::Panicked(msg) => Some(Arc::from(format!("task panicked: {msg}"))),
			_ => None,
		};
		let reported = outcome.state();
		let outcome = match core.finish(reported, error.clone()) {
			Some(TaskState::Cancelled) if reported != TaskState::Cancelled => TaskOutcome::Cancelled,
			Some(TaskState::Interrupted) if reported != TaskState::Interrupted => TaskOutcome::Interrupted,
			_ => outcome,
		};
		let state = outcome.state();
		match &error {
			Some(error) if state == TaskState::Failed => tracing::warn!(task = %core.id, name = %core.name, %error, "task.failed"),
			_ => tracing::debug!(task = %core.id, name = %core.name, state = state.as_str(), "task.complete"),
		}

		slot.inner.on_task_completed(&core);
		deliver(&dispatcher, on_complete, outcome);
		drop(slot);
	}
}

fn deliver<T, E>(dispatcher: &UiDispatcher, on_complete: Option<CompleteFn<T, E>>, outcome: TaskOutcome<T, E>)
where
	T: Send + 'static,
	E: Send + 'static,
{
	if let Some(on_complete) = on_complete {
		dispatcher.post(move || on_complete(outcome));
	}
}
