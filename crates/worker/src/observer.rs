use std::sync::Arc;

use crate::task::{TaskId, TaskSnapshot};

/// Registry mutation that produced a [`TasksChanged`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
	Added,
	Removed,
}

/// Task list transition published to observers.
///
/// Both lists are snapshots taken inside the registry critical section, in
/// submission order.
#[derive(Debug, Clone)]
pub struct TasksChanged {
	pub kind: ChangeKind,
	pub old: Arc<[TaskSnapshot]>,
	pub new: Arc<[TaskSnapshot]>,
}

impl TasksChanged {
	/// Tasks present in `new` but not in `old`.
	pub fn added(&self) -> Vec<&TaskSnapshot> {
		self.new.iter().filter(|t| !contains(&self.old, t.id)).collect()
	}

	/// Tasks present in `old` but not in `new`.
	pub fn removed(&self) -> Vec<&TaskSnapshot> {
		self.old.iter().filter(|t| !contains(&self.new, t.id)).collect()
	}
}

fn contains(list: &[TaskSnapshot], id: TaskId) -> bool {
	list.iter().any(|t| t.id == id)
}

/// Receives task list transitions.
///
/// Called on whichever thread mutated the registry, never while the registry
/// lock is held, so implementations may call back into the manager.
pub trait TaskObserver: Send + Sync + 'static {
	fn on_tasks_changed(&self, change: &TasksChanged);
}

impl<F> TaskObserver for F
where
	F: Fn(&TasksChanged) + Send + Sync + 'static,
{
	fn on_tasks_changed(&self, change: &TasksChanged) {
		self(change)
	}
}

/// Token returned by [`crate::TaskManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(pub(crate) u64);
