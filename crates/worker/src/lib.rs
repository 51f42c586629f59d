//! Task execution kernel for the term picker.
//!
//! * [`TaskManager`] runs [`Task`]s on a bounded worker pool, keeps a registry
//!   of in-flight tasks, and publishes registry transitions to
//!   [`TaskObserver`]s.
//! * [`UiQueue`] / [`UiDispatcher`] marshal completion callbacks back onto the
//!   single UI thread.
//! * [`GenerationClock`] issues monotonic generations for stale-result checks.

mod dispatch;
mod manager;
mod observer;
mod panic;
mod spawn;
mod task;
mod token;

pub use dispatch::{PumpReport, UiCallback, UiDispatcher, UiQueue};
pub use manager::{ManagerConfig, ManagerError, TaskManager};
pub use observer::{ChangeKind, Subscription, TaskObserver, TasksChanged};
pub use spawn::runtime_handle;
pub use task::{Task, TaskContext, TaskHandle, TaskId, TaskOutcome, TaskSnapshot, TaskState};
pub use token::GenerationClock;
