//! Runtime selection for task managers.
//!
//! A manager created inside a Tokio runtime spawns onto it. One created from a
//! plain UI thread spawns onto a process-wide pool built on first use.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::{Builder, Handle, Runtime};

/// Returns the ambient runtime handle, or the shared fallback pool's.
pub fn runtime_handle() -> Handle {
	Handle::try_current().unwrap_or_else(|_| fallback_runtime().handle().clone())
}

fn fallback_runtime() -> &'static Runtime {
	static RUNTIME: OnceLock<Runtime> = OnceLock::new();
	RUNTIME.get_or_init(|| {
		let next = AtomicUsize::new(0);
		Builder::new_multi_thread()
			.enable_all()
			.thread_name_fn(move || format!("ontopick-worker-{}", next.fetch_add(1, Ordering::Relaxed)))
			.build()
			.unwrap_or_else(|err| panic!("cannot start the ontopick worker pool: {err}"))
	})
}
