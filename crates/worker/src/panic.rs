//! Panic capture for task work.
//!
//! Work runs in its own Tokio task, so a panic surfaces as a [`JoinError`]
//! carrying the payload. The manager turns that into
//! [`TaskOutcome::Panicked`](crate::TaskOutcome::Panicked) and reports the
//! task as failed instead of tearing down the worker.

use std::any::Any;

use tokio::task::JoinError;

/// Reason a joined task panicked, or `None` when it was aborted.
pub(crate) fn panic_reason(err: JoinError) -> Option<String> {
	err.try_into_panic().ok().map(|payload| describe_payload(payload.as_ref()))
}

/// Renders a panic payload. `panic!` produces `&str` for literals and
/// `String` for formatted messages; anything else is opaque.
fn describe_payload(payload: &(dyn Any + Send)) -> String {
	match (payload.downcast_ref::<&str>(), payload.downcast_ref::<String>()) {
		(Some(msg), _) => (*msg).to_string(),
		(None, Some(msg)) => msg.clone(),
		(None, None) => "opaque panic payload".to_string(),
	}
}
