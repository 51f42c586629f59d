use ontopick_remote::{QueryError, Term};

/// Presentation surface of one search pane.
///
/// Methods are only ever called on the UI thread, from callbacks drained out
/// of the task manager's [`ontopick_worker::UiQueue`].
pub trait SearchView: Send + Sync + 'static {
	/// Shows the neutral "type more" state.
	fn show_placeholder(&self);

	/// Toggles the busy indicator.
	fn set_busy(&self, busy: bool);

	/// Replaces the result list.
	fn show_results(&self, query: &str, terms: &[Term]);

	/// Surfaces a failed search to the user.
	fn show_error(&self, query: &str, error: &QueryError);
}
