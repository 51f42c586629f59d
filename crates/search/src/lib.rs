//! Incremental term search.
//!
//! A [`SearchPane`] turns a burst of keystrokes into at most one remote
//! search per settled interval and guarantees that a superseded search never
//! overwrites the pane's view. Each pane owns its own generation counter, so
//! panes searching different scopes never interfere.

mod pane;
mod view;

pub use pane::{ApplyOutcome, SearchConfig, SearchPane};
pub use view::SearchView;
