//! Ontology term picker core.
//!
//! Wires the picker's three concurrency pieces behind one [`PickerSession`]:
//!
//! * [`TaskManager`]: bounded background execution with observable lifecycle.
//! * [`SearchPane`]: debounced incremental search, one per scope.
//! * [`LazyTree`]: on-demand hierarchy browsing.
//!
//! The remote ontology service is injected as a [`RemoteQueryPort`].

pub mod config;
pub mod logging;
mod session;

pub use config::{ConfigError, PickerConfig};
pub use ontopick_remote::{Metadata, Ontology, OntologyId, QueryError, RemoteQueryPort, SharedPort, Term, TermId};
pub use ontopick_search::{ApplyOutcome, SearchConfig, SearchPane, SearchView};
pub use ontopick_tree::{ExpandOutcome, LazyTree, LoadState, Node, NodeId, NodeKind, TreeChange, TreeConfig};
pub use ontopick_worker::{ChangeKind, Subscription, TaskManager, TaskObserver, TaskSnapshot, TaskState, TasksChanged, UiQueue};
pub use session::{PickerSession, SessionPump};
