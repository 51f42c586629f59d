//! Picker session wiring.
//! Anchor ID: ONTOPICK_ANCHOR_SESSION
//!
//! # Purpose
//!
//! * Owns the UI queue, the task manager, both search panes and the tree.
//! * Gives the host one pump to call from its event loop.
//!
//! # Mental model
//!
//! * The "all" pane searches every ontology; the scoped pane searches the
//!   selected ontology and is rebuilt whenever the selection changes.
//! * Selecting an ontology (or a preselected parent term) re-initialises the
//!   tree; completions for the previous root are dropped by the tree.
//! * The ontology catalogue is loaded once as an ordinary task.
//!
//! # Data flow
//!
//! 1. Host forwards keystrokes and tree gestures to the session.
//! 2. Work runs on the manager's runtime; completions land on the UI queue.
//! 3. [`PickerSession::pump`] runs queued callbacks, then applies catalogue and
//!    tree completions, and reports what changed.

use std::sync::{Arc, Weak};

use ontopick_remote::{Ontology, OntologyId, QueryError, SharedPort, Term};
use ontopick_search::{SearchPane, SearchView};
use ontopick_tree::{LazyTree, TreeChange};
use ontopick_worker::{Task, TaskManager, TaskOutcome, TaskSnapshot, UiQueue};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::PickerConfig;

/// What one [`PickerSession::pump`] applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPump {
	/// UI callbacks executed.
	pub callbacks: usize,
	/// True when the pump budget left callbacks queued.
	pub budget_exhausted: bool,
	/// True when the ontology catalogue arrived during this pump.
	pub ontologies_loaded: bool,
	/// Tree redraw hints.
	pub tree: Vec<TreeChange>,
}

type CatalogueOutcome = TaskOutcome<Vec<Ontology>, QueryError>;

/// One open term picker.
pub struct PickerSession<V> {
	config: PickerConfig,
	port: SharedPort,
	queue: UiQueue,
	manager: TaskManager,
	all: SearchPane<V>,
	scoped: Option<SearchPane<V>>,
	scoped_view: Weak<V>,
	tree: LazyTree,
	ontologies: Vec<Ontology>,
	catalogue_error: Option<QueryError>,
	selected_ontology: Option<OntologyId>,
	catalogue_tx: UnboundedSender<CatalogueOutcome>,
	catalogue_rx: UnboundedReceiver<CatalogueOutcome>,
}

impl<V> std::fmt::Debug for PickerSession<V> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PickerSession")
			.field("manager", &self.manager)
			.field("tree", &self.tree)
			.field("ontologies", &self.ontologies.len())
			.field("selected_ontology", &self.selected_ontology)
			.finish_non_exhaustive()
	}
}

impl<V: SearchView> PickerSession<V> {
	/// Creates a session whose workers run on the shared picker runtime.
	pub fn new(config: PickerConfig, port: SharedPort, all_view: &Arc<V>, scoped_view: &Arc<V>) -> Self {
		Self::with_handle(config, port, all_view, scoped_view, ontopick_worker::runtime_handle())
	}

	/// Creates a session whose workers run on `handle`.
	pub fn with_handle(config: PickerConfig, port: SharedPort, all_view: &Arc<V>, scoped_view: &Arc<V>, handle: Handle) -> Self {
		let queue = UiQueue::new();
		let manager = TaskManager::with_handle(config.manager_config(), queue.dispatcher(), handle);
		let all = SearchPane::new("all ontologies", None, config.search_config(), manager.clone(), SharedPort::clone(&port), all_view);
		let tree = LazyTree::new(config.tree_config(), manager.clone(), SharedPort::clone(&port));
		let (catalogue_tx, catalogue_rx) = mpsc::unbounded_channel();
		tracing::debug!(workers = config.workers.max_concurrent, "session.open");
		Self {
			config,
			port,
			queue,
			manager,
			all,
			scoped: None,
			scoped_view: Arc::downgrade(scoped_view),
			tree,
			ontologies: Vec::new(),
			catalogue_error: None,
			selected_ontology: None,
			catalogue_tx,
			catalogue_rx,
		}
	}

	pub fn config(&self) -> &PickerConfig {
		&self.config
	}

	pub fn manager(&self) -> &TaskManager {
		&self.manager
	}

	/// Requests the ontology catalogue. Returns false if the manager is shut down.
	pub fn load_ontologies(&self) -> bool {
		let port = SharedPort::clone(&self.port);
		let tx = self.catalogue_tx.clone();
		let task = Task::new("load ontologies", move |ctx| async move {
			ctx.run_until_cancelled(port.list_ontologies()).await.unwrap_or(Err(QueryError::Cancelled))
		})
		.on_complete(move |outcome| {
			let _ = tx.send(outcome);
		});
		match self.manager.add_task(task) {
			Ok(_) => true,
			Err(err) => {
				tracing::warn!(%err, "session.catalogue_submit_failed");
				false
			}
		}
	}

	/// Ontology catalogue, empty until loaded.
	pub fn ontologies(&self) -> &[Ontology] {
		&self.ontologies
	}

	/// Last catalogue failure, cleared by a successful load.
	pub fn catalogue_error(&self) -> Option<&QueryError> {
		self.catalogue_error.as_ref()
	}

	pub fn selected_ontology(&self) -> Option<&OntologyId> {
		self.selected_ontology.as_ref()
	}

	/// Makes `ontology` the scope of the second pane and the tree root.
	///
	/// Returns false if it was already selected.
	pub fn select_ontology(&mut self, ontology: OntologyId) -> bool {
		if self.selected_ontology.as_ref() == Some(&ontology) {
			return false;
		}
		tracing::debug!(%ontology, "session.select_ontology");
		self.rescope(ontology.clone());
		self.tree.init_ontology(ontology);
		true
	}

	/// Roots the tree at a preselected parent term and scopes the second pane
	/// to that term's ontology.
	pub fn select_parent_term(&mut self, term: Term) {
		tracing::debug!(term = %term.id, "session.select_parent_term");
		if self.selected_ontology.as_ref() != Some(&term.ontology) {
			self.rescope(term.ontology.clone());
		}
		self.tree.init_term(term);
	}

	fn rescope(&mut self, ontology: OntologyId) {
		if let Some(previous) = self.scoped.take() {
			previous.cancel();
		}
		self.scoped = self.scoped_view.upgrade().map(|view| {
			SearchPane::new(
				format!("ontology {ontology}"),
				Some(ontology.clone()),
				self.config.search_config(),
				self.manager.clone(),
				SharedPort::clone(&self.port),
				&view,
			)
		});
		self.selected_ontology = Some(ontology);
	}

	/// Keystroke in the all-ontologies search field.
	pub fn on_search_input(&self, text: impl Into<String>) {
		self.all.on_input(text);
	}

	/// Keystroke in the selected-ontology search field. Returns false when no
	/// ontology is selected.
	pub fn on_scoped_input(&self, text: impl Into<String>) -> bool {
		match &self.scoped {
			Some(pane) => {
				pane.on_input(text);
				true
			}
			None => false,
		}
	}

	pub fn search_pane(&self) -> &SearchPane<V> {
		&self.all
	}

	pub fn scoped_pane(&self) -> Option<&SearchPane<V>> {
		self.scoped.as_ref()
	}

	pub fn tree(&self) -> &LazyTree {
		&self.tree
	}

	pub fn tree_mut(&mut self) -> &mut LazyTree {
		&mut self.tree
	}

	/// Runs up to the configured budget of UI callbacks, then applies
	/// catalogue and tree completions.
	pub fn pump(&mut self) -> SessionPump {
		let report = self.queue.pump(self.config.ui.pump_budget);
		let mut pump = SessionPump {
			callbacks: report.ran,
			budget_exhausted: report.budget_exhausted,
			..SessionPump::default()
		};
		self.apply_completions(&mut pump);
		pump
	}

	/// Waits for the next UI callback, runs it, then pumps whatever else is ready.
	pub async fn next(&mut self) -> SessionPump {
		let ran = self.queue.next().await;
		let mut pump = self.pump();
		pump.callbacks += usize::from(ran);
		pump
	}

	fn apply_completions(&mut self, pump: &mut SessionPump) {
		while let Ok(outcome) = self.catalogue_rx.try_recv() {
			match outcome {
				TaskOutcome::Succeeded(ontologies) => {
					tracing::debug!(count = ontologies.len(), "session.catalogue_loaded");
					self.ontologies = ontologies;
					self.catalogue_error = None;
					pump.ontologies_loaded = true;
				}
				TaskOutcome::Failed(err) => {
					tracing::warn!(%err, "session.catalogue_failed");
					self.catalogue_error = Some(err);
				}
				TaskOutcome::Panicked(msg) => {
					tracing::warn!(%msg, "session.catalogue_failed");
					self.catalogue_error = Some(QueryError::Protocol(msg));
				}
				TaskOutcome::Cancelled | TaskOutcome::Interrupted => {}
			}
		}
		pump.tree.extend(self.tree.pump());
	}

	/// Orderly close: stops accepting work, waits for in-flight tasks, and
	/// applies their completions.
	pub async fn shutdown(&mut self) -> SessionPump {
		tracing::debug!(tasks = self.manager.len(), "session.shutdown");
		self.manager.shutdown().await;
		self.drain()
	}

	/// Immediate close: abandons queued tasks and interrupts running ones.
	///
	/// Returns the tasks that never started.
	pub fn shutdown_now(&mut self) -> Vec<TaskSnapshot> {
		self.all.cancel();
		if let Some(pane) = &self.scoped {
			pane.cancel();
		}
		let abandoned = self.manager.shutdown_now();
		tracing::debug!(abandoned = abandoned.len(), "session.shutdown_now");
		abandoned
	}

	fn drain(&mut self) -> SessionPump {
		let report = self.queue.pump(usize::MAX);
		let mut pump = SessionPump {
			callbacks: report.ran,
			..SessionPump::default()
		};
		self.apply_completions(&mut pump);
		pump
	}
}
