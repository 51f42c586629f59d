//! Lazy hierarchy loader.
//! Anchor ID: ONTOPICK_ANCHOR_TREE_LOADER
//!
//! # Mental model
//!
//! * The tree is an arena of [`Node`]s owned by the UI thread. Only the
//!   loader mutates it.
//! * Every child query runs as a [`Task`]. Its completion is sent back into
//!   the tree's own channel and applied by [`LazyTree::pump`].
//! * A probe asks for a node's direct children. An empty answer makes the
//!   node a leaf; a non-empty answer is parked as prefetched data until the
//!   node is expanded.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`LazyTree`] | Arena, in-flight set, selection | UI thread only | [`LazyTree::new`] |
//! | [`Node`] | One term, root, or sentinel | Index valid for one generation | `push_node` |
//! | `Completion` | Finished child or metadata query | Tagged with the tree generation | task completion |
//! | [`TreeChange`] | Redraw hint for the host | Drained by [`LazyTree::pump`] | apply paths |
//!
//! # Invariants
//!
//! * At most one child query is in flight per node.
//! * Expanding a node never requests grandchildren; children of the expanded
//!   node are probed at depth 1 only.
//! * Expanding a prefetched node issues no network call.
//! * Completions from an earlier generation are dropped unapplied.
//! * Metadata is applied only for the node selected at completion time.
//!
//! # Failure modes & recovery
//!
//! * Probe or expand failure: node degrades to [`LoadState::NoChildren`]; the
//!   error travels through the task manager's observers as a failed task.
//! * Cancelled probe (re-init, shutdown): node returns to
//!   [`LoadState::Unknown`] and may be expanded again.
//! * Manager shut down: submissions fail, the node stays unresolved.

use ontopick_remote::{Metadata, OntologyId, QueryError, SharedPort, Term, TermId};
use ontopick_worker::{Task, TaskHandle, TaskManager, TaskOutcome};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::node::{LoadState, Node, NodeId, NodeKind};

/// Loader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
	/// Probe the children of every expanded node to resolve their affordance.
	pub prefetch: bool,
}

impl Default for TreeConfig {
	fn default() -> Self {
		Self { prefetch: true }
	}
}

/// Result of [`LazyTree::expand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
	/// Children are materialized and visible.
	Expanded,
	/// Children are being fetched; the expansion completes on a later pump.
	Pending,
	/// The node has no children.
	NoChildren,
	/// The id does not belong to the current tree.
	NotFound,
	/// The manager refused the child query, e.g. after shutdown. The node
	/// stays unresolved and may be expanded again.
	Unavailable,
}

/// Redraw hint produced while applying loader work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeChange {
	/// The tree was re-initialised; every previous [`NodeId`] is invalid.
	Reset,
	/// A node's children were materialized.
	ChildrenLoaded(NodeId),
	/// A node's expand affordance was resolved by a probe.
	Resolved(NodeId),
	/// A node's child query failed and it was degraded to a leaf.
	ProbeFailed(NodeId),
	/// Metadata for the selected node arrived.
	MetadataLoaded(NodeId),
	/// Metadata for the selected node could not be fetched.
	MetadataFailed(NodeId),
}

enum Completion {
	Children {
		generation: u64,
		node: NodeId,
		outcome: TaskOutcome<Vec<Term>, QueryError>,
	},
	Metadata {
		generation: u64,
		node: NodeId,
		outcome: TaskOutcome<Metadata, QueryError>,
	},
}

enum ChildQuery {
	Roots(OntologyId),
	Children(TermId, OntologyId),
}

/// Lazily materialized term hierarchy.
pub struct LazyTree {
	config: TreeConfig,
	manager: TaskManager,
	port: SharedPort,
	nodes: Vec<Node>,
	root: Option<NodeId>,
	generation: u64,
	in_flight: FxHashMap<NodeId, TaskHandle>,
	selected: Option<NodeId>,
	metadata: Option<Metadata>,
	metadata_task: Option<TaskHandle>,
	changes: Vec<TreeChange>,
	tx: UnboundedSender<Completion>,
	rx: UnboundedReceiver<Completion>,
}

impl std::fmt::Debug for LazyTree {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LazyTree")
			.field("generation", &self.generation)
			.field("nodes", &self.nodes.len())
			.field("in_flight", &self.in_flight.len())
			.field("selected", &self.selected)
			.finish_non_exhaustive()
	}
}

impl LazyTree {
	/// Creates an empty tree. Call [`Self::init_ontology`] or
	/// [`Self::init_term`] to populate it.
	pub fn new(config: TreeConfig, manager: TaskManager, port: SharedPort) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		Self {
			config,
			manager,
			port,
			nodes: Vec::new(),
			root: None,
			generation: 0,
			in_flight: FxHashMap::default(),
			selected: None,
			metadata: None,
			metadata_task: None,
			changes: Vec::new(),
			tx,
			rx,
		}
	}

	/// Rebuilds the tree under a synthetic root for `ontology`.
	pub fn init_ontology(&mut self, ontology: OntologyId) -> NodeId {
		self.reset(NodeKind::Ontology(ontology))
	}

	/// Rebuilds the tree rooted at a preselected parent term.
	pub fn init_term(&mut self, term: Term) -> NodeId {
		self.reset(NodeKind::Term(term))
	}

	fn reset(&mut self, kind: NodeKind) -> NodeId {
		self.generation = self.generation.wrapping_add(1);
		for (_, handle) in self.in_flight.drain() {
			handle.cancel(false);
		}
		if let Some(handle) = self.metadata_task.take() {
			handle.cancel(false);
		}
		self.nodes.clear();
		self.selected = None;
		self.metadata = None;
		self.changes.clear();
		self.changes.push(TreeChange::Reset);

		let root = self.push_node(None, kind);
		tracing::debug!(generation = self.generation, root = self.nodes[0].label(), "tree.init");
		self.root = Some(root);
		self.nodes[0].expanded = true;
		self.nodes[0].expand_requested = true;
		self.fetch_children(root);
		root
	}

	/// Expands `id`, loading its children if needed.
	///
	/// Idempotent: expanding a loaded or pending node issues no new query.
	pub fn expand(&mut self, id: NodeId) -> ExpandOutcome {
		let Some(node) = self.node_mut(id) else {
			return ExpandOutcome::NotFound;
		};
		tracing::trace!(node = %id, state = node.state.as_str(), "tree.expand");
		match node.state {
			LoadState::Loaded => {
				node.expanded = true;
				ExpandOutcome::Expanded
			}
			LoadState::NoChildren => ExpandOutcome::NoChildren,
			LoadState::Probing => {
				node.expand_requested = true;
				ExpandOutcome::Pending
			}
			LoadState::Collapsed => {
				self.materialize(id);
				ExpandOutcome::Expanded
			}
			LoadState::Unknown => {
				node.expand_requested = true;
				self.fetch_children(id);
				match self.node(id).map(Node::state) {
					Some(LoadState::Probing) => ExpandOutcome::Pending,
					_ => ExpandOutcome::Unavailable,
				}
			}
		}
	}

	/// Hides the children of `id` without discarding them.
	pub fn collapse(&mut self, id: NodeId) -> bool {
		match self.node_mut(id) {
			Some(node) if node.expanded => {
				node.expanded = false;
				true
			}
			_ => false,
		}
	}

	/// Selects `id` and fetches its metadata, cancelling any fetch for the
	/// previous selection. Returns false if `id` is unknown or already selected.
	pub fn select(&mut self, id: NodeId) -> bool {
		if self.selected == Some(id) {
			return false;
		}
		let Some(node) = self.node(id) else {
			return false;
		};
		let term = node.term().cloned();

		if let Some(previous) = self.metadata_task.take() {
			previous.cancel(false);
		}
		self.selected = Some(id);
		self.metadata = None;

		let Some(term) = term else {
			return true;
		};
		tracing::debug!(node = %id, term = %term.id, "tree.select");

		let port = SharedPort::clone(&self.port);
		let tx = self.tx.clone();
		let generation = self.generation;
		let task = Task::new(format!("tree: metadata of {}", term.id), move |ctx| async move {
			ctx.run_until_cancelled(port.get_term_metadata(&term.id, &term.ontology))
				.await
				.unwrap_or(Err(QueryError::Cancelled))
		})
		.on_complete(move |outcome| {
			let _ = tx.send(Completion::Metadata { generation, node: id, outcome });
		});

		match self.manager.add_task(task) {
			Ok(handle) => self.metadata_task = Some(handle),
			Err(err) => tracing::warn!(node = %id, %err, "tree.metadata_submit_failed"),
		}
		true
	}

	/// Clears the selection and abandons any metadata fetch.
	pub fn clear_selection(&mut self) {
		if let Some(handle) = self.metadata_task.take() {
			handle.cancel(false);
		}
		self.selected = None;
		self.metadata = None;
	}

	/// Applies every completion received so far and returns the resulting
	/// redraw hints, including those produced synchronously by [`Self::expand`].
	pub fn pump(&mut self) -> Vec<TreeChange> {
		while let Ok(completion) = self.rx.try_recv() {
			self.apply(completion);
		}
		std::mem::take(&mut self.changes)
	}

	pub fn root(&self) -> Option<NodeId> {
		self.root
	}

	pub fn node(&self, id: NodeId) -> Option<&Node> {
		self.nodes.get(id.0 as usize)
	}

	/// Children of `id`; empty unless the node is loaded.
	pub fn children(&self, id: NodeId) -> &[NodeId] {
		self.node(id).map(Node::children).unwrap_or_default()
	}

	pub fn has_expand_affordance(&self, id: NodeId) -> bool {
		self.node(id).is_some_and(Node::has_expand_affordance)
	}

	/// Finds the first materialized node for `term`.
	pub fn find(&self, term: &TermId) -> Option<NodeId> {
		self.nodes.iter().find(|node| node.term().is_some_and(|t| &t.id == term)).map(Node::id)
	}

	/// Returns true while a child query for `id` is in flight.
	pub fn is_loading(&self, id: NodeId) -> bool {
		self.in_flight.contains_key(&id)
	}

	/// Number of child queries in flight.
	pub fn in_flight(&self) -> usize {
		self.in_flight.len()
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Initialisation generation; bumped by every re-init.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn selected(&self) -> Option<NodeId> {
		self.selected
	}

	/// Metadata of the selected node, once fetched.
	pub fn metadata(&self) -> Option<&Metadata> {
		self.metadata.as_ref()
	}

	fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
		self.nodes.get_mut(id.0 as usize)
	}

	fn push_node(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
		let id = NodeId(self.nodes.len() as u32);
		self.nodes.push(Node::new(id, parent, kind));
		id
	}

	/// Submits a depth-1 child query for `id` unless one is already in flight.
	fn fetch_children(&mut self, id: NodeId) {
		if self.in_flight.contains_key(&id) {
			return;
		}
		let Some(node) = self.node_mut(id) else {
			return;
		};
		let query = match &node.kind {
			NodeKind::Ontology(ontology) => ChildQuery::Roots(ontology.clone()),
			NodeKind::Term(term) => ChildQuery::Children(term.id.clone(), term.ontology.clone()),
			NodeKind::Empty => return,
		};
		node.state = LoadState::Probing;
		let name = match &query {
			ChildQuery::Roots(ontology) => format!("tree: roots of {ontology}"),
			ChildQuery::Children(term, _) => format!("tree: children of {term}"),
		};
		tracing::trace!(node = %id, task = %name, "tree.probe");

		let port = SharedPort::clone(&self.port);
		let tx = self.tx.clone();
		let generation = self.generation;
		let task = Task::new(name, move |ctx| async move {
			let call = async {
				match &query {
					ChildQuery::Roots(ontology) => port.get_root_terms(ontology).await,
					ChildQuery::Children(term, ontology) => port.get_children(term, ontology, 1).await,
				}
			};
			ctx.run_until_cancelled(call).await.unwrap_or(Err(QueryError::Cancelled))
		})
		.on_complete(move |outcome| {
			let _ = tx.send(Completion::Children { generation, node: id, outcome });
		});

		match self.manager.add_task(task) {
			Ok(handle) => {
				self.in_flight.insert(id, handle);
			}
			Err(err) => {
				tracing::warn!(node = %id, %err, "tree.probe_submit_failed");
				if let Some(node) = self.node_mut(id) {
					node.state = LoadState::Unknown;
					node.expand_requested = false;
				}
			}
		}
	}

	fn apply(&mut self, completion: Completion) {
		match completion {
			Completion::Children { generation, node, outcome } => {
				if generation != self.generation {
					tracing::trace!(node = %node, generation, current = self.generation, "tree.stale");
					return;
				}
				self.apply_children(node, outcome);
			}
			Completion::Metadata { generation, node, outcome } => {
				if generation != self.generation || self.selected != Some(node) {
					tracing::trace!(node = %node, generation, "tree.metadata_stale");
					return;
				}
				self.apply_metadata(node, outcome);
			}
		}
	}

	fn apply_children(&mut self, id: NodeId, outcome: TaskOutcome<Vec<Term>, QueryError>) {
		self.in_flight.remove(&id);
		let is_root = self.root == Some(id);
		let Some(node) = self.node_mut(id) else {
			return;
		};
		if node.state != LoadState::Probing {
			return;
		}

		match outcome {
			TaskOutcome::Succeeded(terms) if terms.is_empty() && is_root => {
				node.state = LoadState::Loaded;
				node.expand_requested = false;
				let sentinel = self.push_node(Some(id), NodeKind::Empty);
				if let Some(node) = self.node_mut(id) {
					node.children = vec![sentinel];
				}
				tracing::debug!(node = %id, "tree.empty_root");
				self.changes.push(TreeChange::ChildrenLoaded(id));
			}
			TaskOutcome::Succeeded(terms) if terms.is_empty() => {
				node.state = LoadState::NoChildren;
				node.expand_requested = false;
				self.changes.push(TreeChange::Resolved(id));
			}
			TaskOutcome::Succeeded(terms) => {
				node.state = LoadState::Collapsed;
				node.prefetched = Some(terms);
				if node.expand_requested {
					self.materialize(id);
				} else {
					self.changes.push(TreeChange::Resolved(id));
				}
			}
			TaskOutcome::Failed(err) => {
				tracing::warn!(node = %id, %err, "tree.probe_failed");
				node.state = LoadState::NoChildren;
				node.expand_requested = false;
				self.changes.push(TreeChange::ProbeFailed(id));
			}
			TaskOutcome::Panicked(msg) => {
				tracing::warn!(node = %id, %msg, "tree.probe_failed");
				node.state = LoadState::NoChildren;
				node.expand_requested = false;
				self.changes.push(TreeChange::ProbeFailed(id));
			}
			TaskOutcome::Cancelled | TaskOutcome::Interrupted => {
				node.state = LoadState::Unknown;
				node.expand_requested = false;
			}
		}
	}

	/// Turns prefetched terms into child nodes and probes each of them.
	fn materialize(&mut self, id: NodeId) {
		let Some(terms) = self.node_mut(id).and_then(|node| node.prefetched.take()) else {
			return;
		};
		let children: Vec<NodeId> = terms.into_iter().map(|term| self.push_node(Some(id), NodeKind::Term(term))).collect();
		if let Some(node) = self.node_mut(id) {
			node.state = LoadState::Loaded;
			node.expanded = true;
			node.expand_requested = false;
			node.children = children.clone();
		}
		tracing::debug!(node = %id, children = children.len(), "tree.materialize");
		self.changes.push(TreeChange::ChildrenLoaded(id));

		if self.config.prefetch {
			for child in children {
				self.fetch_children(child);
			}
		}
	}

	fn apply_metadata(&mut self, id: NodeId, outcome: TaskOutcome<Metadata, QueryError>) {
		self.metadata_task = None;
		match outcome {
			TaskOutcome::Succeeded(metadata) => {
				self.metadata = Some(metadata);
				self.changes.push(TreeChange::MetadataLoaded(id));
			}
			TaskOutcome::Failed(err) => {
				tracing::warn!(node = %id, %err, "tree.metadata_failed");
				self.changes.push(TreeChange::MetadataFailed(id));
			}
			TaskOutcome::Panicked(msg) => {
				tracing::warn!(node = %id, %msg, "tree.metadata_failed");
				self.changes.push(TreeChange::MetadataFailed(id));
			}
			TaskOutcome::Cancelled | TaskOutcome::Interrupted => {}
		}
	}
}
