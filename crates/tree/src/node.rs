use std::fmt;

use ontopick_remote::{OntologyId, Term};

/// Index of a node in the tree arena.
///
/// Only meaningful for the tree generation that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "node#{}", self.0)
	}
}

/// What a node stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
	/// Synthetic root standing for a whole ontology.
	Ontology(OntologyId),
	Term(Term),
	/// Placeholder shown when a root has no terms.
	Empty,
}

/// Child-loading state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
	/// Never asked about; shown with an expand affordance.
	Unknown,
	/// Direct children are being fetched.
	Probing,
	/// Known to have no children (or its probe failed).
	NoChildren,
	/// Has children, prefetched but not yet materialized.
	Collapsed,
	/// Children are materialized as nodes.
	Loaded,
}

impl LoadState {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unknown => "unknown",
			Self::Probing => "probing",
			Self::NoChildren => "no_children",
			Self::Collapsed => "collapsed",
			Self::Loaded => "loaded",
		}
	}
}

/// One node of the hierarchy.
#[derive(Debug, Clone)]
pub struct Node {
	pub(crate) id: NodeId,
	pub(crate) parent: Option<NodeId>,
	pub(crate) kind: NodeKind,
	pub(crate) state: LoadState,
	pub(crate) children: Vec<NodeId>,
	pub(crate) prefetched: Option<Vec<Term>>,
	pub(crate) expanded: bool,
	pub(crate) expand_requested: bool,
}

impl Node {
	pub(crate) fn new(id: NodeId, parent: Option<NodeId>, kind: NodeKind) -> Self {
		let state = match kind {
			NodeKind::Empty => LoadState::NoChildren,
			_ => LoadState::Unknown,
		};
		Self {
			id,
			parent,
			kind,
			state,
			children: Vec::new(),
			prefetched: None,
			expanded: false,
			expand_requested: false,
		}
	}

	pub fn id(&self) -> NodeId {
		self.id
	}

	pub fn parent(&self) -> Option<NodeId> {
		self.parent
	}

	pub fn kind(&self) -> &NodeKind {
		&self.kind
	}

	pub fn state(&self) -> LoadState {
		self.state
	}

	pub fn children(&self) -> &[NodeId] {
		&self.children
	}

	pub fn is_expanded(&self) -> bool {
		self.expanded
	}

	/// Returns the term this node stands for, if any.
	pub fn term(&self) -> Option<&Term> {
		match &self.kind {
			NodeKind::Term(term) => Some(term),
			_ => None,
		}
	}

	/// Display label.
	pub fn label(&self) -> &str {
		match &self.kind {
			NodeKind::Ontology(id) => id.as_str(),
			NodeKind::Term(term) => &term.label,
			NodeKind::Empty => "No terms",
		}
	}

	/// Returns true when the host should draw an expand affordance.
	///
	/// Unresolved nodes keep the affordance until a probe proves them empty.
	pub fn has_expand_affordance(&self) -> bool {
		match self.state {
			LoadState::Unknown | LoadState::Probing | LoadState::Collapsed => true,
			LoadState::Loaded => !self.children.is_empty(),
			LoadState::NoChildren => false,
		}
	}
}
