//! Lazy ontology hierarchy.
//!
//! [`LazyTree`] materializes a term hierarchy one level at a time. Each
//! visible node is probed once for its direct children so the host can draw
//! an accurate expand affordance, and grandchildren are never requested until
//! their parent is expanded.

mod loader;
mod node;

pub use loader::{ExpandOutcome, LazyTree, TreeChange, TreeConfig};
pub use node::{LoadState, Node, NodeId, NodeKind};
