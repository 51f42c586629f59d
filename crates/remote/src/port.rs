use std::sync::Arc;

use async_trait::async_trait;

use crate::{Metadata, Ontology, OntologyId, Result, Term, TermId};

/// Capability interface onto the remote ontology service.
///
/// Every method may wait on network I/O and may fail. Implementations must be
/// shareable across worker threads; callers race the returned futures against
/// their cancellation token, so dropping a pending future must be safe.
#[async_trait]
pub trait RemoteQueryPort: Send + Sync + 'static {
	/// Lists the ontologies offered by the service.
	async fn list_ontologies(&self) -> Result<Vec<Ontology>>;

	/// Searches terms whose label matches `text`, optionally within one ontology.
	async fn search_terms_by_name(&self, text: &str, scope: Option<&OntologyId>) -> Result<Vec<Term>>;

	/// Returns the root term set of an ontology.
	async fn get_root_terms(&self, ontology: &OntologyId) -> Result<Vec<Term>>;

	/// Returns the descendants of `term` down to `depth` levels (1 = direct children).
	async fn get_children(&self, term: &TermId, ontology: &OntologyId, depth: u32) -> Result<Vec<Term>>;

	/// Returns descriptive metadata for `term`.
	async fn get_term_metadata(&self, term: &TermId, ontology: &OntologyId) -> Result<Metadata>;
}

/// Owned, injectable client handle.
pub type SharedPort = Arc<dyn RemoteQueryPort>;
