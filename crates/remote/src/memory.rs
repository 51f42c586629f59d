//! Deterministic in-process [`RemoteQueryPort`].
//!
//! Holds a small ontology catalogue in memory and records every call it
//! receives, so tests can assert exactly which remote requests a coordinator
//! issued. Latency is simulated with `tokio::time::sleep`, which makes the
//! port cooperate with paused test clocks.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;

use crate::{Metadata, Ontology, OntologyId, QueryError, RemoteQueryPort, Result, Term, TermId};

/// Remote capability being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
	ListOntologies,
	Search,
	RootTerms,
	Children,
	Metadata,
}

struct TermEntry {
	term: Term,
	children: Vec<TermId>,
	metadata: Metadata,
}

#[derive(Default)]
struct Catalog {
	ontologies: Vec<Ontology>,
	roots: HashMap<OntologyId, Vec<TermId>>,
	terms: HashMap<TermId, TermEntry>,
}

impl Catalog {
	fn insert_term(&mut self, term: Term) {
		self.terms.entry(term.id.clone()).or_insert(TermEntry {
			term,
			children: Vec::new(),
			metadata: Metadata::default(),
		});
	}

	fn collect_descendants(&self, term: &TermId, depth: u32, out: &mut Vec<Term>) {
		if depth == 0 {
			return;
		}
		let Some(entry) = self.terms.get(term) else {
			return;
		};
		for child in &entry.children {
			if let Some(child_entry) = self.terms.get(child) {
				out.push(child_entry.term.clone());
				self.collect_descendants(child, depth - 1, out);
			}
		}
	}
}

#[derive(Default)]
struct Faults {
	next: HashMap<CallKind, VecDeque<QueryError>>,
	children_of: HashMap<TermId, QueryError>,
}

#[derive(Default)]
struct Stats {
	calls: HashMap<CallKind, usize>,
	children_calls: HashMap<TermId, usize>,
	search_log: Vec<String>,
}

#[derive(Default)]
struct Latency {
	default: Duration,
	search: HashMap<String, Duration>,
}

/// In-memory ontology service.
#[derive(Default)]
pub struct MemoryPort {
	catalog: RwLock<Catalog>,
	faults: Mutex<Faults>,
	stats: Mutex<Stats>,
	latency: Mutex<Latency>,
}

impl std::fmt::Debug for MemoryPort {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let catalog = self.catalog.read();
		f.debug_struct("MemoryPort")
			.field("ontologies", &catalog.ontologies.len())
			.field("terms", &catalog.terms.len())
			.finish()
	}
}

#[derive(Deserialize)]
struct FixtureFile {
	ontologies: Vec<FixtureOntology>,
}

#[derive(Deserialize)]
struct FixtureOntology {
	id: OntologyId,
	title: String,
	#[serde(default)]
	description: Option<String>,
	#[serde(default)]
	terms: Vec<FixtureTerm>,
}

#[derive(Deserialize)]
struct FixtureTerm {
	id: TermId,
	label: String,
	#[serde(default)]
	metadata: Metadata,
	#[serde(default)]
	children: Vec<FixtureTerm>,
}

impl MemoryPort {
	/// Creates an empty port.
	pub fn new() -> Self {
		Self::default()
	}

	/// Loads a catalogue from a JSON fixture.
	///
	/// The fixture lists ontologies, each with a nested `terms` forest whose
	/// top level forms the ontology's root set.
	pub fn from_json(json: &str) -> Result<Self> {
		let file: FixtureFile = serde_json::from_str(json).map_err(|err| QueryError::Protocol(format!("invalid fixture: {err}")))?;
		let port = Self::new();
		{
			let mut catalog = port.catalog.write();
			for ontology in file.ontologies {
				catalog.ontologies.push(Ontology {
					id: ontology.id.clone(),
					title: ontology.title,
					description: ontology.description,
				});
				let mut roots = Vec::with_capacity(ontology.terms.len());
				for term in ontology.terms {
					roots.push(term.id.clone());
					load_fixture_term(&mut catalog, &ontology.id, term);
				}
				catalog.roots.insert(ontology.id, roots);
			}
		}
		Ok(port)
	}

	/// Adds an ontology with an empty root set.
	#[must_use]
	pub fn with_ontology(self, id: impl Into<OntologyId>, title: impl Into<String>) -> Self {
		{
			let mut catalog = self.catalog.write();
			let id = id.into();
			catalog.ontologies.push(Ontology {
				id: id.clone(),
				title: title.into(),
				description: None,
			});
			catalog.roots.entry(id).or_default();
		}
		self
	}

	/// Adds a root term to `ontology`.
	#[must_use]
	pub fn with_root(self, ontology: impl Into<OntologyId>, id: impl Into<TermId>, label: impl Into<String>) -> Self {
		{
			let mut catalog = self.catalog.write();
			let term = Term::new(id, label, ontology);
			catalog.roots.entry(term.ontology.clone()).or_default().push(term.id.clone());
			catalog.insert_term(term);
		}
		self
	}

	/// Adds a child under an existing `parent` term, in the parent's ontology.
	///
	/// # Panics
	///
	/// Panics if `parent` has not been added yet.
	#[must_use]
	pub fn with_child(self, parent: impl Into<TermId>, id: impl Into<TermId>, label: impl Into<String>) -> Self {
		{
			let mut catalog = self.catalog.write();
			let parent = parent.into();
			let ontology = match catalog.terms.get(&parent) {
				Some(entry) => entry.term.ontology.clone(),
				None => panic!("parent term {parent} must exist before adding children"),
			};
			let term = Term::new(id, label, ontology);
			let child_id = term.id.clone();
			catalog.insert_term(term);
			if let Some(entry) = catalog.terms.get_mut(&parent) {
				entry.children.push(child_id);
			}
		}
		self
	}

	/// Attaches metadata to an existing term.
	#[must_use]
	pub fn with_metadata(self, term: impl Into<TermId>, metadata: Metadata) -> Self {
		if let Some(entry) = self.catalog.write().terms.get_mut(&term.into()) {
			entry.metadata = metadata;
		}
		self
	}

	/// Sets the simulated latency applied to every call.
	pub fn set_latency(&self, latency: Duration) {
		self.latency.lock().default = latency;
	}

	/// Overrides the simulated latency for searches of exactly `text`.
	pub fn set_search_latency(&self, text: impl Into<String>, latency: Duration) {
		self.latency.lock().search.insert(text.into(), latency);
	}

	/// Makes the next call of `kind` fail with `error`.
	pub fn fail_next(&self, kind: CallKind, error: QueryError) {
		self.faults.lock().next.entry(kind).or_default().push_back(error);
	}

	/// Makes every child query for `term` fail with `error`.
	pub fn fail_children_of(&self, term: impl Into<TermId>, error: QueryError) {
		self.faults.lock().children_of.insert(term.into(), error);
	}

	/// Number of calls received for `kind`.
	pub fn calls(&self, kind: CallKind) -> usize {
		self.stats.lock().calls.get(&kind).copied().unwrap_or(0)
	}

	/// Total number of calls received across all kinds.
	pub fn total_calls(&self) -> usize {
		self.stats.lock().calls.values().sum()
	}

	/// Number of child queries received for `term`.
	pub fn children_calls(&self, term: &TermId) -> usize {
		self.stats.lock().children_calls.get(term).copied().unwrap_or(0)
	}

	/// Search texts received, in arrival order.
	pub fn search_log(&self) -> Vec<String> {
		self.stats.lock().search_log.clone()
	}

	fn record(&self, kind: CallKind) -> Result<()> {
		tracing::trace!(kind = ?kind, "memory_port.call");
		self.stats.lock().calls.entry(kind).and_modify(|n| *n += 1).or_insert(1);
		match self.faults.lock().next.get_mut(&kind).and_then(VecDeque::pop_front) {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	async fn delay(&self, search_text: Option<&str>) {
		let latency = {
			let latency = self.latency.lock();
			search_text.and_then(|text| latency.search.get(text).copied()).unwrap_or(latency.default)
		};
		if !latency.is_zero() {
			tokio::time::sleep(latency).await;
		}
	}
}

fn load_fixture_term(catalog: &mut Catalog, ontology: &OntologyId, term: FixtureTerm) {
	let mut children = Vec::with_capacity(term.children.len());
	for child in term.children {
		children.push(child.id.clone());
		load_fixture_term(catalog, ontology, child);
	}
	catalog.terms.insert(
		term.id.clone(),
		TermEntry {
			term: Term {
				id: term.id,
				label: term.label,
				ontology: ontology.clone(),
			},
			children,
			metadata: term.metadata,
		},
	);
}

#[async_trait]
impl RemoteQueryPort for MemoryPort {
	async fn list_ontologies(&self) -> Result<Vec<Ontology>> {
		self.record(CallKind::ListOntologies)?;
		self.delay(None).await;
		Ok(self.catalog.read().ontologies.clone())
	}

	async fn search_terms_by_name(&self, text: &str, scope: Option<&OntologyId>) -> Result<Vec<Term>> {
		self.stats.lock().search_log.push(text.to_string());
		self.record(CallKind::Search)?;
		self.delay(Some(text)).await;

		let needle = text.to_lowercase();
		let catalog = self.catalog.read();
		let mut hits: Vec<Term> = catalog
			.terms
			.values()
			.filter(|entry| scope.is_none_or(|ontology| &entry.term.ontology == ontology))
			.filter(|entry| entry.term.label.to_lowercase().contains(&needle) || entry.term.id.as_str().eq_ignore_ascii_case(text))
			.map(|entry| entry.term.clone())
			.collect();
		hits.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.id.cmp(&b.id)));
		Ok(hits)
	}

	async fn get_root_terms(&self, ontology: &OntologyId) -> Result<Vec<Term>> {
		self.record(CallKind::RootTerms)?;
		self.delay(None).await;

		let catalog = self.catalog.read();
		let Some(roots) = catalog.roots.get(ontology) else {
			return Err(QueryError::Protocol(format!("unknown ontology {ontology}")));
		};
		Ok(roots.iter().filter_map(|id| catalog.terms.get(id)).map(|entry| entry.term.clone()).collect())
	}

	async fn get_children(&self, term: &TermId, _ontology: &OntologyId, depth: u32) -> Result<Vec<Term>> {
		self.stats.lock().children_calls.entry(term.clone()).and_modify(|n| *n += 1).or_insert(1);
		self.record(CallKind::Children)?;
		if let Some(err) = self.faults.lock().children_of.get(term).cloned() {
			return Err(err);
		}
		self.delay(None).await;

		let catalog = self.catalog.read();
		if !catalog.terms.contains_key(term) {
			return Err(QueryError::Protocol(format!("unknown term {term}")));
		}
		let mut out = Vec::new();
		catalog.collect_descendants(term, depth, &mut out);
		Ok(out)
	}

	async fn get_term_metadata(&self, term: &TermId, _ontology: &OntologyId) -> Result<Metadata> {
		self.record(CallKind::Metadata)?;
		self.delay(None).await;

		self.catalog
			.read()
			.terms
			.get(term)
			.map(|entry| entry.metadata.clone())
			.ok_or_else(|| QueryError::Protocol(format!("unknown term {term}")))
	}
}

#[cfg(test)]
mod tests;
