use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identity of one ontology (e.g. `go`, `chebi`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OntologyId(Arc<str>);

impl OntologyId {
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for OntologyId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for OntologyId {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

/// Identity of one term (e.g. `GO:0008150`).
///
/// Never derived from rendered labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(Arc<str>);

impl TermId {
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for TermId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for TermId {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

/// Ontology catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ontology {
	pub id: OntologyId,
	pub title: String,
	#[serde(default)]
	pub description: Option<String>,
}

/// One term as returned by search and hierarchy queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
	pub id: TermId,
	pub label: String,
	pub ontology: OntologyId,
}

impl Term {
	pub fn new(id: impl Into<TermId>, label: impl Into<String>, ontology: impl Into<OntologyId>) -> Self {
		Self {
			id: id.into(),
			label: label.into(),
			ontology: ontology.into(),
		}
	}
}

/// Descriptive metadata for one term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
	#[serde(default)]
	pub definition: Option<String>,
	#[serde(default)]
	pub synonyms: Vec<String>,
	#[serde(default)]
	pub xrefs: Vec<String>,
	/// Remaining annotation properties keyed by property name.
	#[serde(default)]
	pub annotations: BTreeMap<String, Vec<String>>,
}
