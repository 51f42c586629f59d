//! Remote ontology query capability.
//!
//! The picker never talks to the network directly. Every remote call goes
//! through [`RemoteQueryPort`], an injected client handle that task work
//! closures capture by `Arc`. Term and ontology identities are first-class
//! values ([`TermId`], [`OntologyId`]) kept apart from their display labels.
//!
//! [`MemoryPort`] is a deterministic in-process implementation used by tests
//! and demos. It counts calls per kind and per term, supports injected
//! latency and failures, and loads fixtures from JSON.

mod error;
pub mod memory;
mod port;
mod types;

pub use error::{QueryError, Result};
pub use memory::{CallKind, MemoryPort};
pub use port::{RemoteQueryPort, SharedPort};
pub use types::{Metadata, Ontology, OntologyId, Term, TermId};
