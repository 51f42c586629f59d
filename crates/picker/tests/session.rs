use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ontopick::{ChangeKind, ExpandOutcome, LoadState, PickerConfig, PickerSession, QueryError, SearchView, SessionPump, TaskState, TasksChanged, Term, TermId};
use ontopick_remote::{CallKind, MemoryPort};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::runtime::Handle;
use tokio::time::sleep;

use ontopick_search as _;
use ontopick_tree as _;
use ontopick_worker as _;
use serde as _;
use tempfile as _;
use thiserror as _;
use toml as _;
use tracing as _;

const FIXTURE: &str = r#"{
	"ontologies": [
		{
			"id": "go",
			"title": "Gene Ontology",
			"terms": [
				{
					"id": "GO:0008150",
					"label": "biological_process",
					"children": [
						{
							"id": "GO:0007049",
							"label": "cell cycle",
							"metadata": { "definition": "The progression of biochemical and morphological phases." },
							"children": [{ "id": "GO:0000278", "label": "mitotic cell cycle" }]
						},
						{ "id": "GO:0006915", "label": "apoptotic process" }
					]
				}
			]
		},
		{
			"id": "chebi",
			"title": "ChEBI",
			"terms": [{ "id": "CHEBI:15377", "label": "water" }]
		}
	]
}"#;

#[derive(Default)]
struct ResultsView {
	results: Mutex<Vec<(String, Vec<TermId>)>>,
	errors: Mutex<Vec<String>>,
}

impl ResultsView {
	fn last(&self) -> Option<(String, Vec<TermId>)> {
		self.results.lock().last().cloned()
	}
}

impl SearchView for ResultsView {
	fn show_placeholder(&self) {}

	fn set_busy(&self, _busy: bool) {}

	fn show_results(&self, query: &str, terms: &[Term]) {
		self.results.lock().push((query.to_string(), terms.iter().map(|t| t.id.clone()).collect()));
	}

	fn show_error(&self, _query: &str, error: &QueryError) {
		self.errors.lock().push(error.to_string());
	}
}

struct Harness {
	port: Arc<MemoryPort>,
	all: Arc<ResultsView>,
	scoped: Arc<ResultsView>,
	session: PickerSession<ResultsView>,
}

impl Harness {
	fn new(config: PickerConfig) -> Self {
		let _ = tracing_subscriber::fmt::try_init();
		let port = Arc::new(MemoryPort::from_json(FIXTURE).unwrap());
		let all = Arc::new(ResultsView::default());
		let scoped = Arc::new(ResultsView::default());
		let session = PickerSession::with_handle(config, port.clone(), &all, &scoped, Handle::current());
		Self { port, all, scoped, session }
	}

	async fn advance(&mut self, by: Duration) -> SessionPump {
		sleep(by).await;
		let mut total = SessionPump::default();
		for _ in 0..8 {
			for _ in 0..16 {
				tokio::task::yield_now().await;
			}
			let pump = self.session.pump();
			total.callbacks += pump.callbacks;
			total.ontologies_loaded |= pump.ontologies_loaded;
			total.tree.extend(pump.tree);
		}
		total
	}

	fn node(&self, term: &str) -> ontopick::NodeId {
		self.session.tree().find(&TermId::from(term)).unwrap()
	}
}

#[tokio::test(start_paused = true)]
async fn browse_search_and_inspect_a_term() {
	let mut h = Harness::new(PickerConfig::default());

	assert!(h.session.load_ontologies());
	assert!(!h.session.on_scoped_input("cyc"));
	let pump = h.advance(Duration::from_millis(10)).await;
	assert!(pump.ontologies_loaded);
	let titles: Vec<&str> = h.session.ontologies().iter().map(|o| o.title.as_str()).collect();
	assert_eq!(titles, vec!["Gene Ontology", "ChEBI"]);

	assert!(h.session.select_ontology("go".into()));
	assert!(!h.session.select_ontology("go".into()));
	h.advance(Duration::from_millis(10)).await;
	let bp = h.node("GO:0008150");
	assert_eq!(h.session.tree().node(bp).map(|n| n.state()), Some(LoadState::Collapsed));

	assert_eq!(h.session.tree_mut().expand(bp), ExpandOutcome::Expanded);
	let cc = h.node("GO:0007049");
	assert!(h.session.tree_mut().select(cc));
	h.advance(Duration::from_millis(10)).await;
	assert_eq!(
		h.session.tree().metadata().and_then(|m| m.definition.as_deref()),
		Some("The progression of biochemical and morphological phases.")
	);
	assert!(h.session.tree().has_expand_affordance(cc));
	assert!(!h.session.tree().has_expand_affordance(h.node("GO:0006915")));

	assert!(h.session.on_scoped_input("cyc"));
	h.session.on_search_input("wat");
	h.advance(Duration::from_millis(1100)).await;

	assert_eq!(
		h.scoped.last(),
		Some(("cyc".to_string(), vec![TermId::from("GO:0007049"), TermId::from("GO:0000278")]))
	);
	assert_eq!(h.all.last(), Some(("wat".to_string(), vec![TermId::from("CHEBI:15377")])));
	assert_eq!(h.port.calls(CallKind::Search), 2);

	h.session.shutdown().await;
	assert!(h.session.manager().is_shut_down());
	assert!(h.session.manager().is_empty());
	assert!(!h.session.load_ontologies());
}

#[tokio::test(start_paused = true)]
async fn catalogue_failure_is_kept_for_the_host() {
	let mut h = Harness::new(PickerConfig::default());
	h.port.fail_next(CallKind::ListOntologies, QueryError::Connection("service unavailable".into()));

	h.session.load_ontologies();
	let pump = h.advance(Duration::from_millis(10)).await;

	assert!(!pump.ontologies_loaded);
	assert!(h.session.ontologies().is_empty());
	assert_eq!(h.session.catalogue_error(), Some(&QueryError::Connection("service unavailable".into())));

	h.session.load_ontologies();
	let pump = h.advance(Duration::from_millis(10)).await;
	assert!(pump.ontologies_loaded);
	assert_eq!(h.session.catalogue_error(), None);
}

#[tokio::test(start_paused = true)]
async fn changing_ontology_rescopes_search_and_tree() {
	let mut h = Harness::new(PickerConfig::default());
	h.session.select_ontology("go".into());
	h.advance(Duration::from_millis(10)).await;

	h.session.select_ontology("chebi".into());
	h.session.on_scoped_input("water");
	h.advance(Duration::from_millis(1100)).await;

	let root = h.session.tree().root().unwrap();
	let labels: Vec<String> = h
		.session
		.tree()
		.children(root)
		.iter()
		.filter_map(|id| h.session.tree().node(*id))
		.map(|n| n.label().to_string())
		.collect();
	assert_eq!(labels, vec!["water"]);
	assert_eq!(h.scoped.last(), Some(("water".to_string(), vec![TermId::from("CHEBI:15377")])));
	assert_eq!(h.session.scoped_pane().and_then(|p| p.scope()).map(|o| o.as_str()), Some("chebi"));
}

#[tokio::test(start_paused = true)]
async fn observers_see_every_task_come_and_go() {
	let mut h = Harness::new(PickerConfig::default());
	let added = Arc::new(AtomicUsize::new(0));
	let removed = Arc::new(AtomicUsize::new(0));
	let (a, r) = (Arc::clone(&added), Arc::clone(&removed));
	let _subscription = h.session.manager().subscribe(move |change: &TasksChanged| match change.kind {
		ChangeKind::Added => {
			a.fetch_add(change.added().len(), Ordering::SeqCst);
		}
		ChangeKind::Removed => {
			r.fetch_add(change.removed().len(), Ordering::SeqCst);
		}
	});

	h.session.load_ontologies();
	h.session.select_parent_term(Term::new("GO:0007049", "cell cycle", "go"));
	h.advance(Duration::from_millis(10)).await;

	// catalogue, children of the parent, probe of its single child
	assert_eq!(added.load(Ordering::SeqCst), 3);
	assert_eq!(removed.load(Ordering::SeqCst), 3);
	assert!(h.session.manager().is_empty());
	assert_eq!(h.port.calls(CallKind::RootTerms), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_now_abandons_queued_work() {
	let config = PickerConfig::from_toml("[workers]\nmax_concurrent = 1\n").unwrap();
	let mut h = Harness::new(config);
	h.port.set_latency(Duration::from_secs(5));

	h.session.load_ontologies();
	h.session.select_ontology("go".into());
	assert_eq!(h.session.manager().running(), 1);

	let abandoned = h.session.shutdown_now();
	assert_eq!(abandoned.len(), 1);
	assert_eq!(abandoned[0].name.as_ref(), "tree: roots of go");
	assert_eq!(abandoned[0].state, TaskState::Cancelled);

	h.advance(Duration::from_millis(10)).await;
	let root = h.session.tree().root().unwrap();
	assert_eq!(h.session.tree().node(root).map(|n| n.state()), Some(LoadState::Unknown));
	assert!(h.session.ontologies().is_empty());
	assert!(h.session.manager().is_empty());
}
