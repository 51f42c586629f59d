use std::time::Duration;

use ontopick_remote::{CallKind, MemoryPort, TermId};
use ontopick_worker::{ManagerConfig, TaskState, TasksChanged, UiQueue};
use pretty_assertions::assert_eq;
use tokio::time::sleep;

use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ViewEvent {
	Placeholder,
	Busy(bool),
	Results(String, Vec<TermId>),
	Error(String, QueryError),
}

#[derive(Default)]
struct RecordingView {
	events: Mutex<Vec<ViewEvent>>,
}

impl RecordingView {
	fn events(&self) -> Vec<ViewEvent> {
		self.events.lock().clone()
	}

	fn results(&self) -> Vec<(String, Vec<TermId>)> {
		self.events()
			.into_iter()
			.filter_map(|event| match event {
				ViewEvent::Results(query, ids) => Some((query, ids)),
				_ => None,
			})
			.collect()
	}
}

impl SearchView for RecordingView {
	fn show_placeholder(&self) {
		self.events.lock().push(ViewEvent::Placeholder);
	}

	fn set_busy(&self, busy: bool) {
		self.events.lock().push(ViewEvent::Busy(busy));
	}

	fn show_results(&self, query: &str, terms: &[Term]) {
		self.events.lock().push(ViewEvent::Results(query.to_string(), terms.iter().map(|t| t.id.clone()).collect()));
	}

	fn show_error(&self, query: &str, error: &QueryError) {
		self.events.lock().push(ViewEvent::Error(query.to_string(), error.clone()));
	}
}

fn port() -> Arc<MemoryPort> {
	Arc::new(
		MemoryPort::new()
			.with_ontology("go", "Gene Ontology")
			.with_root("go", "GO:0008150", "biological_process")
			.with_child("GO:0008150", "GO:0007049", "cell cycle")
			.with_child("GO:0008150", "GO:0006915", "apoptotic process")
			.with_ontology("chebi", "ChEBI")
			.with_root("chebi", "CHEBI:15377", "water"),
	)
}

struct Fixture {
	queue: UiQueue,
	manager: TaskManager,
	port: Arc<MemoryPort>,
	view: Arc<RecordingView>,
}

impl Fixture {
	fn new() -> Self {
		let queue = UiQueue::new();
		let manager = TaskManager::with_handle(ManagerConfig::with_max_concurrent(4), queue.dispatcher(), tokio::runtime::Handle::current());
		Self {
			queue,
			manager,
			port: port(),
			view: Arc::new(RecordingView::default()),
		}
	}

	fn pane(&self, scope: Option<&str>) -> SearchPane<RecordingView> {
		self.pane_with_view(scope, &self.view)
	}

	fn pane_with_view(&self, scope: Option<&str>, view: &Arc<RecordingView>) -> SearchPane<RecordingView> {
		self.pane_with_config(scope, view, SearchConfig::default())
	}

	fn pane_with_config(&self, scope: Option<&str>, view: &Arc<RecordingView>, config: SearchConfig) -> SearchPane<RecordingView> {
		let port: SharedPort = self.port.clone();
		SearchPane::new("test", scope.map(OntologyId::from), config, self.manager.clone(), port, view)
	}

	/// Advances the paused clock, then lets timers, workers and the UI queue run.
	async fn advance(&mut self, by: Duration) {
		sleep(by).await;
		for _ in 0..16 {
			tokio::task::yield_now().await;
			self.queue.pump(usize::MAX);
		}
	}
}

#[tokio::test(start_paused = true)]
async fn two_quick_keystrokes_fire_once_after_settling() {
	let mut fx = Fixture::new();
	let config = SearchConfig {
		min_query_len: 2,
		..SearchConfig::default()
	};
	let pane = fx.pane_with_config(None, &fx.view, config);

	pane.on_input("G");
	fx.advance(Duration::from_millis(200)).await;
	pane.on_input("GO");

	fx.advance(Duration::from_millis(950)).await;
	assert!(fx.port.search_log().is_empty(), "must not fire before the second keystroke settles");
	assert_eq!(pane.pending(), 1);

	fx.advance(Duration::from_millis(100)).await;
	assert_eq!(fx.port.search_log(), vec!["GO".to_string()]);
	assert_eq!(pane.pending(), 0);

	fx.advance(Duration::from_millis(1200)).await;
	assert_eq!(fx.port.calls(CallKind::Search), 1);
}

#[tokio::test(start_paused = true)]
async fn rapid_bursts_coalesce_into_one_query() {
	for burst in [1usize, 3, 10] {
		let mut fx = Fixture::new();
		let pane = fx.pane(None);
		let mut text = String::from("cel");
		for _ in 0..burst {
			text.push('l');
			pane.on_input(text.clone());
			fx.advance(Duration::from_millis(100)).await;
		}
		fx.advance(Duration::from_millis(1500)).await;

		assert_eq!(fx.port.search_log(), vec![text], "burst of {burst} keystrokes");
	}
}

#[tokio::test(start_paused = true)]
async fn results_are_applied_and_busy_is_cleared() {
	let mut fx = Fixture::new();
	let pane = fx.pane(Some("go"));

	pane.on_input("cycle");
	fx.advance(Duration::from_millis(1100)).await;

	assert_eq!(
		fx.view.events(),
		vec![
			ViewEvent::Busy(true),
			ViewEvent::Busy(false),
			ViewEvent::Results("cycle".to_string(), vec![TermId::from("GO:0007049")]),
		]
	);
	assert!(!pane.is_searching());
}

#[tokio::test(start_paused = true)]
async fn older_query_finishing_last_is_discarded() {
	let mut fx = Fixture::new();
	let pane = fx.pane(None);
	fx.port.set_search_latency("process", Duration::from_secs(5));

	pane.on_input("process");
	fx.advance(Duration::from_millis(1100)).await;
	assert_eq!(pane.generation(), 1);
	assert!(pane.is_searching());

	pane.on_input("apoptotic");
	fx.advance(Duration::from_millis(1100)).await;
	assert_eq!(pane.generation(), 2);

	fx.advance(Duration::from_secs(6)).await;

	assert_eq!(fx.port.search_log(), vec!["process".to_string(), "apoptotic".to_string()]);
	assert_eq!(fx.view.results(), vec![("apoptotic".to_string(), vec![TermId::from("GO:0006915")])]);
	assert!(fx.manager.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_generation_never_touches_the_view() {
	let fx = Fixture::new();
	let pane = fx.pane(None);
	let first = pane.inner.generation.next();
	pane.inner.generation.next();

	let outcome = pane.inner.apply(first, "old", TaskOutcome::Succeeded(vec![Term::new("GO:1", "old", "go")]));

	assert_eq!(outcome, ApplyOutcome::Stale);
	assert!(fx.view.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn short_queries_show_placeholder_without_searching() {
	let mut fx = Fixture::new();
	let pane = fx.pane(None);

	pane.on_input("ce");
	fx.advance(Duration::from_millis(1100)).await;

	assert_eq!(fx.port.total_calls(), 0);
	assert_eq!(fx.view.events(), vec![ViewEvent::Busy(false), ViewEvent::Placeholder]);
}

#[tokio::test(start_paused = true)]
async fn two_letter_query_is_below_the_default_minimum() {
	let mut fx = Fixture::new();
	let pane = fx.pane(None);

	pane.on_input("G");
	fx.advance(Duration::from_millis(200)).await;
	pane.on_input("GO");
	fx.advance(Duration::from_millis(1100)).await;

	assert!(fx.port.search_log().is_empty());
	assert_eq!(fx.view.events(), vec![ViewEvent::Busy(false), ViewEvent::Placeholder]);
	assert_eq!(pane.generation(), 1);
}

#[tokio::test(start_paused = true)]
async fn older_query_succeeding_after_newer_one_is_discarded() {
	let mut fx = Fixture::new();
	let config = SearchConfig {
		cancel_superseded: false,
		..SearchConfig::default()
	};
	let pane = fx.pane_with_config(None, &fx.view, config);
	let finished: Arc<Mutex<Vec<TaskState>>> = Arc::default();
	let sink = Arc::clone(&finished);
	let _subscription = fx.manager.subscribe(move |change: &TasksChanged| {
		sink.lock().extend(change.removed().into_iter().map(|t| t.state));
	});
	fx.port.set_search_latency("process", Duration::from_secs(5));

	pane.on_input("process");
	fx.advance(Duration::from_millis(1100)).await;
	pane.on_input("apoptotic");
	fx.advance(Duration::from_millis(1100)).await;

	assert_eq!(fx.view.results(), vec![("apoptotic".to_string(), vec![TermId::from("GO:0006915")])]);
	assert_eq!(fx.manager.len(), 1, "older query is still running");

	fx.advance(Duration::from_secs(5)).await;

	assert_eq!(*finished.lock(), vec![TaskState::Succeeded, TaskState::Succeeded]);
	assert_eq!(fx.view.results(), vec![("apoptotic".to_string(), vec![TermId::from("GO:0006915")])]);
	assert_eq!(fx.view.events().iter().filter(|e| matches!(e, ViewEvent::Busy(false))).count(), 1);
	assert!(fx.manager.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_search_leaves_list_empty_and_reports_error() {
	let mut fx = Fixture::new();
	let pane = fx.pane(None);
	fx.port.fail_next(CallKind::Search, QueryError::Connection("service unavailable".into()));

	pane.on_input("water");
	fx.advance(Duration::from_millis(1100)).await;

	assert_eq!(
		fx.view.events(),
		vec![
			ViewEvent::Busy(true),
			ViewEvent::Busy(false),
			ViewEvent::Results("water".to_string(), vec![]),
			ViewEvent::Error("water".to_string(), QueryError::Connection("service unavailable".into())),
		]
	);
}

#[tokio::test(start_paused = true)]
async fn torn_down_view_is_not_updated() {
	let mut fx = Fixture::new();
	let view = Arc::new(RecordingView::default());
	let pane = fx.pane_with_view(None, &view);
	fx.port.set_latency(Duration::from_secs(2));

	pane.on_input("water");
	fx.advance(Duration::from_millis(1100)).await;
	assert_eq!(view.events(), vec![ViewEvent::Busy(true)]);
	let weak = Arc::downgrade(&view);
	drop(view);

	fx.advance(Duration::from_secs(3)).await;
	assert!(weak.upgrade().is_none());
	assert_eq!(fx.port.calls(CallKind::Search), 1);
	assert!(fx.manager.is_empty());
}

#[tokio::test(start_paused = true)]
async fn panes_keep_independent_generations() {
	let mut fx = Fixture::new();
	let go_view = Arc::new(RecordingView::default());
	let chebi_view = Arc::new(RecordingView::default());
	let go_pane = fx.pane_with_view(Some("go"), &go_view);
	let chebi_pane = fx.pane_with_view(Some("chebi"), &chebi_view);

	go_pane.on_input("cycle");
	fx.advance(Duration::from_millis(300)).await;
	chebi_pane.on_input("water");
	fx.advance(Duration::from_millis(1500)).await;

	assert_eq!(go_pane.generation(), 1);
	assert_eq!(chebi_pane.generation(), 1);
	assert_eq!(go_view.results(), vec![("cycle".to_string(), vec![TermId::from("GO:0007049")])]);
	assert_eq!(chebi_view.results(), vec![("water".to_string(), vec![TermId::from("CHEBI:15377")])]);
}

#[tokio::test(start_paused = true)]
async fn cancel_abandons_pending_and_in_flight_searches() {
	let mut fx = Fixture::new();
	let pane = fx.pane(None);
	fx.port.set_latency(Duration::from_secs(2));

	pane.on_input("water");
	fx.advance(Duration::from_millis(1100)).await;
	assert!(pane.is_searching());
	pane.on_input("waters");
	pane.cancel();

	fx.advance(Duration::from_secs(3)).await;
	assert_eq!(fx.port.search_log(), vec!["water".to_string()]);
	assert!(fx.view.results().is_empty());
	assert_eq!(pane.pending(), 0);
	assert!(fx.manager.is_empty());
}

#[tokio::test(start_paused = true)]
async fn settled_input_refires_even_when_text_is_unchanged() {
	let mut fx = Fixture::new();
	let pane = fx.pane(None);

	pane.on_input("water");
	fx.advance(Duration::from_millis(1100)).await;
	pane.on_input("water");
	fx.advance(Duration::from_millis(1100)).await;

	assert_eq!(fx.port.search_log(), vec!["water".to_string(), "water".to_string()]);
}
