use std::time::Duration;

use pretty_assertions::assert_eq;

use super::*;

fn sample() -> MemoryPort {
	MemoryPort::new()
		.with_ontology("go", "Gene Ontology")
		.with_root("go", "GO:0008150", "biological_process")
		.with_root("go", "GO:0003674", "molecular_function")
		.with_child("GO:0008150", "GO:0009987", "cellular process")
		.with_child("GO:0009987", "GO:0051301", "cell division")
		.with_ontology("chebi", "ChEBI")
		.with_root("chebi", "CHEBI:24431", "chemical entity")
}

#[tokio::test]
async fn search_is_case_insensitive_and_scoped() {
	let port = sample();
	let go = OntologyId::from("go");

	let all = port.search_terms_by_name("PROCESS", None).await.unwrap();
	let labels: Vec<_> = all.iter().map(|t| t.label.as_str()).collect();
	assert_eq!(labels, vec!["biological_process", "cellular process"]);

	let scoped = port.search_terms_by_name("entity", Some(&go)).await.unwrap();
	assert!(scoped.is_empty());
	assert_eq!(port.search_log(), vec!["PROCESS".to_string(), "entity".to_string()]);
	assert_eq!(port.calls(CallKind::Search), 2);
}

#[tokio::test]
async fn children_respect_depth() {
	let port = sample();
	let go = OntologyId::from("go");
	let root = TermId::from("GO:0008150");

	let direct = port.get_children(&root, &go, 1).await.unwrap();
	assert_eq!(direct.len(), 1);
	assert_eq!(direct[0].id, TermId::from("GO:0009987"));

	let two = port.get_children(&root, &go, 2).await.unwrap();
	assert_eq!(two.len(), 2);
	assert_eq!(port.children_calls(&root), 2);
}

#[tokio::test]
async fn unknown_term_is_a_protocol_anomaly() {
	let port = sample();
	let err = port.get_children(&TermId::from("GO:nope"), &OntologyId::from("go"), 1).await.unwrap_err();
	assert!(matches!(err, QueryError::Protocol(_)));
}

#[tokio::test]
async fn injected_failures_are_consumed_once() {
	let port = sample();
	port.fail_next(CallKind::ListOntologies, QueryError::Connection("down".into()));

	assert_eq!(port.list_ontologies().await, Err(QueryError::Connection("down".into())));
	assert_eq!(port.list_ontologies().await.unwrap().len(), 2);
	assert_eq!(port.calls(CallKind::ListOntologies), 2);
}

#[tokio::test(start_paused = true)]
async fn search_latency_can_be_set_per_query() {
	let port = sample();
	port.set_search_latency("slow", Duration::from_secs(5));

	let started = tokio::time::Instant::now();
	port.search_terms_by_name("fast", None).await.unwrap();
	assert!(started.elapsed() < Duration::from_secs(1));

	port.search_terms_by_name("slow", None).await.unwrap();
	assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test]
async fn loads_json_fixture() {
	let json = r#"{
		"ontologies": [{
			"id": "efo",
			"title": "Experimental Factor Ontology",
			"terms": [{
				"id": "EFO:0000001",
				"label": "experimental factor",
				"metadata": { "definition": "root", "synonyms": ["factor"] },
				"children": [{ "id": "EFO:0000408", "label": "disease" }]
			}]
		}]
	}"#;
	let port = MemoryPort::from_json(json).unwrap();
	let efo = OntologyId::from("efo");

	let roots = port.get_root_terms(&efo).await.unwrap();
	assert_eq!(roots, vec![Term::new("EFO:0000001", "experimental factor", "efo")]);

	let meta = port.get_term_metadata(&TermId::from("EFO:0000001"), &efo).await.unwrap();
	assert_eq!(meta.definition.as_deref(), Some("root"));
	assert_eq!(meta.synonyms, vec!["factor".to_string()]);
}

#[test]
fn malformed_fixture_is_rejected() {
	let err = MemoryPort::from_json("{ \"ontologies\": 3 }").unwrap_err();
	assert!(matches!(err, QueryError::Protocol(_)));
}
