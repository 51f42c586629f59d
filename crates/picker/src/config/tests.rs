use std::io::Write;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn empty_document_yields_defaults() {
	let config = PickerConfig::from_toml("").unwrap();

	assert_eq!(config, PickerConfig::default());
	assert_eq!(config.search_config(), SearchConfig::default());
	assert_eq!(config.tree_config(), TreeConfig::default());
	assert_eq!(config.manager_config().max_concurrent, 4);
	assert_eq!(config.manager_config().deadline, None);
	assert_eq!(config.ui.pump_budget, 64);
}

#[test]
fn sections_override_defaults() {
	let config = PickerConfig::from_toml(
		r#"
[workers]
max_concurrent = 2

[search]
settle_ms = 250
cancel_superseded = false

[tree]
prefetch = false

[tasks]
deadline_ms = 30000
"#,
	)
	.unwrap();

	assert_eq!(config.workers.max_concurrent, 2);
	assert_eq!(
		config.search_config(),
		SearchConfig {
			settle: Duration::from_millis(250),
			min_query_len: 3,
			cancel_superseded: false,
		}
	);
	assert!(!config.tree_config().prefetch);
	assert_eq!(config.manager_config().deadline, Some(Duration::from_secs(30)));
}

#[test]
fn zero_workers_is_rejected() {
	let err = PickerConfig::from_toml("[workers]\nmax_concurrent = 0\n").unwrap_err();

	assert!(matches!(
		err,
		ConfigError::Invalid {
			field: "workers.max_concurrent",
			..
		}
	));
}

#[test]
fn zero_pump_budget_is_rejected() {
	let err = PickerConfig::from_toml("[ui]\npump_budget = 0\n").unwrap_err();

	assert!(matches!(err, ConfigError::Invalid { field: "ui.pump_budget", .. }));
}

#[test]
fn unknown_keys_are_parse_errors() {
	let err = PickerConfig::from_toml("[search]\nsettle = 5\n").unwrap_err();

	assert!(matches!(err, ConfigError::Parse(_)), "{err}");
}

#[test]
fn load_reads_from_disk() {
	let mut file = tempfile::NamedTempFile::new().unwrap();
	writeln!(file, "[search]\nmin_query_len = 2").unwrap();

	let config = PickerConfig::load(file.path()).unwrap();

	assert_eq!(config.search.min_query_len, 2);
}

#[test]
fn missing_file_is_an_io_error() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("absent.toml");

	let err = PickerConfig::load(&path).unwrap_err();

	assert!(matches!(err, ConfigError::Io { path: p, .. } if p == path));
}
