//! Picker configuration.
//!
//! Read from TOML. Every field has a default, so an empty file (or no file)
//! yields a working configuration:
//!
//! ```toml
//! [workers]
//! max_concurrent = 4
//!
//! [search]
//! settle_ms = 1000
//! min_query_len = 3
//! cancel_superseded = true
//!
//! [tree]
//! prefetch = true
//!
//! [tasks]
//! deadline_ms = 30000
//!
//! [ui]
//! pump_budget = 64
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ontopick_search::SearchConfig;
use ontopick_tree::TreeConfig;
use ontopick_worker::ManagerConfig;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {path}: {error}")]
	Io {
		path: PathBuf,
		error: std::io::Error,
	},

	#[error("failed to parse config: {0}")]
	Parse(#[from] toml::de::Error),

	/// A value parsed but is out of range.
	#[error("invalid config value for {field}: {reason}")]
	Invalid { field: &'static str, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkersConfig {
	pub max_concurrent: usize,
}

impl Default for WorkersConfig {
	fn default() -> Self {
		Self { max_concurrent: 4 }
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchSection {
	/// Quiet period after the last keystroke, in milliseconds.
	pub settle_ms: u64,
	pub min_query_len: usize,
	/// Cancel an in-flight query once a newer one fires.
	pub cancel_superseded: bool,
}

impl Default for SearchSection {
	fn default() -> Self {
		Self {
			settle_ms: 1000,
			min_query_len: 3,
			cancel_superseded: true,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreeSection {
	pub prefetch: bool,
}

impl Default for TreeSection {
	fn default() -> Self {
		Self { prefetch: true }
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TasksSection {
	/// Deadline for tasks that do not set their own, in milliseconds.
	pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UiSection {
	/// Maximum completion callbacks run per pump.
	pub pump_budget: usize,
}

impl Default for UiSection {
	fn default() -> Self {
		Self { pump_budget: 64 }
	}
}

/// Complete picker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PickerConfig {
	pub workers: WorkersConfig,
	pub search: SearchSection,
	pub tree: TreeSection,
	pub tasks: TasksSection,
	pub ui: UiSection,
}

impl PickerConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml(source: &str) -> Result<Self> {
		let config: Self = toml::from_str(source)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let config = Self::from_toml(&source)?;
		tracing::debug!(path = %path.display(), "config.load");
		Ok(config)
	}

	pub fn validate(&self) -> Result<()> {
		if self.workers.max_concurrent == 0 {
			return Err(ConfigError::Invalid {
				field: "workers.max_concurrent",
				reason: "must be at least 1",
			});
		}
		if self.ui.pump_budget == 0 {
			return Err(ConfigError::Invalid {
				field: "ui.pump_budget",
				reason: "must be at least 1",
			});
		}
		if self.tasks.deadline_ms == Some(0) {
			return Err(ConfigError::Invalid {
				field: "tasks.deadline_ms",
				reason: "must be positive when set",
			});
		}
		Ok(())
	}

	pub fn manager_config(&self) -> ManagerConfig {
		ManagerConfig::with_max_concurrent(self.workers.max_concurrent.max(1)).deadline(self.tasks.deadline_ms.map(Duration::from_millis))
	}

	pub fn search_config(&self) -> SearchConfig {
		SearchConfig {
			settle: Duration::from_millis(self.search.settle_ms),
			min_query_len: self.search.min_query_len,
			cancel_superseded: self.search.cancel_superseded,
		}
	}

	pub fn tree_config(&self) -> TreeConfig {
		TreeConfig { prefetch: self.tree.prefetch }
	}
}

#[cfg(test)]
mod tests;
