//! Error types for remote queries.

use thiserror::Error;

/// Failure of one remote query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
	/// The remote call failed: network down, service unavailable, timeout.
	#[error("connection error: {0}")]
	Connection(String),

	/// The service answered with a malformed or unexpected response shape.
	#[error("protocol anomaly: {0}")]
	Protocol(String),

	/// The caller abandoned the query before it completed.
	#[error("query cancelled")]
	Cancelled,
}

impl QueryError {
	/// Returns true for cancellation, which is never shown to the user.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}
}

/// Result type for remote queries.
pub type Result<T> = std::result::Result<T, QueryError>;
