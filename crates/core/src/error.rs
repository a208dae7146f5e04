//! Error types for the control plane.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for control-plane operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the control plane.
///
/// Best-effort operations (extraction, identity derivation, reload) do not
/// use these for "not ready yet" conditions; they return empty strings,
/// `None` or `false` instead.
#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Runtime(#[from] extdev_runtime::Error),

	/// The readiness probe never reached the debug port.
	#[error("debugging not available on port {port} after {attempts} attempts")]
	DebuggerUnavailable { port: u16, attempts: u32 },

	/// The HTTP discovery endpoint answered but offered nothing to connect to.
	#[error("endpoint discovery failed: {0}")]
	Discovery(String),

	#[error("invalid manifest at {}: {reason}", path.display())]
	Manifest { path: PathBuf, reason: String },

	#[error("extension not found: {0}")]
	ExtensionNotFound(String),

	/// In-page evaluation threw.
	#[error("evaluation failed: {0}")]
	Evaluation(String),

	#[error("browser launch failed: {0}")]
	Launch(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),
}

impl Error {
	/// Returns the underlying protocol error, if any.
	pub fn as_runtime(&self) -> Option<&extdev_runtime::Error> {
		match self {
			Error::Runtime(e) => Some(e),
			_ => None,
		}
	}

	/// Returns true if the browser lacks the command that was issued.
	pub fn is_method_not_found(&self) -> bool {
		self.as_runtime().is_some_and(extdev_runtime::Error::is_method_not_found)
	}

	/// Returns true if the target disappeared while the command ran.
	pub fn is_target_gone(&self) -> bool {
		self.as_runtime().is_some_and(extdev_runtime::Error::is_target_gone)
	}

	/// Returns true if the connection to the browser is gone.
	pub fn is_closed(&self) -> bool {
		self.as_runtime().is_some_and(extdev_runtime::Error::is_closed)
	}
}
