use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Extdev(#[from] extdev::Error),

	#[error("invalid config {}: {reason}", path.display())]
	Config { path: PathBuf, reason: String },

	/// A required value was given neither on the command line nor in the config file.
	#[error("{0}")]
	Missing(String),

	#[error("no free debug port above {base_port} for instance {instance:?}")]
	NoFreePort { instance: String, base_port: u16 },

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}
