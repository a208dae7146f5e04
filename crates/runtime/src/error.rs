//! Error types for the debugging-protocol runtime.

use extdev_protocol::cdp::METHOD_NOT_FOUND;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a browser.
#[derive(Debug, Error)]
pub enum Error {
	/// Could not open the transport.
	#[error("Failed to connect to {address}: {reason}")]
	ConnectionFailed { address: String, reason: String },

	/// The connection was closed, by either side, before a reply arrived.
	#[error("Connection closed")]
	Closed,

	/// No reply within the per-command timeout.
	#[error("Timed out after {timeout_ms}ms waiting for `{method}`")]
	TimedOut { method: String, timeout_ms: u64 },

	/// CDP error reply.
	#[error("Protocol error {code}: {message}")]
	Protocol { code: i64, message: String },

	/// RDP error reply.
	#[error("Actor {actor} replied {error}: {message}")]
	Actor { actor: String, error: String, message: String },

	/// Framing or socket-level failure.
	#[error("Transport error: {0}")]
	Transport(String),

	/// A reply arrived but did not have the expected shape.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if the browser does not implement the requested command.
	///
	/// Chromium answers unknown methods with `-32601` but reports disabled
	/// domains with `-32000` and a "wasn't found"/"not available" message.
	pub fn is_method_not_found(&self) -> bool {
		match self {
			Error::Protocol { code, message } => {
				let message = message.to_ascii_lowercase();
				*code == METHOD_NOT_FOUND
					|| message.contains("wasn't found")
					|| (message.contains("not found") && message.contains("method"))
					|| message.contains("method not available")
					|| message.contains("not allowed")
			}
			Error::Actor { error, .. } => error == "unrecognizedPacketType" || error == "noSuchActor",
			_ => false,
		}
	}

	/// Returns true if a command targeted a session that no longer exists.
	pub fn is_session_not_found(&self) -> bool {
		match self {
			Error::Protocol { message, .. } => message.contains("Session with given id not found") || message.contains("No session with given id"),
			_ => false,
		}
	}

	/// Returns true if the target went away underneath the command.
	///
	/// Expected when a command causes its own context to reload.
	pub fn is_target_gone(&self) -> bool {
		match self {
			Error::Protocol { message, .. } => {
				message.contains("Target closed")
					|| message.contains("Inspected target navigated or closed")
					|| message.contains("Execution context was destroyed")
					|| message.contains("No target with given id")
			}
			Error::Actor { error, .. } => error == "noSuchActor" || error == "wrongState",
			_ => false,
		}
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::TimedOut { .. })
	}

	/// Returns true if the connection is gone.
	pub fn is_closed(&self) -> bool {
		matches!(self, Error::Closed | Error::ConnectionFailed { .. })
	}
}
