//! A flattened CDP session that re-attaches itself when it goes stale.

use std::sync::Arc;
use std::time::Duration;

use extdev_protocol::Session;
use extdev_runtime::{CdpConnection, wait_for_event};
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Error, Result};

/// Session bound to one target, shared by everything that inspects that target.
pub struct AttachedSession {
	connection: Arc<CdpConnection>,
	target_id: String,
	session_id: watch::Sender<String>,
}

impl AttachedSession {
	pub fn new(connection: Arc<CdpConnection>, session: Session) -> Self {
		Self {
			connection,
			target_id: session.target_id,
			session_id: watch::Sender::new(session.session_id),
		}
	}

	pub fn connection(&self) -> &Arc<CdpConnection> {
		&self.connection
	}

	pub fn target_id(&self) -> &str {
		&self.target_id
	}

	pub fn session_id(&self) -> String {
		self.session_id.borrow().clone()
	}

	/// Yields the new session id after each re-attach.
	pub fn reattached(&self) -> watch::Receiver<String> {
		self.session_id.subscribe()
	}

	pub fn session(&self) -> Session {
		Session {
			session_id: self.session_id(),
			target_id: self.target_id.clone(),
		}
	}

	/// Sends a command on this session.
	///
	/// A session-not-found reply triggers one re-attach to the same target
	/// and one retry.
	pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
		let session_id = self.session_id();
		match self.connection.send(method, params.clone(), Some(&session_id)).await {
			Err(e) if e.is_session_not_found() => {
				debug!(target = "extdev", method, target_id = %self.target_id, "session went stale, re-attaching");
				let fresh = self.reattach().await?;
				Ok(self.connection.send(method, params, Some(&fresh)).await?)
			}
			other => Ok(other?),
		}
	}

	async fn reattach(&self) -> Result<String> {
		let reply = self
			.connection
			.send("Target.attachToTarget", json!({"targetId": self.target_id, "flatten": true}), None)
			.await?;
		let fresh = session_id_from(&reply)?;
		self.session_id.send_replace(fresh.clone());
		Ok(fresh)
	}

	/// Evaluates an expression and returns its value by copy.
	pub async fn evaluate(&self, expression: &str) -> Result<Value> {
		let reply = self
			.send(
				"Runtime.evaluate",
				json!({"expression": expression, "returnByValue": true, "awaitPromise": true}),
			)
			.await?;
		evaluation_value(reply)
	}

	/// Waits for the page's load event, returning `false` on timeout.
	///
	/// Returns immediately when the document has already finished loading.
	pub async fn wait_for_load(&self, timeout: Duration) -> bool {
		let mut events = self.connection.subscribe();
		if matches!(self.evaluate("document.readyState").await, Ok(Value::String(ref state)) if state == "complete") {
			return true;
		}

		let session_id = self.session_id();
		wait_for_event(&mut events, timeout, |event| {
			event.method == "Page.loadEventFired" && event.is_from_session(&session_id)
		})
		.await
		.is_some()
	}
}

/// Pulls `sessionId` out of a `Target.attachToTarget` reply.
pub(crate) fn session_id_from(reply: &Value) -> Result<String> {
	reply
		.get("sessionId")
		.and_then(Value::as_str)
		.map(str::to_string)
		.ok_or_else(|| Error::Runtime(extdev_runtime::Error::InvalidResponse("attachToTarget reply without sessionId".into())))
}

/// Unwraps a `Runtime.evaluate` reply into its value.
pub(crate) fn evaluation_value(reply: Value) -> Result<Value> {
	if let Some(details) = reply.get("exceptionDetails") {
		let text = details
			.pointer("/exception/description")
			.and_then(Value::as_str)
			.or_else(|| details.get("text").and_then(Value::as_str))
			.unwrap_or("uncaught exception");
		return Err(Error::Evaluation(text.to_string()));
	}
	Ok(reply.pointer("/result/value").cloned().unwrap_or(Value::Null))
}
