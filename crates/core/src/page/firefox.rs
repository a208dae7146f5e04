//! Evaluation through a Firefox console actor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use extdev_runtime::{RdpConnection, wait_for_event};
use serde_json::{Value, json};

use super::Evaluate;
use crate::error::{Error, Result};

/// Evaluates expressions with `evaluateJSAsync` on one console actor.
///
/// The reply only carries a `resultID`; the value arrives later as an
/// `evaluationResult` notification.
pub struct ConsoleEvaluator {
	connection: Arc<RdpConnection>,
	console_actor: String,
	timeout: Duration,
}

impl ConsoleEvaluator {
	pub fn new(connection: Arc<RdpConnection>, console_actor: impl Into<String>) -> Self {
		Self {
			connection,
			console_actor: console_actor.into(),
			timeout: Duration::from_secs(10),
		}
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	/// Turns a result grip into a plain value, fetching long strings in full.
	async fn resolve_grip(&self, grip: &Value) -> Result<Value> {
		let Some(kind) = grip.get("type").and_then(Value::as_str) else {
			return Ok(grip.clone());
		};
		match kind {
			"undefined" | "null" => Ok(Value::Null),
			"longString" => {
				let actor = grip
					.get("actor")
					.and_then(Value::as_str)
					.ok_or_else(|| Error::Evaluation("longString grip without actor".into()))?;
				let length = grip.get("length").and_then(Value::as_u64).unwrap_or(0);
				let reply = self
					.connection
					.request(actor, "substring", json!({"start": 0, "end": length}))
					.await?;
				Ok(reply.get("substring").cloned().unwrap_or(Value::Null))
			}
			_ => Ok(grip.clone()),
		}
	}
}

#[async_trait]
impl Evaluate for ConsoleEvaluator {
	async fn evaluate(&self, expression: &str) -> Result<Value> {
		let mut events = self.connection.subscribe();
		let reply = self
			.connection
			.request(&self.console_actor, "evaluateJSAsync", json!({"text": expression, "eager": false}))
			.await?;
		let result_id = reply
			.get("resultID")
			.and_then(Value::as_str)
			.map(str::to_string)
			.ok_or_else(|| Error::Evaluation("evaluateJSAsync reply without resultID".into()))?;

		let packet = wait_for_event(&mut events, self.timeout, |packet| {
			packet.kind.as_deref() == Some("evaluationResult") && packet.get("resultID").and_then(Value::as_str) == Some(result_id.as_str())
		})
		.await
		.ok_or_else(|| Error::Evaluation(format!("no evaluation result within {}ms", self.timeout.as_millis())))?;

		if let Some(message) = packet.get("exceptionMessage").filter(|m| !m.is_null()) {
			let text = match message {
				Value::String(text) => text.clone(),
				other => other.get("initial").and_then(Value::as_str).unwrap_or("exception").to_string(),
			};
			return Err(Error::Evaluation(text));
		}

		match packet.get("result") {
			Some(grip) => self.resolve_grip(grip).await,
			None => Ok(Value::Null),
		}
	}
}
