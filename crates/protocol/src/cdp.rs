//! Chrome DevTools Protocol envelopes.
//!
//! CDP is JSON-RPC over a single WebSocket. Commands carry an integer `id` and,
//! when addressed to an attached target, a `sessionId`. The browser answers
//! with a response carrying the same `id`, and pushes unsolicited events that
//! carry a `method` and no `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Generic server error code Chromium uses for most command failures.
pub const SERVER_ERROR: i64 = -32000;

/// Outbound command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdpRequest {
	pub id: u64,
	pub method: String,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub params: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Error payload of a failed command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CdpError {
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

/// Response correlated to a [`CdpRequest`] by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdpResponse {
	pub id: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<CdpError>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Unsolicited protocol notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdpEvent {
	pub method: String,
	#[serde(default)]
	pub params: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

impl CdpEvent {
	/// Returns `true` if this event was emitted by the given session.
	pub fn is_from_session(&self, session_id: &str) -> bool {
		self.session_id.as_deref() == Some(session_id)
	}
}

/// Discriminated union of inbound messages.
///
/// Variant order matters for untagged decoding: anything with an `id` is a
/// response, anything with a `method` is an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CdpMessage {
	Response(CdpResponse),
	Event(CdpEvent),
	/// Forward-compatible catch-all.
	Unknown(Value),
}
