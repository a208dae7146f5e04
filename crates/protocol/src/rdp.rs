//! Firefox Remote Debugging Protocol packets.
//!
//! RDP is actor-addressed: requests name a destination actor in `to` and an
//! operation in `type`; every packet from the server names its source actor in
//! `from`. Replies carry no correlation id; an actor answers its requests in
//! the order it received them. Notifications share the same shape, so they
//! are recognised by their `type`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Actor name of the root actor that greets every new connection.
pub const ROOT_ACTOR: &str = "root";

/// Packet `type` values that are always unsolicited notifications.
pub const UNSOLICITED_TYPES: &[&str] = &[
	"tabNavigated",
	"tabListChanged",
	"addonListChanged",
	"workerListChanged",
	"serviceWorkerRegistrationListChanged",
	"consoleAPICall",
	"pageError",
	"logMessage",
	"evaluationResult",
	"networkEvent",
	"networkEventUpdate",
	"frameUpdate",
	"newSource",
	"paused",
	"resumed",
	"resources-available-array",
	"resources-updated-array",
	"resources-destroyed-array",
	"target-available-form",
	"target-destroyed-form",
	"forwardingCancelled",
	"tabDetached",
];

/// Returns `true` if a packet `type` is a notification rather than a reply.
pub fn is_unsolicited_type(kind: &str) -> bool {
	UNSOLICITED_TYPES.contains(&kind)
}

/// Request addressed to an actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RdpRequest {
	pub to: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(flatten)]
	pub params: Map<String, Value>,
}

impl RdpRequest {
	/// Builds a request, flattening an object `params` into the packet body.
	///
	/// Non-object params are ignored; RDP bodies are always flat objects.
	pub fn new(to: impl Into<String>, kind: impl Into<String>, params: Value) -> Self {
		let params = match params {
			Value::Object(map) => map,
			_ => Map::new(),
		};
		Self {
			to: to.into(),
			kind: kind.into(),
			params,
		}
	}
}

/// Inbound packet (reply or notification).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RdpPacket {
	pub from: String,
	#[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
	pub kind: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(flatten)]
	pub body: Map<String, Value>,
}

impl RdpPacket {
	/// Returns `true` if this packet is a notification and must not resolve a pending request.
	pub fn is_unsolicited(&self) -> bool {
		self.kind.as_deref().is_some_and(is_unsolicited_type)
	}

	/// Returns `true` if this is the greeting the root actor sends on connect.
	pub fn is_greeting(&self) -> bool {
		self.from == ROOT_ACTOR && self.body.contains_key("applicationType")
	}

	/// Human-readable text accompanying an `error` reply.
	///
	/// `message` is only a string on error replies; console notifications use
	/// the same key for an object.
	pub fn error_message(&self) -> Option<&str> {
		self.body.get("message").and_then(Value::as_str)
	}

	/// Looks up a body field.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.body.get(key)
	}

	/// Reassembles the packet into a single JSON object.
	pub fn into_value(self) -> Value {
		serde_json::to_value(&self).unwrap_or(Value::Null)
	}
}
