//! Raw protocol events to [`LogEvent`]s.

use std::sync::atomic::{AtomicU64, Ordering};

use extdev_protocol::target::is_extension_url;
use extdev_protocol::{CdpEvent, LogContext, LogEvent, LogLevel, RdpPacket, TargetKind};
use serde_json::Value;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
	NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

fn now_ms() -> i64 {
	chrono::Utc::now().timestamp_millis()
}

/// What is known about the target an event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
	pub kind: TargetKind,
	pub url: String,
	/// Set for tab-like targets only.
	pub tab_id: Option<String>,
}

impl SourceInfo {
	pub fn new(kind: TargetKind, url: impl Into<String>, tab_id: Option<String>) -> Self {
		Self {
			kind,
			url: url.into(),
			tab_id,
		}
	}
}

/// Background when the url is under an extension scheme, page otherwise.
pub fn infer_context(url: Option<&str>, source: Option<&SourceInfo>) -> LogContext {
	let extension_origin = url.is_some_and(is_extension_url) || source.is_some_and(|s| is_extension_url(&s.url));
	let background_kind = source.is_some_and(|s| matches!(s.kind, TargetKind::ServiceWorker | TargetKind::BackgroundPage));
	if extension_origin || background_kind {
		LogContext::Background
	} else {
		LogContext::Page
	}
}

fn build(level: LogLevel, parts: Vec<String>, url: Option<String>, timestamp: Option<f64>, source: Option<&SourceInfo>) -> LogEvent {
	let url = url.filter(|u| !u.is_empty()).or_else(|| source.map(|s| s.url.clone()).filter(|u| !u.is_empty()));
	LogEvent {
		id: next_id(),
		timestamp: timestamp.map(|t| t as i64).unwrap_or_else(now_ms),
		level,
		context: infer_context(url.as_deref(), source),
		message_parts: parts,
		url,
		tab_id: source.and_then(|s| s.tab_id.clone()),
	}
}

fn text(value: &Value, key: &str) -> Option<String> {
	value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Renders a CDP `RemoteObject` the way a console would.
fn remote_object_text(object: &Value) -> String {
	match object.get("value") {
		Some(Value::String(s)) => return s.clone(),
		Some(value) if !value.is_null() => return value.to_string(),
		_ => {}
	}
	text(object, "unserializableValue")
		.or_else(|| text(object, "description"))
		.or_else(|| match text(object, "type").as_deref() {
			Some("object") if text(object, "subtype").as_deref() == Some("null") => Some("null".into()),
			other => other.map(str::to_string),
		})
		.unwrap_or_default()
}

/// Renders an RDP value grip.
fn grip_text(grip: &Value) -> String {
	match grip {
		Value::String(s) => s.clone(),
		Value::Object(_) => match text(grip, "type").as_deref() {
			Some("undefined") => "undefined".into(),
			Some("null") => "null".into(),
			Some("longString") => text(grip, "initial").unwrap_or_default(),
			Some("object") => text(grip, "class").unwrap_or_else(|| "Object".into()),
			Some(other) => other.to_string(),
			None => grip.to_string(),
		},
		other => other.to_string(),
	}
}

/// Normalizes a CDP event; `None` for events that are not log-bearing.
pub fn from_cdp(event: &CdpEvent, source: Option<&SourceInfo>) -> Option<LogEvent> {
	let params = &event.params;
	match event.method.as_str() {
		"Runtime.consoleAPICalled" => {
			let level = LogLevel::from_protocol(params.get("type").and_then(Value::as_str).unwrap_or("log"));
			let parts = params
				.get("args")
				.and_then(Value::as_array)
				.map(|args| args.iter().map(remote_object_text).collect())
				.unwrap_or_default();
			let url = params.pointer("/stackTrace/callFrames/0/url").and_then(Value::as_str).map(str::to_string);
			Some(build(level, parts, url, params.get("timestamp").and_then(Value::as_f64), source))
		}
		"Log.entryAdded" => {
			let entry = params.get("entry")?;
			let level = LogLevel::from_protocol(entry.get("level").and_then(Value::as_str).unwrap_or("log"));
			let parts = text(entry, "text").into_iter().collect();
			Some(build(level, parts, text(entry, "url"), entry.get("timestamp").and_then(Value::as_f64), source))
		}
		"Runtime.exceptionThrown" => {
			let details = params.get("exceptionDetails")?;
			let message = details
				.pointer("/exception/description")
				.and_then(Value::as_str)
				.map(str::to_string)
				.or_else(|| text(details, "text"))
				.unwrap_or_else(|| "exception".into());
			Some(build(LogLevel::Error, vec![message], text(details, "url"), params.get("timestamp").and_then(Value::as_f64), source))
		}
		_ => None,
	}
}

fn console_message(message: &Value, source: Option<&SourceInfo>) -> LogEvent {
	let level = LogLevel::from_protocol(message.get("level").and_then(Value::as_str).unwrap_or("log"));
	let parts = message
		.get("arguments")
		.and_then(Value::as_array)
		.map(|args| args.iter().map(grip_text).collect())
		.unwrap_or_default();
	let timestamp = message.get("timeStamp").and_then(Value::as_f64);
	build(level, parts, text(message, "filename"), timestamp, source)
}

fn page_error(error: &Value, source: Option<&SourceInfo>) -> LogEvent {
	let warning = error.get("warning").and_then(Value::as_bool).unwrap_or(false);
	let level = if warning { LogLevel::Warn } else { LogLevel::Error };
	let message = error.get("errorMessage").map(grip_text).unwrap_or_else(|| "error".into());
	let timestamp = error.get("timeStamp").and_then(Value::as_f64);
	build(level, vec![message], text(error, "sourceName"), timestamp, source)
}

/// Normalizes an RDP notification; resource batches may carry several events.
pub fn from_rdp(packet: &RdpPacket, source: Option<&SourceInfo>) -> Vec<LogEvent> {
	match packet.kind.as_deref() {
		Some("consoleAPICall") => packet.get("message").map(|m| console_message(m, source)).into_iter().collect(),
		Some("pageError") => packet.get("pageError").map(|e| page_error(e, source)).into_iter().collect(),
		Some("logMessage") => {
			let parts = packet.get("message").map(grip_text).into_iter().collect();
			let timestamp = packet.get("timeStamp").and_then(Value::as_f64);
			vec![build(LogLevel::Log, parts, None, timestamp, source)]
		}
		Some("resources-available-array") => {
			let Some(batches) = packet.get("array").and_then(Value::as_array) else {
				return Vec::new();
			};
			let mut events = Vec::new();
			for batch in batches {
				let (Some(kind), Some(resources)) = (batch.get(0).and_then(Value::as_str), batch.get(1).and_then(Value::as_array)) else {
					continue;
				};
				for resource in resources {
					match kind {
						"console-message" => events.push(console_message(resource.get("message").unwrap_or(resource), source)),
						"error-message" => events.push(page_error(resource.get("pageError").unwrap_or(resource), source)),
						_ => {}
					}
				}
			}
			events
		}
		_ => Vec::new(),
	}
}
