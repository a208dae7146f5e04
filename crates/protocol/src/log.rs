//! Normalized log events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Trace,
	Debug,
	#[default]
	Log,
	Info,
	Warn,
	Error,
}

impl LogLevel {
	pub const ALL: [LogLevel; 6] = [
		LogLevel::Trace,
		LogLevel::Debug,
		LogLevel::Log,
		LogLevel::Info,
		LogLevel::Warn,
		LogLevel::Error,
	];

	/// Position in [`LogLevel::ALL`].
	pub fn rank(self) -> u8 {
		self as u8
	}

	/// Maps a protocol level/category string onto a level.
	///
	/// Accepts both CDP (`warning`, `verbose`, `assert`) and RDP spellings;
	/// anything unrecognised is `log`.
	pub fn from_protocol(raw: &str) -> Self {
		match raw.to_ascii_lowercase().as_str() {
			"trace" => LogLevel::Trace,
			"debug" | "verbose" => LogLevel::Debug,
			"info" => LogLevel::Info,
			"warn" | "warning" => LogLevel::Warn,
			"error" | "assert" | "exception" => LogLevel::Error,
			_ => LogLevel::Log,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			LogLevel::Trace => "trace",
			LogLevel::Debug => "debug",
			LogLevel::Log => "log",
			LogLevel::Info => "info",
			LogLevel::Warn => "warn",
			LogLevel::Error => "error",
		}
	}
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for LogLevel {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		LogLevel::ALL
			.into_iter()
			.find(|level| level.as_str().eq_ignore_ascii_case(s))
			.ok_or_else(|| format!("unknown log level: {s}"))
	}
}

/// Where a log event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogContext {
	Page,
	Background,
	Content,
	Sidebar,
	Popup,
	Options,
	Devtools,
}

impl LogContext {
	pub fn as_str(self) -> &'static str {
		match self {
			LogContext::Page => "page",
			LogContext::Background => "background",
			LogContext::Content => "content",
			LogContext::Sidebar => "sidebar",
			LogContext::Popup => "popup",
			LogContext::Options => "options",
			LogContext::Devtools => "devtools",
		}
	}
}

impl fmt::Display for LogContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for LogContext {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"page" => Ok(LogContext::Page),
			"background" => Ok(LogContext::Background),
			"content" => Ok(LogContext::Content),
			"sidebar" => Ok(LogContext::Sidebar),
			"popup" => Ok(LogContext::Popup),
			"options" => Ok(LogContext::Options),
			"devtools" => Ok(LogContext::Devtools),
			_ => Err(format!("unknown log context: {s}")),
		}
	}
}

/// One console/runtime/error event from any attached target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
	pub id: u64,
	/// Milliseconds since the unix epoch.
	pub timestamp: i64,
	pub level: LogLevel,
	pub context: LogContext,
	pub message_parts: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tab_id: Option<String>,
}

impl LogEvent {
	/// Message parts joined by single spaces.
	pub fn message(&self) -> String {
		self.message_parts.join(" ")
	}
}
