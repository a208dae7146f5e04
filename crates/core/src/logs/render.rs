//! Output formatting for log events.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, TimeZone};
use colored::Colorize;
use extdev_protocol::{LogEvent, LogLevel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	/// One human-readable line per event.
	#[default]
	Pretty,
	/// One pretty-printed JSON object per event.
	Json,
	/// One compact JSON object per line.
	Ndjson,
}

impl fmt::Display for LogFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			LogFormat::Pretty => "pretty",
			LogFormat::Json => "json",
			LogFormat::Ndjson => "ndjson",
		})
	}
}

impl FromStr for LogFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"pretty" | "text" => Ok(LogFormat::Pretty),
			"json" => Ok(LogFormat::Json),
			"ndjson" | "jsonl" => Ok(LogFormat::Ndjson),
			_ => Err(format!("unknown log format: {s}")),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
	pub format: LogFormat,
	pub timestamps: bool,
	pub color: bool,
}

impl Default for RenderOptions {
	fn default() -> Self {
		Self {
			format: LogFormat::Pretty,
			timestamps: true,
			color: true,
		}
	}
}

/// Formats one event without a trailing newline.
pub fn render(event: &LogEvent, options: &RenderOptions) -> String {
	match options.format {
		LogFormat::Json => serde_json::to_string_pretty(event).unwrap_or_default(),
		LogFormat::Ndjson => serde_json::to_string(event).unwrap_or_default(),
		LogFormat::Pretty => render_pretty(event, options),
	}
}

fn render_pretty(event: &LogEvent, options: &RenderOptions) -> String {
	let mut line = String::new();
	if options.timestamps {
		line.push_str(&format_timestamp(event.timestamp));
		line.push(' ');
	}

	let level = format!("{:<5}", event.level.as_str().to_ascii_uppercase());
	if options.color {
		let level = match event.level {
			LogLevel::Error => level.red().bold().to_string(),
			LogLevel::Warn => level.yellow().to_string(),
			_ => level,
		};
		line.push_str(&level);
		line.push(' ');
		line.push_str(&format!("[{}]", event.context).dimmed().to_string());
	} else {
		line.push_str(&level);
		line.push_str(&format!(" [{}]", event.context));
	}

	line.push(' ');
	line.push_str(&event.message());
	if let Some(url) = &event.url {
		let origin = format!("({url})");
		line.push(' ');
		if options.color {
			line.push_str(&origin.dimmed().to_string());
		} else {
			line.push_str(&origin);
		}
	}
	line
}

fn format_timestamp(millis: i64) -> String {
	match Local.timestamp_millis_opt(millis).single() {
		Some(at) => at.format("%H:%M:%S%.3f").to_string(),
		None => "--:--:--.---".to_string(),
	}
}
