//! Event filtering. Pure and side-effect free.

use extdev_protocol::{LogContext, LogEvent, LogLevel};
use serde::{Deserialize, Serialize};

/// Which events reach the output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogFilter {
	/// Events below this level are dropped.
	pub min_level: LogLevel,
	/// Context allowlist; `None` accepts every context.
	pub contexts: Option<Vec<LogContext>>,
	/// Substring the source url must contain.
	pub url_pattern: Option<String>,
	/// Substring the tab id must contain.
	pub tab: Option<String>,
}

impl LogFilter {
	/// Passes everything at `level` and above.
	pub fn at_least(level: LogLevel) -> Self {
		Self {
			min_level: level,
			..Self::default()
		}
	}

	/// Level, then context, then url, then tab. The first failing check drops the event.
	pub fn accepts(&self, event: &LogEvent) -> bool {
		if event.level.rank() < self.min_level.rank() {
			return false;
		}
		if let Some(contexts) = &self.contexts {
			if !contexts.is_empty() && !contexts.contains(&event.context) {
				return false;
			}
		}
		if let Some(pattern) = &self.url_pattern {
			if !event.url.as_deref().is_some_and(|url| url.contains(pattern.as_str())) {
				return false;
			}
		}
		if let Some(tab) = &self.tab {
			if !event.tab_id.as_deref().is_some_and(|id| id.contains(tab.as_str())) {
				return false;
			}
		}
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn event(level: LogLevel, context: LogContext, url: Option<&str>, tab: Option<&str>) -> LogEvent {
		LogEvent {
			id: 1,
			timestamp: 0,
			level,
			context,
			message_parts: vec!["hello".into()],
			url: url.map(str::to_string),
			tab_id: tab.map(str::to_string),
		}
	}

	#[test]
	fn level_threshold_is_monotonic() {
		for threshold in LogLevel::ALL {
			let filter = LogFilter::at_least(threshold);
			for level in LogLevel::ALL {
				let accepted = filter.accepts(&event(level, LogContext::Page, None, None));
				assert_eq!(accepted, level >= threshold, "{level} against threshold {threshold}");
			}
		}
	}

	#[test]
	fn context_allowlist() {
		let filter = LogFilter {
			contexts: Some(vec![LogContext::Background]),
			..LogFilter::default()
		};
		assert!(filter.accepts(&event(LogLevel::Log, LogContext::Background, None, None)));
		assert!(!filter.accepts(&event(LogLevel::Log, LogContext::Page, None, None)));
	}

	#[test]
	fn url_and_tab_are_substring_matches() {
		let filter = LogFilter {
			url_pattern: Some("example.com".into()),
			tab: Some("ABC".into()),
			..LogFilter::default()
		};
		assert!(filter.accepts(&event(LogLevel::Info, LogContext::Page, Some("https://example.com/a"), Some("xxABCxx"))));
		assert!(!filter.accepts(&event(LogLevel::Info, LogContext::Page, Some("https://other.org/"), Some("ABC"))));
		assert!(!filter.accepts(&event(LogLevel::Info, LogContext::Page, Some("https://example.com/"), None)));
		assert!(!filter.accepts(&event(LogLevel::Info, LogContext::Page, None, Some("ABC"))));
	}

	#[test]
	fn level_is_checked_before_anything_else() {
		let filter = LogFilter {
			min_level: LogLevel::Warn,
			url_pattern: Some("example".into()),
			..LogFilter::default()
		};
		assert!(!filter.accepts(&event(LogLevel::Info, LogContext::Page, Some("https://example.com/"), None)));
		assert!(filter.accepts(&event(LogLevel::Error, LogContext::Page, Some("https://example.com/"), None)));
	}
}
