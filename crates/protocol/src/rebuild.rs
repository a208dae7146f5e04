//! Notifications from the build collaborator and the reload intent derived from them.

use serde::{Deserialize, Serialize};

/// Result of one build round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildNotification {
	#[serde(default)]
	pub has_errors: bool,
	#[serde(default)]
	pub emitted_assets: Vec<String>,
	#[serde(default)]
	pub modified_files: Vec<String>,
	/// Error messages reported by the build, if any.
	#[serde(default)]
	pub errors: Vec<String>,
}

/// Event stream produced by the build watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BuildEvent {
	/// Source files changed; a build is about to start.
	Changed {
		#[serde(default)]
		files: Vec<String>,
	},
	/// A build finished.
	Built(RebuildNotification),
}

/// Why a reload is needed. Variants are ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadReason {
	#[default]
	None,
	ServiceWorker,
	Locales,
	Manifest,
}

impl ReloadReason {
	pub fn as_str(self) -> &'static str {
		match self {
			ReloadReason::None => "none",
			ReloadReason::ServiceWorker => "service-worker",
			ReloadReason::Locales => "locales",
			ReloadReason::Manifest => "manifest",
		}
	}

	/// Hard reloads restart the whole extension rather than refreshing pages.
	pub fn is_critical(self) -> bool {
		self != ReloadReason::None
	}
}

impl std::fmt::Display for ReloadReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What the reload engine hands to the extension controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadIntent {
	pub reason: ReloadReason,
	pub changed_assets: Vec<String>,
}
