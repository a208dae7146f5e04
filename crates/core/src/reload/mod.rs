//! Reload Decision Engine.
//!
//! Turns build-watcher notifications into at most one reload per build.
//! State moves `Idle → AwaitingBuild → Deciding → Reloading → Idle`; it
//! returns to `Idle` whatever the outcome so later builds are still handled.

use std::time::Duration;

use async_trait::async_trait;
use extdev_protocol::{BuildEvent, RebuildNotification, ReloadIntent, ReloadReason};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;

/// What the engine drives: the first build launches, later builds reload.
#[async_trait]
pub trait ReloadActions: Send {
	/// Launches the browser and installs the extension.
	async fn launch(&mut self) -> Result<()>;

	/// Reloads the installed extension. Returns `false` on failure.
	async fn reload(&mut self, intent: &ReloadIntent) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
	Idle,
	/// Files changed; waiting for the build to finish.
	AwaitingBuild,
	Deciding,
	Reloading,
}

/// Outcome of one handled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
	/// A change was noted; nothing to do until the build finishes.
	Pending(ReloadReason),
	/// The build failed; nothing was reloaded.
	Skipped { manifest_errors: usize },
	Launched,
	LaunchFailed,
	Reloaded(ReloadReason),
	ReloadFailed(ReloadReason),
	/// Nothing was emitted and nothing critical changed.
	Idle,
}

/// File classification and timing.
#[derive(Debug, Clone)]
pub struct ReloadPolicy {
	/// Quiet period after a build during which further builds are coalesced.
	pub debounce: Duration,
	/// Output names of background scripts / service worker entries.
	pub background_entries: Vec<String>,
}

impl Default for ReloadPolicy {
	fn default() -> Self {
		Self {
			debounce: Duration::from_millis(300),
			background_entries: Vec::new(),
		}
	}
}

fn file_name(path: &str) -> &str {
	path.rsplit(['/', '\\']).next().unwrap_or(path)
}

impl ReloadPolicy {
	pub fn with_background_entries(mut self, entries: impl IntoIterator<Item = String>) -> Self {
		self.background_entries = entries.into_iter().collect();
		self
	}

	/// Reload reason implied by one changed or emitted file.
	pub fn classify(&self, path: &str) -> ReloadReason {
		let normalized = path.replace('\\', "/");
		let name = file_name(&normalized);
		if name.eq_ignore_ascii_case("manifest.json") {
			return ReloadReason::Manifest;
		}
		if normalized.contains("_locales/") || name.eq_ignore_ascii_case("messages.json") {
			return ReloadReason::Locales;
		}
		let is_background = self.background_entries.iter().any(|entry| {
			let entry = entry.replace('\\', "/");
			normalized == entry || normalized.ends_with(&format!("/{entry}")) || name == file_name(&entry)
		});
		if is_background || name.starts_with("service_worker") || name.starts_with("background.") {
			return ReloadReason::ServiceWorker;
		}
		ReloadReason::None
	}

	/// Most specific reason among `files`.
	pub fn classify_all<'a>(&self, files: impl IntoIterator<Item = &'a String>) -> ReloadReason {
		files.into_iter().map(|f| self.classify(f)).max().unwrap_or_default()
	}
}

/// Number of build errors that look like a missing manifest-referenced file.
pub fn count_manifest_errors(errors: &[String]) -> usize {
	errors
		.iter()
		.filter(|e| {
			let lower = e.to_ascii_lowercase();
			lower.contains("manifest")
				&& (lower.contains("not found") || lower.contains("no such file") || lower.contains("enoent") || lower.contains("cannot find") || lower.contains("could not find"))
		})
		.count()
}

pub struct ReloadEngine<A> {
	actions: A,
	policy: ReloadPolicy,
	state: EngineState,
	pending: ReloadReason,
	launched: bool,
}

impl<A: ReloadActions> ReloadEngine<A> {
	pub fn new(actions: A, policy: ReloadPolicy) -> Self {
		Self {
			actions,
			policy,
			state: EngineState::Idle,
			pending: ReloadReason::None,
			launched: false,
		}
	}

	/// Skips the initial launch, for a browser that is already running.
	pub fn already_launched(mut self) -> Self {
		self.launched = true;
		self
	}

	pub fn state(&self) -> EngineState {
		self.state
	}

	/// Reason remembered from changes seen since the last reload.
	pub fn pending_reason(&self) -> ReloadReason {
		self.pending
	}

	pub fn actions(&self) -> &A {
		&self.actions
	}

	pub fn into_actions(self) -> A {
		self.actions
	}

	fn note_changes<'a>(&mut self, files: impl IntoIterator<Item = &'a String>) {
		let reason = self.policy.classify_all(files);
		if reason > self.pending {
			self.pending = reason;
		}
	}

	/// Handles one build-watcher event.
	pub async fn handle(&mut self, event: BuildEvent) -> Decision {
		match event {
			BuildEvent::Changed { files } => {
				self.note_changes(&files);
				self.state = EngineState::AwaitingBuild;
				debug!(target = "extdev.reload", changed = files.len(), pending = %self.pending, "awaiting build");
				Decision::Pending(self.pending)
			}
			BuildEvent::Built(notification) => {
				let decision = self.on_built(notification).await;
				self.state = EngineState::Idle;
				decision
			}
		}
	}

	async fn on_built(&mut self, notification: RebuildNotification) -> Decision {
		self.state = EngineState::Deciding;
		self.note_changes(&notification.modified_files);

		if notification.has_errors {
			let manifest_errors = count_manifest_errors(&notification.errors);
			if manifest_errors > 0 {
				warn!(target = "extdev.reload", manifest_errors, "build failed with missing manifest files, not reloading");
			} else {
				warn!(target = "extdev.reload", errors = notification.errors.len(), "build failed, not reloading");
			}
			return Decision::Skipped { manifest_errors };
		}

		if !self.launched {
			self.state = EngineState::Reloading;
			return match self.actions.launch().await {
				Ok(()) => {
					self.launched = true;
					self.pending = ReloadReason::None;
					info!(target = "extdev.reload", "browser launched with extension");
					Decision::Launched
				}
				Err(e) => {
					warn!(target = "extdev.reload", error = %e, "initial launch failed");
					Decision::LaunchFailed
				}
			};
		}

		let reason = match std::mem::take(&mut self.pending) {
			ReloadReason::None => self.policy.classify_all(&notification.emitted_assets),
			pending => pending,
		};
		if reason == ReloadReason::None && notification.emitted_assets.is_empty() {
			debug!(target = "extdev.reload", "nothing emitted, no reload");
			return Decision::Idle;
		}

		self.state = EngineState::Reloading;
		let intent = ReloadIntent {
			reason,
			changed_assets: notification.emitted_assets,
		};
		if self.actions.reload(&intent).await {
			info!(target = "extdev.reload", reason = %reason, assets = intent.changed_assets.len(), "extension reloaded");
			Decision::Reloaded(reason)
		} else {
			warn!(target = "extdev.reload", reason = %reason, "extension reload failed");
			Decision::ReloadFailed(reason)
		}
	}

	/// Consumes events until the sender goes away.
	///
	/// Builds finishing within the debounce window of each other are handled
	/// as one.
	pub async fn run(&mut self, mut events: mpsc::Receiver<BuildEvent>) {
		while let Some(event) = events.recv().await {
			let BuildEvent::Built(mut merged) = event else {
				self.handle(event).await;
				continue;
			};

			let mut closed = false;
			loop {
				match tokio::time::timeout(self.policy.debounce, events.recv()).await {
					Ok(Some(BuildEvent::Changed { files })) => {
						self.note_changes(&files);
					}
					Ok(Some(BuildEvent::Built(next))) => merged = coalesce(merged, next),
					Ok(None) => {
						closed = true;
						break;
					}
					Err(_) => break,
				}
			}

			self.handle(BuildEvent::Built(merged)).await;
			if closed {
				break;
			}
		}
		debug!(target = "extdev.reload", "build event stream ended");
	}
}

/// Merges two build rounds; the later one's error state wins.
fn coalesce(earlier: RebuildNotification, later: RebuildNotification) -> RebuildNotification {
	let mut emitted = earlier.emitted_assets;
	for asset in later.emitted_assets {
		if !emitted.contains(&asset) {
			emitted.push(asset);
		}
	}
	let mut modified = earlier.modified_files;
	for file in later.modified_files {
		if !modified.contains(&file) {
			modified.push(file);
		}
	}
	RebuildNotification {
		has_errors: later.has_errors,
		emitted_assets: emitted,
		modified_files: modified,
		errors: later.errors,
	}
}

#[cfg(test)]
mod tests;
