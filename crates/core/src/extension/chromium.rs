//! Chromium extension control over CDP.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use extdev_protocol::{Session, Target};
use extdev_runtime::CdpConnection;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::identity::{Candidate, ExtensionIdentity, IDENTITY_SCRIPT, derive_extension_id};
use super::manifest::{ManifestInfo, ProfileHints};
use super::{Capability, ExtensionController};
use crate::error::{Error, Result};
use crate::retry::Backoff;
use crate::target::{AttachedSession, CdpTargets};

const SELF_RELOAD_SCRIPT: &str = "chrome.runtime.reload()";

pub struct ChromiumExtensions {
	targets: CdpTargets,
	native_reload: Mutex<Capability>,
	loaded: Mutex<HashMap<String, PathBuf>>,
	identity: tokio::sync::Mutex<Option<ExtensionIdentity>>,
	reload_lock: tokio::sync::Mutex<()>,
	reload_backoff: Backoff,
	identity_backoff: Backoff,
}

impl ChromiumExtensions {
	pub fn new(connection: Arc<CdpConnection>) -> Self {
		Self {
			targets: CdpTargets::new(connection),
			native_reload: Mutex::new(Capability::Unknown),
			loaded: Mutex::new(HashMap::new()),
			identity: tokio::sync::Mutex::new(None),
			reload_lock: tokio::sync::Mutex::new(()),
			reload_backoff: Backoff::new(5, Duration::from_millis(100), Duration::from_secs(1)),
			identity_backoff: Backoff::new(8, Duration::from_millis(250), Duration::from_secs(2)),
		}
	}

	pub fn with_backoff(mut self, reload: Backoff, identity: Backoff) -> Self {
		self.reload_backoff = reload;
		self.identity_backoff = identity;
		self
	}

	pub fn targets(&self) -> &CdpTargets {
		&self.targets
	}

	/// What is known about native reload support.
	pub fn native_reload_capability(&self) -> Capability {
		*self.native_reload.lock()
	}

	/// Remembers where an extension was loaded from (e.g. via `--load-extension`).
	pub fn record_path(&self, extension_id: &str, path: &Path) {
		self.loaded.lock().insert(extension_id.to_string(), path.to_path_buf());
	}

	/// Loads an unpacked extension through the `Extensions` domain.
	pub async fn load_unpacked(&self, path: &Path) -> Result<String> {
		let reply = self
			.targets
			.connection()
			.send("Extensions.loadUnpacked", json!({"path": path.to_string_lossy()}), None)
			.await?;
		let id = reply
			.get("id")
			.and_then(Value::as_str)
			.map(str::to_string)
			.ok_or_else(|| Error::ExtensionNotFound(format!("loadUnpacked returned no id for {}", path.display())))?;

		self.record_path(&id, path);
		let mut capability = self.native_reload.lock();
		if *capability == Capability::Unknown {
			*capability = Capability::Supported;
		}
		info!(target = "extdev", id, path = %path.display(), "extension loaded");
		Ok(id)
	}

	/// Runtime identity of every extension with a live context, one per extension id.
	pub async fn candidates(&self) -> Result<Vec<Candidate>> {
		let mut seen = Vec::new();
		let mut candidates = Vec::new();
		for target in self.targets.extension_targets().await? {
			let Some(id) = target.extension_id().map(str::to_string) else {
				continue;
			};
			if seen.contains(&id) {
				continue;
			}
			seen.push(id.clone());

			match self.evaluate_on(&target, IDENTITY_SCRIPT).await {
				Ok(value) if !value.is_null() => match serde_json::from_value::<Candidate>(value) {
					Ok(mut candidate) => {
						candidate.path = self.loaded.lock().get(&candidate.id).cloned();
						candidates.push(candidate);
					}
					Err(e) => debug!(target = "extdev.identity", id, error = %e, "unexpected identity shape"),
				},
				Ok(_) => debug!(target = "extdev.identity", id, "context has no runtime API"),
				Err(e) => debug!(target = "extdev.identity", id, error = %e, "identity query failed"),
			}
		}
		Ok(candidates)
	}

	/// Derives the id of the extension built into `output_dir`, memoized.
	///
	/// `Ok(None)` means "not known yet": no matching context appeared within
	/// the retry budget.
	pub async fn derive_identity(&self, output_dir: &Path, hints: &ProfileHints) -> Result<Option<ExtensionIdentity>> {
		if let Some(identity) = self.identity.lock().await.clone() {
			return Ok(Some(identity));
		}
		self.rederive_identity(output_dir, hints).await
	}

	/// Recomputes the identity, replacing any memoized value.
	pub async fn rederive_identity(&self, output_dir: &Path, hints: &ProfileHints) -> Result<Option<ExtensionIdentity>> {
		let mut memo = self.identity.lock().await;
		let expected = ManifestInfo::read(output_dir)?;

		let derived = self
			.identity_backoff
			.retry("identity", |attempt| {
				let expected = &expected;
				async move {
					let candidates = match self.candidates().await {
						Ok(candidates) => candidates,
						Err(e) => {
							debug!(target = "extdev.identity", attempt, error = %e, "target enumeration failed");
							return None;
						}
					};
					debug!(target = "extdev.identity", attempt, candidates = candidates.len(), "evaluating candidates");
					derive_extension_id(&candidates, expected, output_dir, hints)
				}
			})
			.await;

		if let Some(identity) = &derived {
			self.record_path(&identity.id, output_dir);
			info!(target = "extdev.identity", id = %identity.id, source = ?identity.source, "extension identity derived");
		}
		*memo = derived.clone();
		Ok(derived)
	}

	/// Memoized identity, if one was derived.
	pub async fn identity(&self) -> Option<ExtensionIdentity> {
		self.identity.lock().await.clone()
	}

	async fn evaluate_on(&self, target: &Target, expression: &str) -> Result<Value> {
		let session_id = self.targets.attach(&target.id).await?;
		let session = AttachedSession::new(
			Arc::clone(self.targets.connection()),
			Session {
				session_id: session_id.clone(),
				target_id: target.id.clone(),
			},
		);
		let result = session.evaluate(expression).await;
		if let Err(e) = self.targets.detach(&session.session_id()).await {
			debug!(target = "extdev", error = %e, "detach after evaluation failed");
		}
		result
	}

	/// Re-issues `loadUnpacked` for the recorded path.
	async fn reload_natively(&self, extension_id: &str) -> bool {
		if self.native_reload_capability() == Capability::Unsupported {
			return false;
		}
		let Some(path) = self.loaded.lock().get(extension_id).cloned() else {
			return false;
		};

		match self
			.targets
			.connection()
			.send("Extensions.loadUnpacked", json!({"path": path.to_string_lossy()}), None)
			.await
		{
			Ok(_) => {
				*self.native_reload.lock() = Capability::Supported;
				true
			}
			Err(e) if e.is_method_not_found() => {
				debug!(target = "extdev.reload", error = %e, "native reload unsupported, using runtime fallback");
				*self.native_reload.lock() = Capability::Unsupported;
				false
			}
			Err(e) => {
				debug!(target = "extdev.reload", error = %e, "native reload failed");
				false
			}
		}
	}

	/// Asks the extension to reload itself from its best available context.
	async fn reload_via_runtime(&self, extension_id: &str) -> bool {
		self.reload_backoff
			.retry("reload", |attempt| async move {
				let targets: Vec<Target> = match self.targets.extension_targets().await {
					Ok(targets) => targets.into_iter().filter(|t| t.extension_id() == Some(extension_id)).collect(),
					Err(e) => {
						debug!(target = "extdev.reload", attempt, error = %e, "target enumeration failed");
						return None;
					}
				};
				if targets.is_empty() {
					debug!(target = "extdev.reload", attempt, extension_id, "no extension context available yet");
					return None;
				}

				for target in &targets {
					match self.evaluate_on(target, SELF_RELOAD_SCRIPT).await {
						Ok(_) => return Some(()),
						Err(e) if e.is_target_gone() => return Some(()),
						Err(e) => debug!(target = "extdev.reload", kind = %target.kind, error = %e, "self-reload failed"),
					}
				}
				None
			})
			.await
			.is_some()
	}
}

#[async_trait]
impl ExtensionController for ChromiumExtensions {
	async fn install(&self, dir: &Path) -> Result<String> {
		self.load_unpacked(dir).await
	}

	async fn force_reload(&self, extension_id: &str) -> bool {
		let _serialized = self.reload_lock.lock().await;
		if self.reload_natively(extension_id).await || self.reload_via_runtime(extension_id).await {
			info!(target = "extdev.reload", extension_id, "extension reloaded");
			true
		} else {
			warn!(target = "extdev.reload", extension_id, "extension reload failed");
			false
		}
	}
}
