//! Firefox add-on control over RDP.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use extdev_protocol::rdp::ROOT_ACTOR;
use extdev_runtime::RdpConnection;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::ExtensionController;
use crate::error::{Error, Result};

/// An add-on installed by this controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledAddon {
	pub id: String,
	pub path: PathBuf,
}

pub struct FirefoxAddons {
	connection: Arc<RdpConnection>,
	addons_actor: tokio::sync::Mutex<Option<String>>,
	installed: Mutex<Vec<InstalledAddon>>,
	reload_lock: tokio::sync::Mutex<()>,
}

impl FirefoxAddons {
	pub fn new(connection: Arc<RdpConnection>) -> Self {
		Self {
			connection,
			addons_actor: tokio::sync::Mutex::new(None),
			installed: Mutex::new(Vec::new()),
			reload_lock: tokio::sync::Mutex::new(()),
		}
	}

	/// Add-ons installed so far, in install order.
	pub fn installed(&self) -> Vec<InstalledAddon> {
		self.installed.lock().clone()
	}

	/// The root's add-ons actor, looked up once.
	async fn addons_actor(&self) -> Result<String> {
		let mut cached = self.addons_actor.lock().await;
		if let Some(actor) = cached.as_ref() {
			return Ok(actor.clone());
		}
		let root = self.connection.request(ROOT_ACTOR, "getRoot", json!({})).await?;
		let actor = root
			.get("addonsActor")
			.and_then(Value::as_str)
			.map(str::to_string)
			.ok_or_else(|| Error::Discovery("root actor exposes no addons actor".into()))?;
		debug!(target = "extdev", actor, "found addons actor");
		*cached = Some(actor.clone());
		Ok(actor)
	}

	/// Installs one unpacked add-on temporarily.
	pub async fn install_temporary(&self, path: &Path) -> Result<String> {
		let actor = self.addons_actor().await?;
		let reply = self
			.connection
			.request(&actor, "installTemporaryAddon", json!({"addonPath": path.to_string_lossy(), "openDevTools": false}))
			.await?;
		let id = reply
			.pointer("/addon/id")
			.and_then(Value::as_str)
			.map(str::to_string)
			.ok_or_else(|| Error::ExtensionNotFound(format!("installTemporaryAddon returned no id for {}", path.display())))?;

		let mut installed = self.installed.lock();
		installed.retain(|addon| addon.id != id);
		installed.push(InstalledAddon {
			id: id.clone(),
			path: path.to_path_buf(),
		});
		info!(target = "extdev", id, path = %path.display(), "add-on installed");
		Ok(id)
	}

	/// Installs several add-ons, the user's extension before any companion.
	pub async fn install_all(&self, paths: &[PathBuf]) -> Result<Vec<String>> {
		let mut ordered: Vec<&PathBuf> = paths.iter().collect();
		ordered.sort_by_key(|path| is_companion_path(path));

		let mut ids = Vec::with_capacity(ordered.len());
		for path in ordered {
			ids.push(self.install_temporary(path).await?);
		}
		Ok(ids)
	}

	async fn reload_through_actor(&self, extension_id: &str) -> Result<bool> {
		let reply = self.connection.request(ROOT_ACTOR, "listAddons", json!({})).await?;
		let actor = reply
			.get("addons")
			.and_then(Value::as_array)
			.and_then(|addons| addons.iter().find(|a| a.get("id").and_then(Value::as_str) == Some(extension_id)))
			.and_then(|addon| addon.get("actor").and_then(Value::as_str))
			.map(str::to_string);

		let Some(actor) = actor else {
			return Ok(false);
		};
		self.connection.request(&actor, "reload", json!({})).await?;
		Ok(true)
	}
}

/// Heuristic for a helper/manager extension shipped alongside the user's.
pub fn is_companion_path(path: &Path) -> bool {
	path.file_name().is_some_and(|name| {
		let name = name.to_string_lossy().to_ascii_lowercase();
		name.contains("manager") || name.contains("companion")
	})
}

#[async_trait]
impl ExtensionController for FirefoxAddons {
	async fn install(&self, dir: &Path) -> Result<String> {
		self.install_temporary(dir).await
	}

	async fn force_reload(&self, extension_id: &str) -> bool {
		let _serialized = self.reload_lock.lock().await;

		match self.reload_through_actor(extension_id).await {
			Ok(true) => {
				info!(target = "extdev.reload", extension_id, "add-on reloaded");
				return true;
			}
			Ok(false) => debug!(target = "extdev.reload", extension_id, "add-on not listed, reinstalling"),
			Err(e) => debug!(target = "extdev.reload", extension_id, error = %e, "add-on reload failed, reinstalling"),
		}

		let path = self.installed.lock().iter().find(|a| a.id == extension_id).map(|a| a.path.clone());
		let Some(path) = path else {
			warn!(target = "extdev.reload", extension_id, "no recorded path to reinstall from");
			return false;
		};
		match self.install_temporary(&path).await {
			Ok(_) => true,
			Err(e) => {
				warn!(target = "extdev.reload", extension_id, error = %e, "add-on reinstall failed");
				false
			}
		}
	}
}
