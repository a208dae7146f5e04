//! Target/Session Directory.
//!
//! Enumerates execution contexts and manages sessions. Target lists are never
//! cached: every call asks the browser, since extension workers come and go.

pub mod firefox;
pub mod session;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use extdev_protocol::{Session, Target, TargetInfo, TargetKind};
use extdev_runtime::CdpConnection;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::debug;

pub use self::firefox::FirefoxTargets;
pub use self::session::AttachedSession;
use self::session::session_id_from;
use crate::error::{Error, Result};

/// Chromium target directory over one browser-level connection.
#[derive(Clone)]
pub struct CdpTargets {
	connection: Arc<CdpConnection>,
	/// Live page sessions by target id.
	pages: Arc<Mutex<HashMap<String, Weak<AttachedSession>>>>,
}

impl CdpTargets {
	pub fn new(connection: Arc<CdpConnection>) -> Self {
		Self {
			connection,
			pages: Arc::default(),
		}
	}

	pub fn connection(&self) -> &Arc<CdpConnection> {
		&self.connection
	}

	/// Lists every target the browser currently exposes.
	pub async fn list_targets(&self) -> Result<Vec<Target>> {
		let reply = self.connection.send("Target.getTargets", json!({}), None).await?;
		let infos: Vec<TargetInfo> = serde_json::from_value(reply.get("targetInfos").cloned().unwrap_or_else(|| json!([])))?;
		Ok(infos.into_iter().map(Target::from).collect())
	}

	/// Targets hosting extension code, best candidates first.
	pub async fn extension_targets(&self) -> Result<Vec<Target>> {
		let mut targets: Vec<Target> = self
			.list_targets()
			.await?
			.into_iter()
			.filter(|t| t.is_extension() && t.kind.extension_rank().is_some())
			.collect();
		targets.sort_by_key(|t| t.kind.extension_rank());
		Ok(targets)
	}

	/// Attaches a flattened session and returns its id.
	pub async fn attach(&self, target_id: &str) -> Result<String> {
		let reply = self
			.connection
			.send("Target.attachToTarget", json!({"targetId": target_id, "flatten": true}), None)
			.await?;
		session_id_from(&reply)
	}

	pub async fn detach(&self, session_id: &str) -> Result<()> {
		self.connection
			.send("Target.detachFromTarget", json!({"sessionId": session_id}), None)
			.await?;
		Ok(())
	}

	/// Opens a new tab and returns its target id.
	pub async fn create_target(&self, url: &str) -> Result<String> {
		let reply = self.connection.send("Target.createTarget", json!({"url": url}), None).await?;
		reply
			.get("targetId")
			.and_then(Value::as_str)
			.map(str::to_string)
			.ok_or_else(|| Error::Runtime(extdev_runtime::Error::InvalidResponse("createTarget reply without targetId".into())))
	}

	pub async fn activate_target(&self, target_id: &str) -> Result<()> {
		self.connection
			.send("Target.activateTarget", json!({"targetId": target_id}), None)
			.await?;
		Ok(())
	}

	pub async fn close_target(&self, target_id: &str) -> Result<()> {
		self.connection.send("Target.closeTarget", json!({"targetId": target_id}), None).await?;
		Ok(())
	}

	/// Navigates the session's target to `url`.
	pub async fn navigate(&self, session_id: &str, url: &str) -> Result<()> {
		let reply = self.connection.send("Page.navigate", json!({"url": url}), Some(session_id)).await?;
		if let Some(error) = reply.get("errorText").and_then(Value::as_str).filter(|e| !e.is_empty()) {
			return Err(Error::Discovery(format!("navigation to {url} failed: {error}")));
		}
		Ok(())
	}

	/// Finds or opens the page for `url` and returns a session on it with `Page` enabled.
	///
	/// An open page whose url equals `url` is reused, so calling this twice
	/// does not open a second tab. A session still held from an earlier call
	/// is handed out again instead of attaching another one.
	pub async fn ensure_target_and_session(&self, url: &str) -> Result<Arc<AttachedSession>> {
		let existing = self
			.list_targets()
			.await?
			.into_iter()
			.find(|t| t.kind == TargetKind::Page && same_url(&t.url, url));

		let target_id = match existing {
			Some(target) => {
				debug!(target = "extdev", target_id = %target.id, url, "reusing open page");
				target.id
			}
			None => {
				let target_id = self.create_target("about:blank").await?;
				let transient = self.attach(&target_id).await?;
				self.navigate(&transient, url).await?;
				if let Err(e) = self.detach(&transient).await {
					debug!(target = "extdev", error = %e, "detaching transient session failed");
				}
				debug!(target = "extdev", %target_id, url, "opened page");
				target_id
			}
		};

		let held = self.pages.lock().get(&target_id).and_then(Weak::upgrade);
		let session = match held {
			Some(session) => session,
			None => {
				let session_id = self.attach(&target_id).await?;
				let session = Arc::new(AttachedSession::new(
					Arc::clone(&self.connection),
					Session {
						session_id,
						target_id: target_id.clone(),
					},
				));
				let mut pages = self.pages.lock();
				pages.retain(|_, page| page.strong_count() > 0);
				pages.insert(target_id.clone(), Arc::downgrade(&session));
				session
			}
		};
		session.send("Page.enable", json!({})).await?;
		if let Err(e) = self.activate_target(&target_id).await {
			debug!(target = "extdev", error = %e, "could not bring page to front");
		}
		Ok(session)
	}
}

/// Url equality that ignores a trailing slash.
pub fn same_url(a: &str, b: &str) -> bool {
	a.trim_end_matches('/') == b.trim_end_matches('/')
}
