//! Firefox target directory.
//!
//! Tabs and add-ons are described by descriptor actors; `getTarget` on a
//! descriptor yields the target form carrying the target actor and its
//! console actor.

use std::sync::Arc;

use extdev_protocol::rdp::ROOT_ACTOR;
use extdev_protocol::{Target, TargetKind};
use extdev_runtime::RdpConnection;
use serde_json::{Value, json};
use tracing::debug;

use super::same_url;
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct FirefoxTargets {
	connection: Arc<RdpConnection>,
}

impl FirefoxTargets {
	pub fn new(connection: Arc<RdpConnection>) -> Self {
		Self { connection }
	}

	pub fn connection(&self) -> &Arc<RdpConnection> {
		&self.connection
	}

	/// Raw tab descriptors from the root actor.
	pub async fn list_tabs(&self) -> Result<Vec<Value>> {
		let reply = self.connection.request(ROOT_ACTOR, "listTabs", json!({})).await?;
		Ok(array_field(&reply, "tabs"))
	}

	/// Raw add-on descriptors from the root actor.
	pub async fn list_addons(&self) -> Result<Vec<Value>> {
		let reply = self.connection.request(ROOT_ACTOR, "listAddons", json!({})).await?;
		Ok(array_field(&reply, "addons"))
	}

	/// Resolves a descriptor to its target form.
	pub async fn resolve(&self, descriptor: &Value) -> Result<Target> {
		let actor = descriptor
			.get("actor")
			.and_then(Value::as_str)
			.ok_or_else(|| Error::Runtime(extdev_runtime::Error::InvalidResponse("descriptor without actor".into())))?;
		let reply = self.connection.request(actor, "getTarget", json!({})).await?;
		let form = reply
			.get("frame")
			.or_else(|| reply.get("form"))
			.ok_or_else(|| Error::Runtime(extdev_runtime::Error::InvalidResponse(format!("getTarget on {actor} returned no form"))))?;
		Ok(target_from_form(form, descriptor))
	}

	/// Every tab, resolved. Tabs that fail to resolve are skipped.
	pub async fn list_targets(&self) -> Result<Vec<Target>> {
		let mut targets = Vec::new();
		for tab in self.list_tabs().await? {
			match self.resolve(&tab).await {
				Ok(target) => targets.push(target),
				Err(e) => debug!(target = "extdev", error = %e, "skipping unresolvable tab"),
			}
		}
		Ok(targets)
	}

	/// Every add-on that exposes a target, resolved.
	pub async fn list_addon_targets(&self) -> Result<Vec<Target>> {
		let mut targets = Vec::new();
		for addon in self.list_addons().await? {
			match self.resolve(&addon).await {
				Ok(target) => targets.push(target),
				Err(e) => debug!(target = "extdev", error = %e, "skipping add-on without target"),
			}
		}
		Ok(targets)
	}

	/// Finds the tab showing `url`, or navigates the selected tab there.
	pub async fn ensure_tab(&self, url: &str) -> Result<Target> {
		let tabs = self.list_tabs().await?;
		let mut resolved = Vec::with_capacity(tabs.len());
		for tab in &tabs {
			if let Ok(target) = self.resolve(tab).await {
				if same_url(&target.url, url) {
					debug!(target = "extdev", actor = %target.id, url, "reusing open tab");
					return Ok(target);
				}
				resolved.push((tab.get("selected").and_then(Value::as_bool).unwrap_or(false), target));
			}
		}

		let position = resolved.iter().position(|(selected, _)| *selected).unwrap_or(0);
		if resolved.is_empty() {
			return Err(Error::Discovery("browser has no tabs to navigate".into()));
		}
		let (_, mut target) = resolved.swap_remove(position);

		self.connection.request(&target.id, "navigateTo", json!({"url": url})).await?;
		debug!(target = "extdev", actor = %target.id, url, "navigated tab");
		target.url = url.to_string();
		Ok(target)
	}
}

fn array_field(reply: &Value, key: &str) -> Vec<Value> {
	reply.get(key).and_then(Value::as_array).cloned().unwrap_or_default()
}

fn target_from_form(form: &Value, descriptor: &Value) -> Target {
	let text = |value: &Value, key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
	Target {
		id: text(form, "actor").unwrap_or_default(),
		kind: TargetKind::TabActor,
		url: text(form, "url").or_else(|| text(descriptor, "url")).unwrap_or_default(),
		title: text(form, "title").or_else(|| text(descriptor, "title")).unwrap_or_default(),
		console_actor: text(form, "consoleActor"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn form_supplies_console_actor() {
		let form = json!({"actor": "server1.conn0.child2/windowGlobalTarget3", "consoleActor": "server1.conn0.child2/consoleActor4", "url": "https://example.com/"});
		let descriptor = json!({"actor": "server1.conn0.tabDescriptor1", "title": "Example"});
		let target = target_from_form(&form, &descriptor);

		assert_eq!(target.id, "server1.conn0.child2/windowGlobalTarget3");
		assert_eq!(target.console_actor.as_deref(), Some("server1.conn0.child2/consoleActor4"));
		assert_eq!(target.title, "Example");
		assert_eq!(target.kind, TargetKind::TabActor);
	}
}
