//! Live log subscriptions over a CDP or RDP connection.
//!
//! Each subscription owns one background task reading the connection's
//! event broadcast. Listeners are enabled on every known target before the
//! subscription is returned; targets that appear later are enabled as they
//! are announced.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use extdev_protocol::{CdpEvent, LogEvent, RdpPacket, Target, TargetInfo, TargetKind};
use extdev_runtime::CdpConnection;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::filter::LogFilter;
use super::normalize::{self, SourceInfo};
use crate::error::Result;
use crate::target::{AttachedSession, CdpTargets, FirefoxTargets};

const CHANNEL_CAPACITY: usize = 1024;

/// Target kinds whose console output is streamed.
fn is_loggable(kind: TargetKind) -> bool {
	matches!(kind, TargetKind::Page | TargetKind::ServiceWorker | TargetKind::BackgroundPage)
}

fn source_for(target: &Target) -> SourceInfo {
	let tab_id = (target.kind == TargetKind::Page).then(|| target.id.clone());
	SourceInfo::new(target.kind, target.url.clone(), tab_id)
}

/// Filtered log events from one connection. Dropping it stops the reader task.
pub struct LogSubscription {
	events: mpsc::Receiver<LogEvent>,
	task: JoinHandle<()>,
}

impl LogSubscription {
	fn spawn<F>(run: impl FnOnce(mpsc::Sender<LogEvent>) -> F) -> Self
	where
		F: std::future::Future<Output = ()> + Send + 'static,
	{
		let (tx, events) = mpsc::channel(CHANNEL_CAPACITY);
		let task = tokio::spawn(run(tx));
		Self { events, task }
	}

	/// Next accepted event; `None` once the connection is gone.
	pub async fn next(&mut self) -> Option<LogEvent> {
		self.events.recv().await
	}
}

impl Drop for LogSubscription {
	fn drop(&mut self) {
		self.task.abort();
	}
}

struct CdpLogState {
	targets: CdpTargets,
	filter: LogFilter,
	/// Session id → source of its events.
	sources: HashMap<String, SourceInfo>,
	/// Targets already being listened to.
	watched: HashSet<String>,
	/// Source of the shared session, kept across its re-attaches.
	shared: Option<SourceInfo>,
}

impl CdpLogState {
	fn connection(&self) -> &Arc<CdpConnection> {
		self.targets.connection()
	}

	async fn enable(&self, session_id: &str) {
		for domain in ["Runtime.enable", "Log.enable"] {
			if let Err(e) = self.connection().send(domain, json!({}), Some(session_id)).await {
				debug!(target = "extdev", session_id, domain, error = %e, "could not enable log domain");
			}
		}
	}

	/// Starts streaming from a session this stream owns.
	async fn adopt(&mut self, session_id: String, source: SourceInfo) {
		self.enable(&session_id).await;
		self.sources.insert(session_id, source);
	}

	async fn watch(&mut self, target: &Target) {
		if !is_loggable(target.kind) || self.watched.contains(&target.id) {
			return;
		}
		match self.targets.attach(&target.id).await {
			Ok(session_id) => {
				self.watched.insert(target.id.clone());
				self.adopt(session_id, source_for(target)).await;
				debug!(target = "extdev", target_id = %target.id, kind = %target.kind, "listening for logs");
			}
			Err(e) => debug!(target = "extdev", target_id = %target.id, error = %e, "could not attach for logs"),
		}
	}

	fn target_info(event: &CdpEvent) -> Option<TargetInfo> {
		event
			.params
			.get("targetInfo")
			.cloned()
			.and_then(|info| serde_json::from_value(info).ok())
	}

	async fn handle(&mut self, event: CdpEvent, tx: &mpsc::Sender<LogEvent>) -> bool {
		match event.method.as_str() {
			"Target.targetCreated" => {
				if let Some(info) = Self::target_info(&event) {
					self.watch(&Target::from(info)).await;
				}
			}
			"Target.targetInfoChanged" => {
				if let Some(info) = Self::target_info(&event) {
					for source in self.sources.values_mut().chain(self.shared.as_mut()) {
						if source.tab_id.as_deref() == Some(info.target_id.as_str()) {
							source.url = info.url.clone();
						}
					}
				}
			}
			"Target.detachedFromTarget" => {
				if let Some(session_id) = event.params.get("sessionId").and_then(Value::as_str) {
					self.sources.remove(session_id);
				}
			}
			"Target.targetDestroyed" => {
				if let Some(target_id) = event.params.get("targetId").and_then(Value::as_str) {
					self.watched.remove(target_id);
				}
			}
			_ => {
				let Some(session_id) = event.session_id.as_deref() else {
					return true;
				};
				let Some(source) = self.sources.get(session_id) else {
					return true;
				};
				if let Some(log) = normalize::from_cdp(&event, Some(source)) {
					if self.filter.accepts(&log) && tx.send(log).await.is_err() {
						return false;
					}
				}
			}
		}
		true
	}
}

/// Streams console, log and exception events from every page and extension
/// worker of a Chromium browser.
///
/// `shared` is the session already used for page inspection; it is enabled
/// instead of attaching a second session to the same target.
pub async fn subscribe_cdp(targets: &CdpTargets, shared: Option<Arc<AttachedSession>>, filter: LogFilter) -> Result<LogSubscription> {
	let connection = Arc::clone(targets.connection());
	let mut events = connection.subscribe();
	let mut state = CdpLogState {
		targets: targets.clone(),
		filter,
		sources: HashMap::new(),
		watched: HashSet::new(),
		shared: None,
	};
	let mut reattached = shared.as_ref().map(|session| session.reattached());

	connection.send("Target.setDiscoverTargets", json!({"discover": true}), None).await?;
	let known = targets.list_targets().await?;

	if let Some(session) = &shared {
		let target = known
			.iter()
			.find(|t| t.id == session.target_id())
			.cloned()
			.unwrap_or_else(|| Target {
				id: session.target_id().to_string(),
				kind: TargetKind::Page,
				url: String::new(),
				title: String::new(),
				console_actor: None,
			});
		let source = source_for(&target);
		state.watched.insert(target.id.clone());
		state.shared = Some(source.clone());
		state.adopt(session.session_id(), source).await;
	}
	for target in &known {
		state.watch(target).await;
	}
	debug!(target = "extdev", sessions = state.sources.len(), "log stream attached");

	Ok(LogSubscription::spawn(move |tx| async move {
		loop {
			tokio::select! {
				received = events.recv() => match received {
					Ok(event) => {
						if !state.handle(event, &tx).await {
							break;
						}
					}
					Err(broadcast::error::RecvError::Lagged(n)) => warn!(target = "extdev", dropped = n, "log stream lagged"),
					Err(broadcast::error::RecvError::Closed) => break,
				},
				fresh = next_session(&mut reattached) => match (fresh, state.shared.clone()) {
					(Some(session_id), Some(source)) => {
						debug!(target = "extdev", %session_id, "following re-attached session");
						state.adopt(session_id, source).await;
					}
					_ => reattached = None,
				},
			}
		}
	}))
}

/// Next id the shared session re-attached under; pending forever without one.
async fn next_session(reattached: &mut Option<watch::Receiver<String>>) -> Option<String> {
	match reattached {
		Some(rx) => match rx.changed().await {
			Ok(()) => Some(rx.borrow_and_update().clone()),
			Err(_) => None,
		},
		None => std::future::pending().await,
	}
}

struct RdpLogState {
	targets: FirefoxTargets,
	filter: LogFilter,
	/// Console actor → source of its events.
	sources: HashMap<String, SourceInfo>,
}

impl RdpLogState {
	/// Starts listeners on every tab and add-on console not yet known.
	async fn refresh(&mut self) {
		let tabs = self.targets.list_targets().await.unwrap_or_else(|e| {
			debug!(target = "extdev", error = %e, "could not list tabs for logs");
			Vec::new()
		});
		let addons = self.targets.list_addon_targets().await.unwrap_or_else(|e| {
			debug!(target = "extdev", error = %e, "could not list add-ons for logs");
			Vec::new()
		});

		let tabs = tabs.into_iter().map(|t| {
			let source = SourceInfo::new(TargetKind::Page, t.url.clone(), Some(t.id.clone()));
			(t, source)
		});
		let addons = addons.into_iter().map(|t| {
			let source = SourceInfo::new(TargetKind::BackgroundPage, t.url.clone(), None);
			(t, source)
		});

		for (target, source) in tabs.chain(addons) {
			let Some(console) = target.console_actor else {
				continue;
			};
			if self.sources.contains_key(&console) {
				continue;
			}
			let started = self
				.targets
				.connection()
				.request(&console, "startListeners", json!({"listeners": ["PageError", "ConsoleAPI"]}))
				.await;
			match started {
				Ok(_) => {
					debug!(target = "extdev", %console, url = %source.url, "listening for logs");
					self.sources.insert(console, source);
				}
				Err(e) => debug!(target = "extdev", %console, error = %e, "could not start console listeners"),
			}
		}
	}

	async fn handle(&mut self, packet: RdpPacket, tx: &mpsc::Sender<LogEvent>) -> bool {
		if packet.kind.as_deref() == Some("tabListChanged") {
			self.refresh().await;
			return true;
		}
		for log in normalize::from_rdp(&packet, self.sources.get(&packet.from)) {
			if self.filter.accepts(&log) && tx.send(log).await.is_err() {
				return false;
			}
		}
		true
	}
}

/// Streams console and page-error events from every Firefox tab and add-on.
pub async fn subscribe_firefox(targets: &FirefoxTargets, filter: LogFilter) -> Result<LogSubscription> {
	let mut events = targets.connection().subscribe();
	let mut state = RdpLogState {
		targets: targets.clone(),
		filter,
		sources: HashMap::new(),
	};
	state.refresh().await;
	debug!(target = "extdev", consoles = state.sources.len(), "log stream attached");

	Ok(LogSubscription::spawn(move |tx| async move {
		loop {
			match events.recv().await {
				Ok(packet) => {
					if !state.handle(packet, &tx).await {
						break;
					}
				}
				Err(broadcast::error::RecvError::Lagged(n)) => warn!(target = "extdev", dropped = n, "log stream lagged"),
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}
	}))
}
