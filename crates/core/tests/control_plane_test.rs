// Control plane against an in-process mock Chromium.

mod mock_browser;

use std::sync::Arc;
use std::time::Duration;

use extdev::extension::Capability;
use extdev::page::scripts;
use extdev::protocol::{LogContext, LogLevel};
use extdev::runtime::{CdpConnection, ConnectionOptions};
use extdev::{
	Backoff, BrowserFamily, CdpTargets, ChromiumExtensions, ControlPlane, ControlPlaneOptions, ExtensionController, ExtractOptions, LogFilter, ProfileHints,
	ReadinessProbe, ShadowMode, logs,
};
use mock_browser::{EXTENSION_ID, MockBrowser, MockState};
use serde_json::json;

async fn connect(mock: &MockBrowser) -> Arc<CdpConnection> {
	CdpConnection::connect(&mock.ws_url(), ConnectionOptions::default()).await.unwrap()
}

fn write_manifest(dir: &std::path::Path, name: &str, version: &str) {
	std::fs::write(
		dir.join("manifest.json"),
		json!({"manifest_version": 3, "name": name, "version": version, "background": {"service_worker": "sw.js"}}).to_string(),
	)
	.unwrap();
}

#[tokio::test]
async fn test_ensure_target_and_session_is_idempotent() {
	let mock = MockBrowser::start().await;
	let targets = CdpTargets::new(connect(&mock).await);

	let first = targets.ensure_target_and_session("https://example.com/").await.unwrap();
	let second = targets.ensure_target_and_session("https://example.com").await.unwrap();

	assert_eq!(first.target_id(), second.target_id());
	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(mock.count_calls("Target.createTarget"), 1);
	assert_eq!(mock.count_calls("Page.enable"), 2);
	assert_eq!(mock.count_calls("Page.navigate"), 1);
	// One transient attach for the navigation, one kept session.
	assert_eq!(mock.count_calls("Target.attachToTarget"), 2);

	let listed = targets.list_targets().await.unwrap();
	let pages: Vec<_> = listed.iter().filter(|t| t.url == "https://example.com/").collect();
	assert_eq!(pages.len(), 1);
}

#[tokio::test]
async fn test_identity_from_sole_service_worker() {
	let mock = MockBrowser::with_state(MockState {
		extension_manifest: Some(("Demo".into(), "1.0.0".into())),
		..MockState::default()
	})
	.await;
	mock.add_target("service_worker", &format!("chrome-extension://{EXTENSION_ID}/sw.js"));
	mock.add_target("page", "https://example.com/");

	let dir = tempfile::tempdir().unwrap();
	write_manifest(dir.path(), "Demo", "1.0.0");

	let extensions = ChromiumExtensions::new(connect(&mock).await);
	let identity = extensions.derive_identity(dir.path(), &ProfileHints::default()).await.unwrap().unwrap();
	assert_eq!(identity.id, EXTENSION_ID);

	// Memoized: a second call does not query the browser again.
	let evaluations = mock.state.lock().evaluations.len();
	let again = extensions.derive_identity(dir.path(), &ProfileHints::default()).await.unwrap().unwrap();
	assert_eq!(again.id, EXTENSION_ID);
	assert_eq!(mock.state.lock().evaluations.len(), evaluations);
}

#[tokio::test]
async fn test_identity_not_yet_available_is_none() {
	let mock = MockBrowser::start().await;
	let dir = tempfile::tempdir().unwrap();
	write_manifest(dir.path(), "Demo", "1.0.0");

	let quick = Backoff::new(3, Duration::from_millis(10), Duration::from_millis(20));
	let extensions = ChromiumExtensions::new(connect(&mock).await).with_backoff(quick, quick);
	let identity = extensions.derive_identity(dir.path(), &ProfileHints::default()).await.unwrap();
	assert!(identity.is_none());
	assert_eq!(mock.count_calls("Target.getTargets"), 3);
}

#[tokio::test]
async fn test_reload_falls_back_to_runtime_when_native_is_missing() {
	let mock = MockBrowser::start().await;
	mock.add_target("service_worker", &format!("chrome-extension://{EXTENSION_ID}/sw.js"));
	let dir = tempfile::tempdir().unwrap();

	let extensions = ChromiumExtensions::new(connect(&mock).await);
	extensions.record_path(EXTENSION_ID, dir.path());

	assert!(extensions.force_reload(EXTENSION_ID).await);
	assert_eq!(extensions.native_reload_capability(), Capability::Unsupported);
	assert!(
		mock.state
			.lock()
			.evaluations
			.iter()
			.any(|(target, expr)| target.starts_with("service_worker") && expr == "chrome.runtime.reload()")
	);

	// The capability is remembered; native reload is not probed again.
	assert!(extensions.force_reload(EXTENSION_ID).await);
	assert_eq!(mock.count_calls("Extensions.loadUnpacked"), 1);
}

#[tokio::test]
async fn test_native_reload_when_supported() {
	let mock = MockBrowser::with_state(MockState {
		native_reload: true,
		..MockState::default()
	})
	.await;
	let dir = tempfile::tempdir().unwrap();
	let extensions = ChromiumExtensions::new(connect(&mock).await);

	let id = extensions.install(dir.path()).await.unwrap();
	assert_eq!(id, EXTENSION_ID);
	assert!(extensions.force_reload(&id).await);
	assert_eq!(extensions.native_reload_capability(), Capability::Supported);
	assert!(mock.state.lock().evaluations.is_empty());
}

#[tokio::test]
async fn test_control_plane_discovers_and_extracts() {
	let document = "<!DOCTYPE html><html><head></head><body><p>mock</p></body></html>";
	let mock = MockBrowser::with_state(MockState {
		document: Some(document.into()),
		baseline_script: scripts::baseline(),
		..MockState::default()
	})
	.await;

	let mut options = ControlPlaneOptions::new(BrowserFamily::Chromium, mock.port());
	options.probe = ReadinessProbe {
		attempts: 3,
		interval: Duration::from_millis(50),
		connect_timeout: Duration::from_millis(200),
	};
	let plane = ControlPlane::connect(options).await.unwrap();
	assert!(plane.is_alive());

	let extract = ExtractOptions {
		shadow: ShadowMode::Off,
		..ExtractOptions::default()
	};
	let html = plane.extract("https://example.com/", extract).await.unwrap();
	assert_eq!(html, document);

	// Second extraction reuses the inspected page's session.
	let attaches = mock.count_calls("Target.attachToTarget");
	plane.extract("https://example.com/", extract).await.unwrap();
	assert_eq!(mock.count_calls("Target.attachToTarget"), attaches);

	plane.close();
	assert!(!plane.is_alive());
}

#[tokio::test]
async fn test_unavailable_port_reports_attempts() {
	let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
	let port = listener.local_addr().unwrap().port();
	drop(listener);

	let mut options = ControlPlaneOptions::new(BrowserFamily::Chromium, port);
	options.probe = ReadinessProbe {
		attempts: 2,
		interval: Duration::from_millis(10),
		connect_timeout: Duration::from_millis(100),
	};
	let err = ControlPlane::connect(options).await.err().unwrap();
	assert_eq!(err.to_string(), format!("debugging not available on port {port} after 2 attempts"));
}

#[tokio::test]
async fn test_log_stream_normalizes_and_filters() {
	let mock = MockBrowser::start().await;
	let page = mock.add_target("page", "https://example.com/");
	mock.add_target("service_worker", &format!("chrome-extension://{EXTENSION_ID}/sw.js"));

	let targets = CdpTargets::new(connect(&mock).await);
	let mut subscription = logs::subscribe_cdp(&targets, None, LogFilter::at_least(LogLevel::Info)).await.unwrap();
	assert!(mock.count_calls("Runtime.enable") >= 2);

	let session = mock.session_for(&page).unwrap();
	mock.emit(json!({
		"method": "Runtime.consoleAPICalled",
		"sessionId": session,
		"params": {"type": "debug", "args": [{"type": "string", "value": "noise"}]}
	}));
	mock.emit(json!({
		"method": "Runtime.consoleAPICalled",
		"sessionId": session,
		"params": {"type": "warning", "args": [{"type": "string", "value": "careful"}]}
	}));

	let event = tokio::time::timeout(Duration::from_secs(5), subscription.next()).await.unwrap().unwrap();
	assert_eq!(event.level, LogLevel::Warn);
	assert_eq!(event.message(), "careful");
	assert_eq!(event.context, LogContext::Page);
	assert_eq!(event.tab_id.as_deref(), Some(page.as_str()));
}

#[tokio::test]
async fn test_log_stream_enables_targets_created_later() {
	let mock = MockBrowser::start().await;
	let targets = CdpTargets::new(connect(&mock).await);
	let mut subscription = logs::subscribe_cdp(&targets, None, LogFilter::default()).await.unwrap();

	let worker = format!("chrome-extension://{EXTENSION_ID}/sw.js");
	let id = mock.add_target("service_worker", &worker);
	mock.emit(json!({
		"method": "Target.targetCreated",
		"params": {"targetInfo": {"targetId": id, "type": "service_worker", "url": worker}}
	}));

	let session = tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			if let Some(session) = mock.session_for(&id) {
				return session;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.unwrap();

	// The enable calls follow the attach; wait for them before emitting.
	tokio::time::sleep(Duration::from_millis(100)).await;
	mock.emit(json!({
		"method": "Log.entryAdded",
		"sessionId": session,
		"params": {"entry": {"level": "error", "text": "worker failed", "source": "javascript"}}
	}));

	let event = tokio::time::timeout(Duration::from_secs(5), subscription.next()).await.unwrap().unwrap();
	assert_eq!(event.context, LogContext::Background);
	assert_eq!(event.level, LogLevel::Error);
	assert_eq!(event.url.as_deref(), Some(worker.as_str()));
}

#[tokio::test]
async fn test_dropped_page_session_is_replaced() {
	let mock = MockBrowser::start().await;
	let targets = CdpTargets::new(connect(&mock).await);

	let first = targets.ensure_target_and_session("https://example.com/").await.unwrap();
	let first_id = first.session_id();
	drop(first);

	let second = targets.ensure_target_and_session("https://example.com/").await.unwrap();
	assert_ne!(second.session_id(), first_id);
	assert_eq!(mock.count_calls("Target.createTarget"), 1);
}

#[tokio::test]
async fn test_stale_session_reattaches_once_and_keeps_new_id() {
	let mock = MockBrowser::start().await;
	let targets = CdpTargets::new(connect(&mock).await);
	let session = targets.ensure_target_and_session("https://example.com/").await.unwrap();
	let old = session.session_id();
	let attaches = mock.count_calls("Target.attachToTarget");

	mock.expire_session(&old);
	let state = session.evaluate("document.readyState").await.unwrap();
	assert_eq!(state, json!("complete"));

	assert_eq!(mock.count_calls("Target.attachToTarget"), attaches + 1);
	let fresh = session.session_id();
	assert_ne!(fresh, old);
	assert_eq!(mock.session_for(session.target_id()), Some(fresh.clone()));

	// Later commands go straight to the new session.
	session.evaluate("document.readyState").await.unwrap();
	assert_eq!(mock.count_calls("Target.attachToTarget"), attaches + 1);
	let evaluations = mock.count_calls("Runtime.evaluate");
	assert_eq!(evaluations, 3);
}

#[tokio::test]
async fn test_log_stream_ignores_sessions_it_did_not_open() {
	let mock = MockBrowser::with_state(MockState {
		extension_manifest: Some(("Demo".into(), "1.0.0".into())),
		..MockState::default()
	})
	.await;
	let worker = mock.add_target("service_worker", &format!("chrome-extension://{EXTENSION_ID}/sw.js"));
	let dir = tempfile::tempdir().unwrap();
	write_manifest(dir.path(), "Demo", "1.0.0");

	let targets = CdpTargets::new(connect(&mock).await);
	let mut subscription = logs::subscribe_cdp(&targets, None, LogFilter::default()).await.unwrap();
	assert_eq!(mock.count_calls("Runtime.enable"), 1);
	let owned = mock.session_for(&worker).unwrap();

	// Identity derivation evaluates on a throwaway session of the same worker.
	let extensions = ChromiumExtensions::new(Arc::clone(targets.connection()));
	extensions.rederive_identity(dir.path(), &ProfileHints::default()).await.unwrap();
	let sessions = mock.sessions_of(&worker);
	assert_eq!(sessions.len(), 2);
	let throwaway = sessions[1].clone();

	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(mock.count_calls("Runtime.enable"), 1);

	for (session, text) in [(&throwaway, "replayed"), (&owned, "live")] {
		mock.emit(json!({
			"method": "Runtime.consoleAPICalled",
			"sessionId": session,
			"params": {"type": "log", "args": [{"type": "string", "value": text}]}
		}));
	}
	let event = tokio::time::timeout(Duration::from_secs(5), subscription.next()).await.unwrap().unwrap();
	assert_eq!(event.message(), "live");
}

#[tokio::test]
async fn test_log_stream_follows_reattached_shared_session() {
	let mock = MockBrowser::start().await;
	let targets = CdpTargets::new(connect(&mock).await);
	let session = targets.ensure_target_and_session("https://example.com/").await.unwrap();

	let mut subscription = logs::subscribe_cdp(&targets, Some(Arc::clone(&session)), LogFilter::default()).await.unwrap();
	assert_eq!(mock.count_calls("Runtime.enable"), 1);

	mock.expire_session(&session.session_id());
	session.evaluate("document.readyState").await.unwrap();
	let fresh = session.session_id();

	let enabled = tokio::time::timeout(Duration::from_secs(5), async {
		while mock.count_calls("Runtime.enable") < 2 {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await;
	assert!(enabled.is_ok());

	tokio::time::sleep(Duration::from_millis(100)).await;
	mock.emit(json!({
		"method": "Runtime.consoleAPICalled",
		"sessionId": fresh,
		"params": {"type": "log", "args": [{"type": "string", "value": "after reattach"}]}
	}));
	let event = tokio::time::timeout(Duration::from_secs(5), subscription.next()).await.unwrap().unwrap();
	assert_eq!(event.message(), "after reattach");
	assert_eq!(event.tab_id.as_deref(), Some(session.target_id()));
}
