//! Debug-port readiness and endpoint discovery.

use std::sync::Arc;
use std::time::Duration;

use extdev_runtime::{CdpConnection, ConnectionOptions, RdpConnection};
use serde::Deserialize;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};

/// Hosts tried when the caller asked for the loopback default.
pub const LOOPBACK_HOSTS: [&str; 3] = ["127.0.0.1", "localhost", "[::1]"];

/// `/json/version` response subset.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
	#[serde(rename = "webSocketDebuggerUrl")]
	pub web_socket_debugger_url: String,
	#[serde(rename = "Browser", default)]
	pub browser: Option<String>,
}

/// `/json/list` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub web_socket_debugger_url: Option<String>,
}

/// TCP-connect polling before the first real connection.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessProbe {
	pub attempts: u32,
	pub interval: Duration,
	pub connect_timeout: Duration,
}

impl Default for ReadinessProbe {
	fn default() -> Self {
		Self {
			attempts: 40,
			interval: Duration::from_millis(250),
			connect_timeout: Duration::from_millis(500),
		}
	}
}

/// Waits until something accepts TCP connections on `host:port`.
///
/// Fails with [`Error::DebuggerUnavailable`] once every attempt is spent.
pub async fn wait_for_debugger(host: &str, port: u16, probe: ReadinessProbe) -> Result<()> {
	let host = host.trim_start_matches('[').trim_end_matches(']');
	for attempt in 1..=probe.attempts {
		match tokio::time::timeout(probe.connect_timeout, TcpStream::connect((host, port))).await {
			Ok(Ok(_)) => {
				debug!(target = "extdev", host, port, attempt, "debug port ready");
				return Ok(());
			}
			Ok(Err(e)) => debug!(target = "extdev", host, port, attempt, error = %e, "debug port not ready"),
			Err(_) => debug!(target = "extdev", host, port, attempt, "debug port probe timed out"),
		}
		if attempt < probe.attempts {
			tokio::time::sleep(probe.interval).await;
		}
	}

	Err(Error::DebuggerUnavailable {
		port,
		attempts: probe.attempts,
	})
}

fn candidate_hosts(host: &str) -> Vec<String> {
	if LOOPBACK_HOSTS.contains(&host) || host == "::1" {
		LOOPBACK_HOSTS.iter().map(|h| h.to_string()).collect()
	} else {
		vec![host.to_string()]
	}
}

fn http_client() -> Result<reqwest::Client> {
	Ok(reqwest::Client::builder().timeout(Duration::from_millis(800)).build()?)
}

/// Resolves the browser-wide DevTools WebSocket URL.
///
/// Prefers `/json/version`; falls back to the first page-typed entry of
/// `/json/list` when the browser-wide endpoint is missing.
pub async fn discover_ws_url(host: &str, port: u16) -> Result<String> {
	let client = http_client()?;
	let hosts = candidate_hosts(host);
	let mut last_error = "no response".to_string();

	for host in &hosts {
		let url = format!("http://{host}:{port}/json/version");
		match client.get(&url).send().await {
			Ok(response) if response.status().is_success() => match response.json::<VersionInfo>().await {
				Ok(info) => {
					debug!(target = "extdev", url, browser = info.browser.as_deref().unwrap_or("unknown"), "discovered browser endpoint");
					return Ok(info.web_socket_debugger_url);
				}
				Err(e) => last_error = e.to_string(),
			},
			Ok(response) => last_error = format!("unexpected status {}", response.status()),
			Err(e) => last_error = e.to_string(),
		}
	}

	for host in &hosts {
		let url = format!("http://{host}:{port}/json/list");
		let Ok(response) = client.get(&url).send().await else {
			continue;
		};
		let Ok(targets) = response.json::<Vec<TargetDescriptor>>().await else {
			continue;
		};
		if let Some(ws) = pick_page_endpoint(&targets) {
			debug!(target = "extdev", url, "falling back to page-level endpoint");
			return Ok(ws);
		}
	}

	Err(Error::Discovery(format!("no DevTools endpoint on port {port}: {last_error}")))
}

/// First page-typed target that exposes its own WebSocket.
pub fn pick_page_endpoint(targets: &[TargetDescriptor]) -> Option<String> {
	targets
		.iter()
		.filter(|t| t.kind == "page")
		.find_map(|t| t.web_socket_debugger_url.clone())
}

/// Probes, discovers and connects to a Chromium-family browser.
pub async fn connect_cdp(host: &str, port: u16, probe: ReadinessProbe, options: ConnectionOptions) -> Result<Arc<CdpConnection>> {
	wait_for_debugger(host, port, probe).await?;
	let ws_url = discover_ws_url(host, port).await?;
	Ok(CdpConnection::connect(&ws_url, options).await?)
}

/// Probes and connects to a Firefox debugger server.
pub async fn connect_rdp(host: &str, port: u16, probe: ReadinessProbe, options: ConnectionOptions) -> Result<Arc<RdpConnection>> {
	wait_for_debugger(host, port, probe).await?;
	let host = host.trim_start_matches('[').trim_end_matches(']');
	Ok(RdpConnection::connect(host, port, options).await?)
}
