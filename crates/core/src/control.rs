//! One connected browser and the page under inspection.
//!
//! [`ControlPlane`] is what the user-facing commands hold. It keeps a single
//! session on the inspected page so extraction and log streaming never
//! attach twice to the same target.

use std::sync::Arc;
use std::time::Duration;

use extdev_protocol::Target;
use extdev_runtime::ConnectionOptions;
use tokio::sync::Mutex;
use tracing::debug;

use crate::browser::BrowserFamily;
use crate::endpoint::{ReadinessProbe, connect_cdp, connect_rdp};
use crate::error::{Error, Result};
use crate::extension::{ChromiumExtensions, ExtensionController, FirefoxAddons};
use crate::logs::{LogFilter, LogSubscription, subscribe_cdp, subscribe_firefox};
use crate::page::{ConsoleEvaluator, ExtractOptions, PageExtractor};
use crate::target::{AttachedSession, CdpTargets, FirefoxTargets, same_url};

/// Where and how to reach the browser.
#[derive(Debug, Clone)]
pub struct ControlPlaneOptions {
	pub browser: BrowserFamily,
	pub host: String,
	pub port: u16,
	pub probe: ReadinessProbe,
	pub connection: ConnectionOptions,
	/// Bound on waiting for the inspected page's load event.
	pub load_timeout: Duration,
}

impl ControlPlaneOptions {
	pub fn new(browser: BrowserFamily, port: u16) -> Self {
		Self {
			browser,
			host: "127.0.0.1".to_string(),
			port,
			probe: ReadinessProbe::default(),
			connection: ConnectionOptions::default(),
			load_timeout: Duration::from_secs(15),
		}
	}
}

/// Protocol-specific target directory.
#[derive(Clone)]
pub enum Backend {
	Chromium(CdpTargets),
	Firefox(FirefoxTargets),
}

#[derive(Clone)]
enum InspectedPage {
	Chromium(Arc<AttachedSession>),
	Firefox(Target),
}

pub struct ControlPlane {
	options: ControlPlaneOptions,
	backend: Backend,
	page: Mutex<Option<(String, InspectedPage)>>,
}

impl ControlPlane {
	/// Probes the debug port and connects with the browser's native protocol.
	pub async fn connect(options: ControlPlaneOptions) -> Result<Self> {
		let backend = match options.browser {
			BrowserFamily::Chromium => {
				let connection = connect_cdp(&options.host, options.port, options.probe, options.connection.clone()).await?;
				Backend::Chromium(CdpTargets::new(connection))
			}
			BrowserFamily::Firefox => {
				let connection = connect_rdp(&options.host, options.port, options.probe, options.connection.clone()).await?;
				Backend::Firefox(FirefoxTargets::new(connection))
			}
		};
		debug!(target = "extdev", browser = %options.browser, port = options.port, "control plane connected");
		Ok(Self::with_backend(options, backend))
	}

	pub fn with_backend(options: ControlPlaneOptions, backend: Backend) -> Self {
		Self {
			options,
			backend,
			page: Mutex::new(None),
		}
	}

	pub fn options(&self) -> &ControlPlaneOptions {
		&self.options
	}

	pub fn backend(&self) -> &Backend {
		&self.backend
	}

	pub fn browser(&self) -> BrowserFamily {
		match self.backend {
			Backend::Chromium(_) => BrowserFamily::Chromium,
			Backend::Firefox(_) => BrowserFamily::Firefox,
		}
	}

	pub fn is_alive(&self) -> bool {
		match &self.backend {
			Backend::Chromium(targets) => targets.connection().is_alive(),
			Backend::Firefox(targets) => targets.connection().is_alive(),
		}
	}

	/// Extension controller for this browser family.
	pub fn extensions(&self) -> Arc<dyn ExtensionController> {
		match &self.backend {
			Backend::Chromium(targets) => Arc::new(ChromiumExtensions::new(Arc::clone(targets.connection()))),
			Backend::Firefox(targets) => Arc::new(FirefoxAddons::new(Arc::clone(targets.connection()))),
		}
	}

	/// Opens (or reuses) the page for `url` and makes it the inspected page.
	async fn open_page(&self, url: &str) -> Result<InspectedPage> {
		let mut current = self.page.lock().await;
		if let Some((known, page)) = current.as_ref() {
			if same_url(known, url) {
				return Ok(page.clone());
			}
		}

		let page = match &self.backend {
			Backend::Chromium(targets) => {
				let session = targets.ensure_target_and_session(url).await?;
				if !session.wait_for_load(self.options.load_timeout).await {
					debug!(target = "extdev", url, "no load event before timeout, extracting anyway");
				}
				InspectedPage::Chromium(session)
			}
			Backend::Firefox(targets) => InspectedPage::Firefox(targets.ensure_tab(url).await?),
		};
		*current = Some((url.to_string(), page.clone()));
		Ok(page)
	}

	/// Serialized HTML of `url`, shadow content included per `extract.shadow`.
	///
	/// The string may be empty when the page never produced a document.
	pub async fn extract(&self, url: &str, extract: ExtractOptions) -> Result<String> {
		match self.open_page(url).await? {
			InspectedPage::Chromium(session) => Ok(PageExtractor::new(session).with_options(extract).extract_when_ready().await),
			InspectedPage::Firefox(target) => {
				let Backend::Firefox(targets) = &self.backend else {
					return Err(Error::Discovery("firefox page on a chromium connection".into()));
				};
				let console = target
					.console_actor
					.ok_or_else(|| Error::Discovery(format!("tab {} exposes no console actor", target.id)))?;
				let evaluator = ConsoleEvaluator::new(Arc::clone(targets.connection()), console).with_timeout(self.options.connection.request_timeout);
				Ok(PageExtractor::new(evaluator).with_options(extract).extract_when_ready().await)
			}
		}
	}

	/// Streams logs from every target, reusing the inspected page's session.
	pub async fn logs(&self, filter: LogFilter) -> Result<LogSubscription> {
		match &self.backend {
			Backend::Chromium(targets) => {
				let shared = match self.page.lock().await.as_ref() {
					Some((_, InspectedPage::Chromium(session))) => Some(Arc::clone(session)),
					_ => None,
				};
				subscribe_cdp(targets, shared, filter).await
			}
			Backend::Firefox(targets) => subscribe_firefox(targets, filter).await,
		}
	}

	/// Closes the connection; in-flight requests fail with a closed error.
	pub fn close(&self) {
		match &self.backend {
			Backend::Chromium(targets) => targets.connection().close(),
			Backend::Firefox(targets) => targets.connection().close(),
		}
	}
}
