//! extdev: remote-debugging control plane for browser extension development.
//!
//! Connects to a running Chromium (CDP over WebSocket) or Firefox (RDP over
//! TCP) instance, installs and reloads an unpacked extension, extracts live
//! page HTML including content-script shadow DOM, and streams console output
//! from every page and extension context.
//!
//! # Example
//!
//! ```ignore
//! use extdev::{BrowserFamily, ControlPlane, ControlPlaneOptions, ExtractOptions};
//!
//! #[tokio::main]
//! async fn main() -> extdev::Result<()> {
//!     let plane = ControlPlane::connect(ControlPlaneOptions::new(BrowserFamily::Chromium, 9222)).await?;
//!     let html = plane.extract("https://example.com", ExtractOptions::default()).await?;
//!     println!("{html}");
//!     Ok(())
//! }
//! ```
//!
//! # Layers
//!
//! - [`endpoint`] - readiness probing and endpoint discovery
//! - [`target`] - Target/Session Directory
//! - [`extension`] - install, identity derivation and reload
//! - [`page`] - HTML extraction with shadow-root merging
//! - [`logs`] - unified log stream
//! - [`reload`] - reload decisions driven by build events

pub mod browser;
pub mod control;
pub mod endpoint;
pub mod error;
pub mod extension;
pub mod instance;
pub mod launch;
pub mod logs;
pub mod page;
pub mod reload;
pub mod retry;
pub mod target;

pub use browser::BrowserFamily;
pub use control::{Backend, ControlPlane, ControlPlaneOptions};
pub use endpoint::{ReadinessProbe, connect_cdp, connect_rdp, discover_ws_url, wait_for_debugger};
pub use error::{Error, Result};
pub use extdev_protocol as protocol;
pub use extdev_runtime as runtime;
pub use extension::{Capability, ChromiumExtensions, ExtensionController, ExtensionIdentity, FirefoxAddons, ManifestInfo, ProfileHints, derive_extension_id};
pub use instance::{InstanceRecord, InstanceRegistry};
pub use launch::{BrowserProcess, LaunchSpec, launch_browser};
pub use logs::{LogFilter, LogFormat, LogSubscription, RenderOptions};
pub use page::{Evaluate, ExtractOptions, PageExtractor, ShadowMode};
pub use reload::{Decision, EngineState, ReloadActions, ReloadEngine, ReloadPolicy};
pub use retry::Backoff;
pub use target::{AttachedSession, CdpTargets, FirefoxTargets};
