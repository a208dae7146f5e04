//! Wire and domain types shared by the extdev crates.
//!
//! Nothing in here performs I/O:
//!
//! - [`cdp`] - Chrome DevTools Protocol request/response/event envelopes
//! - [`rdp`] - Firefox Remote Debugging Protocol packets
//! - [`target`] - targets, sessions and extension url helpers
//! - [`log`] - normalized log events
//! - [`rebuild`] - build notifications and reload intents

pub mod cdp;
pub mod log;
pub mod rdp;
pub mod rebuild;
pub mod target;

pub use cdp::{CdpError, CdpEvent, CdpMessage, CdpRequest, CdpResponse};
pub use log::{LogContext, LogEvent, LogLevel};
pub use rdp::{RdpPacket, RdpRequest};
pub use rebuild::{BuildEvent, RebuildNotification, ReloadIntent, ReloadReason};
pub use target::{Session, Target, TargetInfo, TargetKind};
