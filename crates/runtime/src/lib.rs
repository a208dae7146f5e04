//! Debugging-protocol runtime: transports and request/response correlation.
//!
//! Two protocol families share one [`Connection`] engine:
//!
//! - [`CdpConnection`] - Chrome DevTools Protocol over a WebSocket
//! - [`RdpConnection`] - Firefox Remote Debugging Protocol over length-prefixed TCP

pub mod connection;
pub mod error;
pub mod transport;

pub use connection::{
	Cdp, CdpConnection, Connection, ConnectionOptions, EventSubscription, Inbound, PendingRequests, Protocol, Rdp, RdpConnection, RouteMatch,
	wait_for_event,
};
pub use error::{Error, Result};
pub use extdev_protocol as protocol;
pub use transport::{Transport, TransportParts, TransportReceiver};
