//! CDP routing: replies correlate by `id`, everything with a `method` is an event.

use std::sync::Arc;
use std::time::Duration;

use extdev_protocol::cdp::{CdpEvent, CdpMessage, CdpRequest};
use serde_json::Value;
use tracing::debug;

use super::{Connection, ConnectionOptions, Inbound, PendingRequests, Protocol};
use crate::error::{Error, Result};
use crate::transport::TransportParts;
use crate::transport::websocket::WebSocketTransport;

/// Router for Chrome DevTools Protocol messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct Cdp;

impl Protocol for Cdp {
	type Event = CdpEvent;

	const NAME: &'static str = "cdp";

	fn route(&self, message: Value, _pending: &PendingRequests) -> Inbound<CdpEvent> {
		match serde_json::from_value::<CdpMessage>(message) {
			Ok(CdpMessage::Response(response)) => {
				let result = match response.error {
					Some(error) => Err(Error::Protocol {
						code: error.code,
						message: error.message,
					}),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				Inbound::Reply { id: response.id, result }
			}
			Ok(CdpMessage::Event(event)) => Inbound::Event(event),
			Ok(CdpMessage::Unknown(value)) => {
				debug!(target = "extdev", %value, "ignoring unrecognized devtools message");
				Inbound::Discard
			}
			Err(e) => {
				debug!(target = "extdev", error = %e, "ignoring undecodable devtools message");
				Inbound::Discard
			}
		}
	}
}

impl Connection<Cdp> {
	/// Connects to a browser-level DevTools WebSocket.
	pub async fn connect(ws_url: &str, options: ConnectionOptions) -> Result<Arc<Self>> {
		let parts = WebSocketTransport::connect(ws_url, options.connect_timeout).await?;
		Ok(Self::from_parts(parts, options))
	}

	/// Wraps an established transport.
	pub fn from_parts(parts: TransportParts, options: ConnectionOptions) -> Arc<Self> {
		Self::start(parts, Cdp, options).0
	}

	/// Sends a command with the default timeout.
	///
	/// `session_id` addresses a flattened target session; `None` addresses the browser.
	pub async fn send(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
		let timeout = self.options().request_timeout;
		self.send_with_timeout(method, params, session_id, timeout).await
	}

	/// Sends a command with an explicit timeout.
	pub async fn send_with_timeout(&self, method: &str, params: Value, session_id: Option<&str>, timeout: Duration) -> Result<Value> {
		self.call(method, None, timeout, |id| {
			let request = CdpRequest {
				id,
				method: method.to_string(),
				params,
				session_id: session_id.map(str::to_string),
			};
			Ok(serde_json::to_value(&request)?)
		})
		.await
	}
}
