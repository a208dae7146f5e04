//! Duplex message transports.
//!
//! A transport moves whole JSON messages; it knows nothing about ids or
//! events. Two variants exist, one per browser family:
//!
//! - [`websocket`] - Chromium DevTools, one JSON message per text frame
//! - [`framed`] - Firefox RDP, `<length>:<json>` frames over a raw TCP stream
//!
//! Each variant splits into [`TransportParts`]: a sender used by the
//! connection's writer task, and a receiver whose `run` loop pushes decoded
//! messages into `message_rx` until the stream ends. Dropping `message_rx`'s
//! sender is how a receiver reports closure.


pub mod framed;
pub mod websocket;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Boxed send-able future used by the object-safe transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound half of a transport.
pub trait Transport: Send {
	/// Writes one message.
	fn send(&mut self, message: Value) -> BoxFuture<'_, Result<()>>;

	/// Gracefully closes the outbound half.
	fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Inbound half of a transport.
pub trait TransportReceiver: Send {
	/// Reads until the stream ends or fails.
	fn run(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// A transport split into the pieces a connection drives.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
	/// Human-readable peer address for diagnostics.
	pub address: String,
}
